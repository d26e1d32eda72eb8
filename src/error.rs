//! Fatal errors.
//!
//! Only structural failures live here: an export with no recognisable item
//! collection, an export that cannot be read, or an output root that cannot be
//! created. Everything else is recovered and surfaced through the validation
//! report or the per-item outcomes of a run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No conversations or projects collection found in export: {path}")]
    NoItemCollections { path: PathBuf },

    #[error("Could not read export at {path}: {source}")]
    UnreadableExport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export file {path} is not valid JSON: {source}")]
    MalformedExport {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create output root {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
