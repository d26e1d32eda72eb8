//! # obsidize
//!
//! Keeps an Obsidian vault in step with a Claude data export.
//!
//! ## What it does
//!
//! Every conversation in the export becomes a Markdown document at the vault
//! root; every project becomes a folder holding an overview and one document
//! per project file. Each document starts with a small YAML header carrying
//! the item's `uuid` and an `obsidized_at` stamp. That header is the only
//! state: there is no database or cache, so several machines can sync the
//! same vault from their own exports.
//!
//! ## Incremental sync
//!
//! A run validates the export, indexes the vault by reading headers, and
//! plans one action per item:
//!
//! - **create** when no document carries the item's uuid,
//! - **update** when the export's `updated_at` is newer than `obsidized_at`,
//! - **unchanged** otherwise, in which case the file is not touched.
//!
//! Updates are append-only. New messages are inserted before the
//! `<!-- obsidize:end -->` line and notes written by hand anywhere in the
//! document survive. Only the sync lines of the header are rewritten.
//!
//! ## Usage
//!
//! ```sh
//! # Sync an unpacked export into a vault folder
//! obsidize ~/Downloads/claude-export ~/vault/Claude
//!
//! # See what would change without writing anything
//! obsidize ~/Downloads/claude-export ~/vault/Claude --dry-run
//! ```
//!
//! Defaults can be persisted in `~/.config/obsidize/config.toml`.

pub mod clock;
pub mod error;
pub mod execute;
pub mod export;
pub mod frontmatter;
pub mod index;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod report;
pub mod sanitize;
pub mod validate;
pub mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::SyncError;
pub use pipeline::{SyncConfig, run, run_path};
pub use report::{ConsoleReporter, NullReporter, ReportSink, RunSummary};
