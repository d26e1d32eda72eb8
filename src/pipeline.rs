//! One reconciliation run: validate, index, plan, then execute.
//!
//! Each stage completes before the next starts, and nothing touches the vault
//! before the plan exists. A dry run stops after planning.

use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::execute::{self, ExecuteContext};
use crate::export::{self, RawExport};
use crate::frontmatter::SyncStamp;
use crate::index;
use crate::plan;
use crate::report::{ReportSink, RunSummary};
use crate::validate;
use eyre::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Provenance tag written to the `source` key.
pub const DEFAULT_SOURCE: &str = "claude";

/// Default vault directory when none is configured.
pub const DEFAULT_VAULT_DIR: &str = "obsidized";

#[derive(Clone)]
pub struct SyncConfig {
    pub vault_dir: PathBuf,
    /// Plan and report without writing anything.
    pub dry_run: bool,
    /// Plan every indexed item as an update and re-append unanchored messages.
    pub force: bool,
    /// Worker threads for the execution stage; 1 runs sequentially.
    pub jobs: usize,
    pub source: String,
    pub clock: Arc<dyn Clock>,
}

impl SyncConfig {
    pub fn new(vault_dir: impl Into<PathBuf>) -> Self {
        Self {
            vault_dir: vault_dir.into(),
            dry_run: false,
            force: false,
            jobs: 1,
            source: DEFAULT_SOURCE.to_string(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Load the export at `export_path` and reconcile it into the vault.
pub fn run_path(export_path: &Path, config: &SyncConfig, sink: &dyn ReportSink) -> Result<RunSummary> {
    let raw = export::load_export(export_path)?;
    run(&raw, export_path, config, sink)
}

/// Reconcile an already loaded export into the vault.
///
/// `Err` is reserved for structural failures, which happen before any write.
/// Per-item failures are in the returned summary.
pub fn run(
    raw: &RawExport,
    export_path: &Path,
    config: &SyncConfig,
    sink: &dyn ReportSink,
) -> Result<RunSummary> {
    let (export, validation) = validate::validate(raw, export_path)?;
    sink.validation(&validation);

    let vault = config.vault_dir.as_path();
    check_output_root(vault)?;
    let index = index::scan(vault);
    let plan = plan::build_plan(&export, &index, config.force);
    let counts = plan.counts();
    info!(
        create = counts.create,
        update = counts.update,
        unchanged = counts.unchanged,
        dry_run = config.dry_run,
        "Planned run"
    );
    sink.plan(&plan, config.dry_run);

    let results = if config.dry_run {
        Vec::new()
    } else {
        if !plan.is_noop() {
            fs::create_dir_all(vault).map_err(|source| SyncError::OutputRoot {
                path: vault.to_path_buf(),
                source,
            })?;
        }
        let stamp = SyncStamp {
            now: config.clock.now(),
            source: config.source.clone(),
        };
        debug!(now = %stamp.now, "Executing plan");
        let ctx = ExecuteContext {
            export: &export,
            index: &index,
            vault,
            stamp: &stamp,
            jobs: config.jobs.max(1),
            sink,
        };
        execute::execute(&plan, &ctx)
    };

    let summary = RunSummary {
        validation,
        plan,
        results,
        dry_run: config.dry_run,
        ignored: index.ignored,
    };
    sink.finished(&summary);
    Ok(summary)
}

/// The vault root may be missing but must not be something other than a
/// directory.
fn check_output_root(vault: &Path) -> Result<(), SyncError> {
    match fs::metadata(vault) {
        Ok(meta) if !meta.is_dir() => Err(SyncError::OutputRoot {
            path: vault.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        }),
        _ => Ok(()),
    }
}
