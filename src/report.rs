//! Reporting sink: where validation results, the plan and per-item outcomes
//! go for display. The pipeline never prints on its own.

use crate::execute::{ItemOutcome, ItemResult, label};
use crate::model::ItemKind;
use crate::plan::{Action, Plan};
use crate::validate::{Severity, ValidationReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::OnceLock;

/// Receives progress of one run. Every method defaults to doing nothing.
///
/// `item_finished` is called from worker threads.
pub trait ReportSink: Sync {
    fn validation(&self, _report: &ValidationReport) {}
    fn plan(&self, _plan: &Plan, _dry_run: bool) {}
    fn execution_started(&self, _total: usize) {}
    fn item_finished(&self, _result: &ItemResult) {}
    fn finished(&self, _summary: &RunSummary) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ReportSink for NullReporter {}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub validation: ValidationReport,
    pub plan: Plan,
    /// Per-item outcomes in plan order; empty for a dry run.
    pub results: Vec<ItemResult>,
    pub dry_run: bool,
    /// Vault files the indexer skipped.
    pub ignored: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    /// Updates that found nothing to append and only refreshed the header.
    pub refreshed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn outcomes(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for result in &self.results {
            match result.outcome {
                ItemOutcome::Created { .. } => counts.created += 1,
                ItemOutcome::Updated { added: 0, .. } => counts.refreshed += 1,
                ItemOutcome::Updated { .. } => counts.updated += 1,
                ItemOutcome::Unchanged => counts.unchanged += 1,
                ItemOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Number of documents or project folders written.
    pub fn written(&self) -> usize {
        let counts = self.outcomes();
        counts.created + counts.updated + counts.refreshed
    }
}

/// Human-facing output on stderr, with a progress bar while writing.
#[derive(Default)]
pub struct ConsoleReporter {
    pub verbose: bool,
    pub quiet: bool,
    bar: OnceLock<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            bar: OnceLock::new(),
        }
    }

    fn println(&self, line: String) {
        // A hidden bar swallows println output.
        match self.bar.get() {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => eprintln!("{}", line),
        }
    }
}

fn make_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

impl ReportSink for ConsoleReporter {
    fn validation(&self, report: &ValidationReport) {
        if self.quiet {
            return;
        }
        for kind in [ItemKind::Conversation, ItemKind::Project] {
            let counts = report.counts(kind);
            eprintln!(
                "Validated {}s: {} valid ({} repaired), {} invalid",
                kind, counts.valid, counts.repaired, counts.invalid
            );
        }
        for issue in report.dropped() {
            eprintln!("  {}", issue);
        }
        if self.verbose {
            for issue in report.issues.iter().filter(|i| i.severity == Severity::Repaired) {
                eprintln!("  {}", issue);
            }
        }
    }

    fn plan(&self, plan: &Plan, dry_run: bool) {
        if self.quiet {
            return;
        }
        let counts = plan.counts();
        eprintln!(
            "Plan{}: {} create, {} update, {} unchanged",
            if dry_run { " (dry run)" } else { "" },
            counts.create,
            counts.update,
            counts.unchanged
        );
        if dry_run || self.verbose {
            for entry in &plan.entries {
                if entry.action != Action::Unchanged || self.verbose {
                    eprintln!(
                        "  {:<9} {} ({})",
                        entry.action,
                        label(&entry.uuid, &entry.title),
                        entry.reason
                    );
                }
            }
        }
    }

    fn execution_started(&self, total: usize) {
        let _ = self.bar.set(make_bar(total, self.quiet || total == 0));
    }

    fn item_finished(&self, result: &ItemResult) {
        let name = label(&result.uuid, &result.title);
        match &result.outcome {
            ItemOutcome::Failed { error } => {
                if !self.quiet {
                    self.println(format!("Error {}: {}", name, error));
                }
            }
            ItemOutcome::Created { path } if self.verbose => {
                self.println(format!("Created: {}", path.display()))
            }
            ItemOutcome::Updated { path, added } if self.verbose => {
                self.println(format!("Updated: {} (+{})", path.display(), added))
            }
            _ => {}
        }
        if let Some(bar) = self.bar.get() {
            bar.inc(1);
        }
    }

    fn finished(&self, summary: &RunSummary) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
        if self.quiet {
            return;
        }
        if summary.dry_run {
            eprintln!("Dry run, nothing written.");
            return;
        }
        let counts = summary.outcomes();
        eprintln!(
            "Done. {} created, {} updated, {} refreshed, {} unchanged. Errors: {}",
            counts.created, counts.updated, counts.refreshed, counts.unchanged, counts.failed
        );
        if summary.ignored > 0 && self.verbose {
            eprintln!("Ignored {} vault files without obsidize metadata.", summary.ignored);
        }
    }
}
