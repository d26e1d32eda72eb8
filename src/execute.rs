//! Execution stage: turns a plan into writes.
//!
//! Paths for every entry are decided up front on one thread, then the jobs
//! run either in plan order or on a worker pool. Jobs touch disjoint files, a
//! failing job only fails its own item, and results come back in plan order
//! whatever order the workers finish in.

use crate::frontmatter::SyncStamp;
use crate::index::FolderIndex;
use crate::merge::{self, DeltaMode};
use crate::model::{Conversation, ExportItem, ItemKind, Project};
use crate::plan::{Action, Plan, PlanEntry, Reason};
use crate::report::ReportSink;
use crate::sanitize::{PathAllocator, short_id};
use crate::validate::ValidatedExport;
use crate::writer::{self, ProjectLayout};
use crossbeam_channel::{bounded, unbounded};
use eyre::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created {
        path: PathBuf,
    },
    /// `added` counts appended messages or new project documents; zero means
    /// only the header was refreshed.
    Updated {
        path: PathBuf,
        added: usize,
    },
    Unchanged,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub uuid: String,
    pub kind: ItemKind,
    pub title: String,
    pub action: Action,
    pub outcome: ItemOutcome,
}

impl ItemResult {
    fn new(entry: &PlanEntry, outcome: ItemOutcome) -> Self {
        Self {
            uuid: entry.uuid.clone(),
            kind: entry.kind,
            title: entry.title.clone(),
            action: entry.action,
            outcome,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }
}

enum Job<'a> {
    WriteConversation {
        conv: &'a Conversation,
        path: PathBuf,
    },
    MergeConversation {
        conv: &'a Conversation,
        path: PathBuf,
        mode: DeltaMode,
    },
    RebuildConversation {
        conv: &'a Conversation,
        path: PathBuf,
    },
    WriteProject {
        project: &'a Project,
        layout: ProjectLayout,
    },
    MergeProject {
        project: &'a Project,
        layout: ProjectLayout,
    },
}

impl Job<'_> {
    fn run(&self, stamp: &SyncStamp) -> Result<ItemOutcome> {
        match self {
            Job::WriteConversation { conv, path } => {
                writer::write_conversation(path, conv, stamp)?;
                Ok(ItemOutcome::Created { path: path.clone() })
            }
            Job::MergeConversation { conv, path, mode } => {
                let added = merge::merge_conversation(path, conv, *mode, stamp)?;
                Ok(ItemOutcome::Updated {
                    path: path.clone(),
                    added,
                })
            }
            Job::RebuildConversation { conv, path } => {
                merge::rebuild_conversation(path, conv, stamp)?;
                Ok(ItemOutcome::Created { path: path.clone() })
            }
            Job::WriteProject { project, layout } => {
                writer::write_project(layout, project, stamp)?;
                Ok(ItemOutcome::Created {
                    path: layout.dir.clone(),
                })
            }
            Job::MergeProject { project, layout } => {
                let added = merge::merge_project(layout, project, stamp)?;
                Ok(ItemOutcome::Updated {
                    path: layout.dir.clone(),
                    added,
                })
            }
        }
    }
}

/// A job plus the plan slot its result goes back to.
struct Task<'a> {
    slot: usize,
    entry: &'a PlanEntry,
    job: Job<'a>,
}

/// Everything a run shares across jobs.
pub struct ExecuteContext<'a> {
    pub export: &'a ValidatedExport,
    pub index: &'a FolderIndex,
    pub vault: &'a Path,
    pub stamp: &'a SyncStamp,
    pub jobs: usize,
    pub sink: &'a dyn ReportSink,
}

/// Run every non-`unchanged` entry of `plan`. The vault root must exist.
pub fn execute(plan: &Plan, ctx: &ExecuteContext<'_>) -> Vec<ItemResult> {
    let mut results: Vec<Option<ItemResult>> = vec![None; plan.entries.len()];
    let tasks = resolve(plan, ctx, &mut results);

    ctx.sink.execution_started(tasks.len());
    if ctx.jobs <= 1 || tasks.len() <= 1 {
        for task in tasks {
            let result = run_task(&task, ctx);
            results[task.slot] = Some(result);
        }
    } else {
        run_parallel(tasks, ctx, &mut results);
    }

    results.into_iter().flatten().collect()
}

/// Build jobs in plan order, allocating every new path before anything runs.
fn resolve<'a>(
    plan: &'a Plan,
    ctx: &ExecuteContext<'a>,
    results: &mut [Option<ItemResult>],
) -> Vec<Task<'a>> {
    let mut alloc = PathAllocator::new(ctx.index.owners());
    let items = ctx.export.by_uuid();
    let mut tasks = Vec::new();

    for (slot, entry) in plan.entries.iter().enumerate() {
        if entry.action == Action::Unchanged {
            results[slot] = Some(ItemResult::new(entry, ItemOutcome::Unchanged));
            continue;
        }
        let Some(&item) = items.get(entry.uuid.as_str()) else {
            results[slot] = Some(ItemResult::new(
                entry,
                ItemOutcome::Failed {
                    error: "item missing from export".to_string(),
                },
            ));
            continue;
        };
        let job = match item {
            ExportItem::Conversation(conv) => conversation_job(&mut alloc, ctx, entry, conv),
            ExportItem::Project(project) => project_job(&mut alloc, ctx, entry, project),
        };
        tasks.push(Task { slot, entry, job });
    }
    tasks
}

fn conversation_job<'a>(
    alloc: &mut PathAllocator,
    ctx: &ExecuteContext<'_>,
    entry: &PlanEntry,
    conv: &'a Conversation,
) -> Job<'a> {
    let existing = ctx.index.conversations.get(&conv.uuid).map(|e| e.path.clone());
    match (entry.action, existing) {
        (Action::Update, Some(path)) => Job::MergeConversation {
            conv,
            path,
            mode: match entry.reason {
                Reason::Forced => DeltaMode::Unanchored,
                _ => DeltaMode::SinceSync(entry.synced_at),
            },
        },
        // Indexed without a usable stamp: re-derived in place.
        (_, Some(path)) => Job::RebuildConversation { conv, path },
        (_, None) => Job::WriteConversation {
            conv,
            path: writer::conversation_path(alloc, ctx.vault, conv),
        },
    }
}

fn project_job<'a>(
    alloc: &mut PathAllocator,
    ctx: &ExecuteContext<'_>,
    entry: &PlanEntry,
    project: &'a Project,
) -> Job<'a> {
    let existing = ctx.index.projects.get(&project.uuid);
    let update = entry.action == Action::Update && existing.is_some();
    let layout = writer::layout_project(alloc, ctx.vault, project, existing, !update);
    if update {
        Job::MergeProject { project, layout }
    } else {
        Job::WriteProject { project, layout }
    }
}

fn run_task(task: &Task<'_>, ctx: &ExecuteContext<'_>) -> ItemResult {
    let entry = task.entry;
    let outcome = match task.job.run(ctx.stamp) {
        Ok(outcome) => {
            debug!(uuid = %entry.uuid, action = %entry.action, "{}", describe(&outcome));
            outcome
        }
        Err(e) => {
            warn!(uuid = %entry.uuid, action = %entry.action, error = %format!("{e:#}"), "Item failed");
            ItemOutcome::Failed {
                error: format!("{e:#}"),
            }
        }
    };
    let result = ItemResult::new(entry, outcome);
    ctx.sink.item_finished(&result);
    result
}

fn run_parallel(tasks: Vec<Task<'_>>, ctx: &ExecuteContext<'_>, results: &mut [Option<ItemResult>]) {
    let n_workers = ctx.jobs.min(tasks.len());
    debug!(workers = n_workers, jobs = tasks.len(), "Starting worker pool");

    let (tx, rx) = bounded::<Task<'_>>(n_workers * 2);
    let (done_tx, done_rx) = unbounded::<(usize, ItemResult)>();

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            s.spawn(move || {
                while let Ok(task) = rx.recv() {
                    let result = run_task(&task, ctx);
                    if done_tx.send((task.slot, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(rx);
        drop(done_tx);

        for task in tasks {
            // Only fails if every worker is gone.
            if tx.send(task).is_err() {
                break;
            }
        }
        drop(tx);
    });

    for (slot, result) in done_rx.try_iter() {
        results[slot] = Some(result);
    }
}

fn describe(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Created { path } => format!("Created {}", path.display()),
        ItemOutcome::Updated { path, added: 0 } => format!("Refreshed {}", path.display()),
        ItemOutcome::Updated { path, added } => format!("Updated {} (+{added})", path.display()),
        ItemOutcome::Unchanged => "Unchanged".to_string(),
        ItemOutcome::Failed { error } => format!("Failed: {error}"),
    }
}

/// Short label for an item in log lines and reports.
pub fn label(uuid: &str, title: &str) -> String {
    format!("[{}] {}", short_id(uuid), title)
}
