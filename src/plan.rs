//! Reconciliation Planner.
//!
//! A pure function of the validated export and the folder index. For every
//! item:
//!
//! | folder state                             | action      |
//! |------------------------------------------|-------------|
//! | uuid not indexed                         | `create`    |
//! | indexed, `obsidized_at` missing/invalid  | `create`    |
//! | indexed, `updated_at > obsidized_at`     | `update`    |
//! | indexed, `updated_at <= obsidized_at`    | `unchanged` |
//!
//! Instants are compared as UTC `DateTime`s, never as strings. In force mode
//! every indexed item with a readable stamp becomes an `update`.

use crate::index::FolderIndex;
use crate::model::{ExportItem, ItemKind};
use crate::validate::ValidatedExport;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Unchanged,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Unchanged => "unchanged",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No document in the vault carries this uuid.
    NotInVault,
    /// A document exists but its `obsidized_at` cannot be read.
    MissingSyncStamp,
    UpstreamNewer {
        updated_at: DateTime<Utc>,
        obsidized_at: DateTime<Utc>,
    },
    UpToDate {
        updated_at: DateTime<Utc>,
        obsidized_at: DateTime<Utc>,
    },
    Forced,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NotInVault => f.write_str("not in vault"),
            Reason::MissingSyncStamp => f.write_str("vault copy has no readable obsidized_at"),
            Reason::UpstreamNewer {
                updated_at,
                obsidized_at,
            } => write!(
                f,
                "updated {} after last sync {}",
                updated_at.to_rfc3339(),
                obsidized_at.to_rfc3339()
            ),
            Reason::UpToDate { obsidized_at, .. } => {
                write!(f, "up to date since {}", obsidized_at.to_rfc3339())
            }
            Reason::Forced => f.write_str("forced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub uuid: String,
    pub kind: ItemKind,
    pub title: String,
    pub action: Action,
    pub reason: Reason,
    /// The vault copy's `obsidized_at`, when there is a usable one.
    pub synced_at: Option<DateTime<Utc>>,
}

/// One entry per validated item, in export order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub unchanged: usize,
}

impl Plan {
    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        for entry in &self.entries {
            match entry.action {
                Action::Create => counts.create += 1,
                Action::Update => counts.update += 1,
                Action::Unchanged => counts.unchanged += 1,
            }
        }
        counts
    }

    pub fn get(&self, uuid: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.uuid == uuid)
    }

    pub fn action(&self, uuid: &str) -> Option<Action> {
        self.get(uuid).map(|e| e.action)
    }

    /// True when executing the plan would not write anything.
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.action == Action::Unchanged)
    }
}

pub fn build_plan(export: &ValidatedExport, index: &FolderIndex, force: bool) -> Plan {
    Plan {
        entries: export
            .items
            .iter()
            .map(|item| plan_item(item, index, force))
            .collect(),
    }
}

fn plan_item(item: &ExportItem, index: &FolderIndex, force: bool) -> PlanEntry {
    let synced_at = index
        .entry(item.uuid())
        .filter(|entry| entry.kind == item.kind().document_kind())
        .map(|entry| entry.obsidized_at);

    let (action, reason) = match synced_at {
        None => (Action::Create, Reason::NotInVault),
        Some(None) => (Action::Create, Reason::MissingSyncStamp),
        Some(Some(_)) if force => (Action::Update, Reason::Forced),
        Some(Some(obsidized_at)) if item.updated_at() > obsidized_at => (
            Action::Update,
            Reason::UpstreamNewer {
                updated_at: item.updated_at(),
                obsidized_at,
            },
        ),
        Some(Some(obsidized_at)) => (
            Action::Unchanged,
            Reason::UpToDate {
                updated_at: item.updated_at(),
                obsidized_at,
            },
        ),
    };

    PlanEntry {
        uuid: item.uuid().to_string(),
        kind: item.kind(),
        title: item.title().to_string(),
        action,
        reason,
        synced_at: synced_at.flatten(),
    }
}
