//! Data Validator.
//!
//! Turns the untyped export collections into [`ValidatedExport`] plus a
//! [`ValidationReport`]. A single bad record never fails the run: records
//! that cannot be identified or dated are dropped, everything else is
//! repaired with a fallback value and a note.
//!
//! Fallbacks:
//! - missing title: `Untitled conversation <uuid8>` / `Untitled project <uuid8>`
//! - missing or unparseable `updated_at`: the item's `created_at` (and the
//!   other way round)
//! - missing message sender: `unknown`
//! - missing message or document uuid: `<parent uuid>-m<n>` / `<parent uuid>-d<n>`
//! - missing or unparseable message/document `created_at`: the previous
//!   message's instant, or the parent's `created_at`
//! - missing document filename: `document-<n>`; missing content: empty text

use crate::error::SyncError;
use crate::export::{RawConversation, RawDoc, RawExport, RawMessage, RawProject};
use crate::model::{
    Attachment, Conversation, ExportItem, ItemKind, Message, Project, ProjectDoc, Sender,
};
use crate::sanitize::short_id;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Items that passed validation, conversations first, then projects, each in
/// export order.
#[derive(Debug, Clone, Default)]
pub struct ValidatedExport {
    pub items: Vec<ExportItem>,
}

impl ValidatedExport {
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.items.iter().filter_map(|item| match item {
            ExportItem::Conversation(c) => Some(c),
            ExportItem::Project(_) => None,
        })
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.items.iter().filter_map(|item| match item {
            ExportItem::Project(p) => Some(p),
            ExportItem::Conversation(_) => None,
        })
    }

    /// Items keyed by uuid. Uuids are unique after validation.
    pub fn by_uuid(&self) -> HashMap<&str, &ExportItem> {
        self.items.iter().map(|item| (item.uuid(), item)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The record was discarded.
    Dropped,
    /// The record was kept with a fallback value.
    Repaired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub kind: ItemKind,
    /// Position of the record in its export collection.
    pub index: usize,
    pub uuid: Option<String>,
    pub severity: Severity,
    pub reason: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.severity {
            Severity::Dropped => "dropped",
            Severity::Repaired => "repaired",
        };
        match &self.uuid {
            Some(uuid) => write!(
                f,
                "{} #{} ({}) {}: {}",
                self.kind, self.index, uuid, verb, self.reason
            ),
            None => write!(f, "{} #{} {}: {}", self.kind, self.index, verb, self.reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub valid: usize,
    pub invalid: usize,
    /// Valid records that needed at least one fallback.
    pub repaired: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub conversations: CategoryCounts,
    pub projects: CategoryCounts,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn counts(&self, kind: ItemKind) -> CategoryCounts {
        match kind {
            ItemKind::Conversation => self.conversations,
            ItemKind::Project => self.projects,
        }
    }

    pub fn dropped(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Dropped)
    }

    fn counts_mut(&mut self, kind: ItemKind) -> &mut CategoryCounts {
        match kind {
            ItemKind::Conversation => &mut self.conversations,
            ItemKind::Project => &mut self.projects,
        }
    }
}

/// Validate a raw export. Fails only when neither collection is present.
pub fn validate(
    raw: &RawExport,
    source: &Path,
) -> Result<(ValidatedExport, ValidationReport), SyncError> {
    if !raw.has_collections() {
        return Err(SyncError::NoItemCollections {
            path: source.to_path_buf(),
        });
    }

    let mut validator = Validator::default();
    for (index, record) in raw.conversations.iter().flatten().enumerate() {
        let mut ctx = RecordContext::new(ItemKind::Conversation, index);
        let outcome = validator.conversation(record, &mut ctx);
        validator.finish(ctx, outcome.map(ExportItem::Conversation));
    }
    for (index, record) in raw.projects.iter().flatten().enumerate() {
        let mut ctx = RecordContext::new(ItemKind::Project, index);
        let outcome = validator.project(record, &mut ctx);
        validator.finish(ctx, outcome.map(ExportItem::Project));
    }

    debug!(
        conversations = validator.report.conversations.valid,
        projects = validator.report.projects.valid,
        dropped = validator.report.dropped().count(),
        "Validated export"
    );
    Ok((
        ValidatedExport {
            items: validator.items,
        },
        validator.report,
    ))
}

// ── Per-record bookkeeping ───────────────────────────────────────────────────

struct RecordContext {
    kind: ItemKind,
    index: usize,
    uuid: Option<String>,
    repairs: Vec<String>,
}

impl RecordContext {
    fn new(kind: ItemKind, index: usize) -> Self {
        Self {
            kind,
            index,
            uuid: None,
            repairs: Vec::new(),
        }
    }

    fn repair(&mut self, note: impl Into<String>) {
        self.repairs.push(note.into());
    }
}

#[derive(Default)]
struct Validator {
    items: Vec<ExportItem>,
    report: ValidationReport,
    seen: HashSet<String>,
}

impl Validator {
    fn finish(&mut self, ctx: RecordContext, outcome: Result<ExportItem, String>) {
        match outcome {
            Ok(item) => {
                self.seen.insert(item.uuid().to_string());
                let counts = self.report.counts_mut(ctx.kind);
                counts.valid += 1;
                if !ctx.repairs.is_empty() {
                    counts.repaired += 1;
                }
                for note in ctx.repairs {
                    self.report.issues.push(ValidationIssue {
                        kind: ctx.kind,
                        index: ctx.index,
                        uuid: ctx.uuid.clone(),
                        severity: Severity::Repaired,
                        reason: note,
                    });
                }
                self.items.push(item);
            }
            Err(reason) => {
                self.report.counts_mut(ctx.kind).invalid += 1;
                self.report.issues.push(ValidationIssue {
                    kind: ctx.kind,
                    index: ctx.index,
                    uuid: ctx.uuid,
                    severity: Severity::Dropped,
                    reason,
                });
            }
        }
    }

    /// Shared identity checks: non-empty, canonical, not already accepted.
    fn identity(&self, raw: Option<&str>, ctx: &mut RecordContext) -> Result<String, String> {
        let uuid = raw
            .map(canonical_uuid)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| "missing uuid".to_string())?;
        ctx.uuid = Some(uuid.clone());
        if self.seen.contains(&uuid) {
            return Err("duplicate uuid".to_string());
        }
        Ok(uuid)
    }

    fn conversation(
        &mut self,
        record: &Value,
        ctx: &mut RecordContext,
    ) -> Result<Conversation, String> {
        let raw = decode::<RawConversation>(record)?;
        let uuid = self.identity(raw.uuid.as_deref(), ctx)?;
        let (created_at, updated_at) = item_instants(
            raw.created_at.as_ref(),
            raw.updated_at.as_ref(),
            ctx,
        )?;

        let title = match non_blank(raw.name) {
            Some(t) => t,
            None => {
                ctx.repair("missing title");
                format!("Untitled conversation {}", short_id(&uuid))
            }
        };

        let records = match raw.chat_messages {
            Some(Value::Array(items)) => items,
            Some(_) => return Err("chat_messages is not an array".to_string()),
            None => return Err("no messages".to_string()),
        };

        let mut messages = Vec::with_capacity(records.len());
        let mut seen_messages = HashSet::new();
        let mut last_instant = created_at;
        for (i, record) in records.iter().enumerate() {
            match message(record, i, &uuid, last_instant, ctx) {
                Ok(msg) => {
                    if !seen_messages.insert(msg.uuid.clone()) {
                        ctx.repair(format!("message #{i}: duplicate uuid, skipped"));
                        continue;
                    }
                    last_instant = msg.created_at;
                    messages.push(msg);
                }
                Err(reason) => ctx.repair(format!("message #{i}: {reason}, skipped")),
            }
        }
        if messages.is_empty() {
            return Err("no valid messages".to_string());
        }
        messages.sort_by_key(|m| m.created_at);

        Ok(Conversation {
            uuid,
            title,
            summary: non_blank(raw.summary),
            created_at,
            updated_at,
            messages,
        })
    }

    fn project(&mut self, record: &Value, ctx: &mut RecordContext) -> Result<Project, String> {
        let raw = decode::<RawProject>(record)?;
        let uuid = self.identity(raw.uuid.as_deref(), ctx)?;
        let (created_at, updated_at) = item_instants(
            raw.created_at.as_ref(),
            raw.updated_at.as_ref(),
            ctx,
        )?;

        let name = match non_blank(raw.name) {
            Some(n) => n,
            None => {
                ctx.repair("missing name");
                format!("Untitled project {}", short_id(&uuid))
            }
        };

        // Projects may legitimately have no documents.
        let records = match raw.docs {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                ctx.repair("docs is not an array, treated as empty");
                Vec::new()
            }
        };

        let mut docs = Vec::with_capacity(records.len());
        let mut seen_docs = HashSet::new();
        for (i, record) in records.iter().enumerate() {
            match doc(record, i, &uuid, created_at, ctx) {
                Ok(d) => {
                    if seen_docs.insert(d.uuid.clone()) {
                        docs.push(d);
                    } else {
                        ctx.repair(format!("doc #{i}: duplicate uuid, skipped"));
                    }
                }
                Err(reason) => ctx.repair(format!("doc #{i}: {reason}, skipped")),
            }
        }

        Ok(Project {
            uuid,
            name,
            description: non_blank(raw.description),
            prompt_template: non_blank(raw.prompt_template),
            created_at,
            updated_at,
            docs,
        })
    }
}

fn message(
    record: &Value,
    index: usize,
    parent: &str,
    fallback_instant: DateTime<Utc>,
    ctx: &mut RecordContext,
) -> Result<Message, String> {
    let raw = decode::<RawMessage>(record)?;

    let uuid = match raw.uuid.as_deref().map(canonical_uuid).filter(|u| !u.is_empty()) {
        Some(u) => u,
        None => {
            ctx.repair(format!("message #{index}: missing uuid"));
            format!("{parent}-m{index}")
        }
    };
    let sender = match non_blank(raw.sender) {
        Some(s) => Sender::parse(&s),
        None => {
            ctx.repair(format!("message #{index}: missing sender"));
            Sender::Other("unknown".to_string())
        }
    };
    let created_at = match raw.created_at.as_ref().and_then(parse_instant) {
        Some(ts) => ts,
        None => {
            ctx.repair(format!("message #{index}: missing created_at"));
            fallback_instant
        }
    };

    let text = match non_blank(raw.text) {
        Some(t) => t,
        None => content_text(&raw.content),
    };
    let attachments = raw
        .attachments
        .into_iter()
        .filter_map(|a| {
            Some(Attachment {
                file_name: non_blank(a.file_name)?,
                extracted_content: non_blank(a.extracted_content),
            })
        })
        .collect();
    let files = raw
        .files
        .into_iter()
        .filter_map(|f| non_blank(f.file_name))
        .collect();

    Ok(Message {
        uuid,
        sender,
        text,
        created_at,
        attachments,
        files,
    })
}

fn doc(
    record: &Value,
    index: usize,
    parent: &str,
    fallback_instant: DateTime<Utc>,
    ctx: &mut RecordContext,
) -> Result<ProjectDoc, String> {
    let raw = decode::<RawDoc>(record)?;
    let ordinal = index + 1;

    let uuid = match raw.uuid.as_deref().map(canonical_uuid).filter(|u| !u.is_empty()) {
        Some(u) => u,
        None => {
            ctx.repair(format!("doc #{index}: missing uuid"));
            format!("{parent}-d{index}")
        }
    };
    let filename = match non_blank(raw.filename) {
        Some(f) => f,
        None => {
            ctx.repair(format!("doc #{index}: missing filename"));
            format!("document-{ordinal}")
        }
    };
    let content = match raw.content {
        Some(c) => c,
        None => {
            ctx.repair(format!("doc #{index}: missing content"));
            String::new()
        }
    };
    let created_at = match raw.created_at.as_ref().and_then(parse_instant) {
        Some(ts) => ts,
        None => {
            ctx.repair(format!("doc #{index}: missing created_at"));
            fallback_instant
        }
    };

    Ok(ProjectDoc {
        uuid,
        filename,
        content,
        created_at,
    })
}

fn decode<T: for<'de> Deserialize<'de>>(record: &Value) -> Result<T, String> {
    if !record.is_object() {
        return Err("record is not an object".to_string());
    }
    T::deserialize(record).map_err(|e| format!("malformed record: {e}"))
}

/// Resolve `created_at`/`updated_at`, letting either stand in for the other.
fn item_instants(
    created: Option<&Value>,
    updated: Option<&Value>,
    ctx: &mut RecordContext,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let created_ts = created.and_then(parse_instant);
    let updated_ts = updated.and_then(parse_instant);
    match (created_ts, updated_ts) {
        (Some(c), Some(u)) => Ok((c, u)),
        (Some(c), None) => {
            ctx.repair(missing_or_bad("updated_at", updated, "created_at"));
            Ok((c, c))
        }
        (None, Some(u)) => {
            ctx.repair(missing_or_bad("created_at", created, "updated_at"));
            Ok((u, u))
        }
        (None, None) => Err("no parseable created_at or updated_at".to_string()),
    }
}

fn missing_or_bad(field: &str, value: Option<&Value>, substitute: &str) -> String {
    match value {
        None | Some(Value::Null) => format!("missing {field}, using {substitute}"),
        Some(_) => format!("unparseable {field}, using {substitute}"),
    }
}

/// Join the text blocks of structured message content.
fn content_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lower-case hyphenated form for real UUIDs, trimmed input otherwise.
fn canonical_uuid(raw: &str) -> String {
    let trimmed = raw.trim();
    match uuid::Uuid::parse_str(trimmed) {
        Ok(parsed) => parsed.hyphenated().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

// ── Instants ─────────────────────────────────────────────────────────────────

/// Parse an export instant: RFC 3339 with any offset, a naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.f]` (taken as UTC), or epoch seconds/milliseconds.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_instant_str(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past year 5138 in seconds is really milliseconds.
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

pub fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}
