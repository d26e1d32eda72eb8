//! Raw export collections and the extractor that loads them.
//!
//! Claude's data export ships as a folder holding `conversations.json` and
//! `projects.json`. Both are arrays of loosely-typed records; nothing here is
//! trusted yet. The record structs below are intentionally permissive so that
//! the validator, not serde, decides what is salvageable.
//!
//! Layout accepted by [`load_export`]:
//! - a directory containing `conversations.json` and/or `projects.json`
//!   (also searched one directory level deep, for unpacked archives that
//!   wrap everything in a dated folder)
//! - a single `.json` file holding either a conversations array or an object
//!   with `conversations` and/or `projects` keys

use crate::error::SyncError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONVERSATIONS_FILE: &str = "conversations.json";
pub const PROJECTS_FILE: &str = "projects.json";

/// The two untyped collections an export is made of. `None` means the
/// collection was not present at all, which is different from empty.
#[derive(Debug, Clone, Default)]
pub struct RawExport {
    pub conversations: Option<Vec<Value>>,
    pub projects: Option<Vec<Value>>,
}

impl RawExport {
    pub fn has_collections(&self) -> bool {
        self.conversations.is_some() || self.projects.is_some()
    }
}

// ── Record shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConversation {
    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    pub created_at: Option<Value>,
    pub updated_at: Option<Value>,
    pub chat_messages: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sender: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub text: Option<String>,
    /// Structured content blocks (`{"type": "text", "text": ...}`, tool use, ...).
    pub content: Vec<Value>,
    pub created_at: Option<Value>,
    pub attachments: Vec<RawAttachment>,
    pub files: Vec<RawFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAttachment {
    #[serde(deserialize_with = "lenient_string")]
    pub file_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub extracted_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawFile {
    #[serde(deserialize_with = "lenient_string")]
    pub file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawProject {
    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub prompt_template: Option<String>,
    pub created_at: Option<Value>,
    pub updated_at: Option<Value>,
    pub docs: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawDoc {
    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub filename: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub content: Option<String>,
    pub created_at: Option<Value>,
}

/// Accept strings and numbers, map anything else (null, objects, ...) to `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Load the raw conversation and project collections from `path`.
///
/// Fails only when nothing usable is found or a file that exists cannot be
/// read or parsed; individual records are never inspected here.
pub fn load_export(path: &Path) -> Result<RawExport, SyncError> {
    let export = if path.is_dir() {
        load_from_dir(path)?
    } else {
        let value = read_json(path)?;
        from_value(value)
    };

    if !export.has_collections() {
        return Err(SyncError::NoItemCollections {
            path: path.to_path_buf(),
        });
    }
    debug!(
        conversations = export.conversations.as_ref().map_or(0, Vec::len),
        projects = export.projects.as_ref().map_or(0, Vec::len),
        "Loaded export"
    );
    Ok(export)
}

fn load_from_dir(dir: &Path) -> Result<RawExport, SyncError> {
    let Some(root) = locate_export_root(dir) else {
        return Ok(RawExport::default());
    };

    let conversations = match read_optional(&root.join(CONVERSATIONS_FILE))? {
        Some(value) => as_collection(value, CONVERSATIONS_FILE),
        None => None,
    };
    let projects = match read_optional(&root.join(PROJECTS_FILE))? {
        Some(value) => as_collection(value, PROJECTS_FILE),
        None => None,
    };
    Ok(RawExport {
        conversations,
        projects,
    })
}

/// The directory itself if it holds an export file, else the first child
/// directory (in name order) that does.
fn locate_export_root(dir: &Path) -> Option<PathBuf> {
    let holds_export =
        |d: &Path| d.join(CONVERSATIONS_FILE).is_file() || d.join(PROJECTS_FILE).is_file();
    if holds_export(dir) {
        return Some(dir.to_path_buf());
    }
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    children.sort();
    children.into_iter().find(|c| holds_export(c))
}

fn read_optional(path: &Path) -> Result<Option<Value>, SyncError> {
    if !path.is_file() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

fn read_json(path: &Path) -> Result<Value, SyncError> {
    let bytes = fs::read(path).map_err(|source| SyncError::UnreadableExport {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SyncError::MalformedExport {
        path: path.to_path_buf(),
        source,
    })
}

/// Interpret a single JSON document as an export.
pub fn from_value(value: Value) -> RawExport {
    match value {
        Value::Array(items) => RawExport {
            conversations: Some(items),
            projects: None,
        },
        Value::Object(mut obj) => RawExport {
            conversations: obj
                .remove("conversations")
                .and_then(|v| as_collection(v, "conversations")),
            projects: obj
                .remove("projects")
                .and_then(|v| as_collection(v, "projects")),
        },
        _ => RawExport::default(),
    }
}

fn as_collection(value: Value, label: &str) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        other => {
            warn!(
                collection = label,
                found = json_type(&other),
                "Ignoring collection that is not an array"
            );
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
