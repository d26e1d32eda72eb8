//! The metadata block at the top of every document this tool writes.
//!
//! ```yaml
//! ---
//! uuid: 0f8fad5b-d9cb-469f-a165-70867728950e
//! created_at: 2025-01-01T09:00:00Z
//! updated_at: 2025-01-02T17:30:00Z
//! obsidized_at: 2025-01-03T08:00:00Z
//! type: conversation
//! source: claude
//! obsidize_version: 0.1.0
//! ---
//! ```
//!
//! This block is the only persisted state. Reading is tolerant: a block that
//! cannot be understood makes the file invisible to the indexer, and a bad
//! timestamp only blanks that one field. Refreshing rewrites the `updated_at`,
//! `obsidized_at` and `obsidize_version` lines and leaves every other line
//! (including keys added by the user) byte-for-byte intact.

use crate::model::DocumentKind;
use crate::validate::parse_instant_str;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const FENCE: &str = "---";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header written on create.
#[derive(Debug, Clone, Serialize)]
pub struct Frontmatter<'a> {
    pub uuid: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub obsidized_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub source: &'a str,
    pub obsidize_version: &'a str,
}

impl Frontmatter<'_> {
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("{FENCE}\n{yaml}{FENCE}\n"))
    }
}

/// The sync stamp shared by every document written in one run.
#[derive(Debug, Clone)]
pub struct SyncStamp {
    pub now: DateTime<Utc>,
    pub source: String,
}

impl SyncStamp {
    /// `obsidized_at` for an item, never earlier than its `updated_at`, so a
    /// skewed clock cannot make a fresh document look stale on the next run.
    pub fn obsidized_at(&self, updated_at: DateTime<Utc>) -> DateTime<Utc> {
        self.now.max(updated_at)
    }

    pub fn frontmatter<'a>(
        &'a self,
        uuid: &'a str,
        kind: DocumentKind,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Frontmatter<'a> {
        Frontmatter {
            uuid,
            created_at,
            updated_at,
            obsidized_at: self.obsidized_at(updated_at),
            kind,
            source: &self.source,
            obsidize_version: VERSION,
        }
    }
}

/// What the indexer needs from a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub uuid: String,
    pub kind: DocumentKind,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub obsidized_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub obsidize_version: Option<String>,
}

/// A document split at its closing fence.
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    /// YAML between the fences, without the fence lines.
    pub yaml: &'a str,
    pub yaml_start: usize,
    /// Byte offset of the closing fence line.
    pub fence_start: usize,
    /// Byte offset where the body begins (just past the closing fence line).
    pub body_start: usize,
    pub body: &'a str,
}

/// Split `text` into frontmatter and body. `None` when the text does not open
/// with a fence or the fence is never closed.
pub fn split(text: &str) -> Option<Split<'_>> {
    let first_len = line_len(text, 0);
    if text[..first_len].trim_end() != FENCE {
        return None;
    }
    let yaml_start = first_len;
    let mut pos = yaml_start;
    while pos < text.len() {
        let len = line_len(text, pos);
        if text[pos..pos + len].trim_end() == FENCE {
            let body_start = pos + len;
            return Some(Split {
                yaml: &text[yaml_start..pos],
                yaml_start,
                fence_start: pos,
                body_start,
                body: &text[body_start..],
            });
        }
        pos += len;
    }
    None
}

/// Length of the line starting at `start`, including its newline.
fn line_len(text: &str, start: usize) -> usize {
    match text[start..].find('\n') {
        Some(i) => i + 1,
        None => text.len() - start,
    }
}

/// Parse the header of a document. Requires a non-empty `uuid` and a known
/// `type`; timestamps that do not parse are left as `None`.
pub fn parse(text: &str) -> Option<Header> {
    let split = split(text)?;
    let map: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(split.yaml).ok()?;

    let uuid = scalar(map.get("uuid")?)?.trim().to_string();
    if uuid.is_empty() {
        return None;
    }
    let kind: DocumentKind = serde_yaml::from_value(map.get("type")?.clone()).ok()?;
    let instant = |key: &str| {
        map.get(key)
            .and_then(scalar)
            .and_then(|s| parse_instant_str(&s))
    };

    Some(Header {
        uuid,
        kind,
        created_at: instant("created_at"),
        updated_at: instant("updated_at"),
        obsidized_at: instant("obsidized_at"),
        source: map.get("source").and_then(scalar),
        obsidize_version: map.get("obsidize_version").and_then(scalar),
    })
}

/// Read and parse the header of the file at `path`.
pub fn read(path: &Path) -> Option<Header> {
    let text = fs::read_to_string(path).ok()?;
    parse(&text)
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Rewrite the sync fields of an existing header in place, returning the new
/// document text. Missing keys are added just before the closing fence.
pub fn refresh(
    text: &str,
    updated_at: DateTime<Utc>,
    obsidized_at: DateTime<Utc>,
) -> Option<String> {
    let split = split(text)?;
    let replacements = [
        ("updated_at", format_instant(updated_at)),
        ("obsidized_at", format_instant(obsidized_at)),
        ("obsidize_version", VERSION.to_string()),
    ];
    let mut seen = [false; 3];

    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(&text[..split.yaml_start]);
    for line in split.yaml.split_inclusive('\n') {
        let key = line.split(':').next().unwrap_or_default();
        match replacements.iter().position(|(k, _)| *k == key) {
            Some(i) => {
                seen[i] = true;
                out.push_str(&format!("{}: {}\n", replacements[i].0, replacements[i].1));
            }
            None => {
                out.push_str(line);
                if !line.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
    for (i, (key, value)) in replacements.iter().enumerate() {
        if !seen[i] {
            out.push_str(&format!("{key}: {value}\n"));
        }
    }
    out.push_str(&text[split.fence_start..]);
    Some(out)
}

/// RFC 3339 in UTC with a `Z` suffix, the same form serde writes on create.
pub fn format_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}
