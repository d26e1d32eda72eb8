//! Shared test utilities for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use obsidize::{FixedClock, NullReporter, RunSummary, SyncConfig};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Instant on a fixed day in January 2025.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
}

/// RFC 3339 form of [`at`], as it appears in an export.
pub fn ts(day: u32, hour: u32) -> String {
    at(day, hour).to_rfc3339()
}

/// A temp directory holding an unpacked export next to a vault.
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("export")).expect("Failed to create export dir");
        Self { temp_dir }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.temp_dir.path().join("export")
    }

    pub fn vault(&self) -> PathBuf {
        self.temp_dir.path().join("vault")
    }

    /// Replace `conversations.json` in the export.
    pub fn write_conversations(&self, conversations: &[ConversationBuilder]) {
        let records: Vec<Value> = conversations.iter().map(|c| c.to_json()).collect();
        self.write_raw_conversations(&records);
    }

    pub fn write_raw_conversations(&self, records: &[Value]) {
        let content = serde_json::to_string_pretty(records).expect("Failed to encode export");
        fs::write(self.export_dir().join("conversations.json"), content)
            .expect("Failed to write conversations.json");
    }

    /// Replace `projects.json` in the export.
    pub fn write_projects(&self, projects: &[ProjectBuilder]) {
        let records: Vec<Value> = projects.iter().map(|p| p.to_json()).collect();
        let content = serde_json::to_string_pretty(&records).expect("Failed to encode export");
        fs::write(self.export_dir().join("projects.json"), content)
            .expect("Failed to write projects.json");
    }

    pub fn config(&self, now: DateTime<Utc>) -> SyncConfig {
        SyncConfig {
            clock: Arc::new(FixedClock(now)),
            ..SyncConfig::new(self.vault())
        }
    }

    /// Run a sync with the clock frozen at `now`.
    pub fn sync(&self, now: DateTime<Utc>) -> RunSummary {
        self.sync_with(self.config(now))
    }

    pub fn sync_with(&self, config: SyncConfig) -> RunSummary {
        obsidize::run_path(&self.export_dir(), &config, &NullReporter).expect("sync failed")
    }

    /// Every file in the vault, keyed by path relative to the vault root.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        let mut files = BTreeMap::new();
        collect_files(&self.vault(), &self.vault(), &mut files);
        files
    }

    /// Markdown files directly in the vault root.
    pub fn root_documents(&self) -> Vec<PathBuf> {
        let mut docs: Vec<PathBuf> = fs::read_dir(self.vault())
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
                    .collect()
            })
            .unwrap_or_default();
        docs.sort();
        docs
    }

    /// The single root document whose header carries `uuid`.
    pub fn document_for(&self, uuid: &str) -> PathBuf {
        let matches: Vec<PathBuf> = self
            .root_documents()
            .into_iter()
            .filter(|p| {
                fs::read_to_string(p)
                    .map(|t| header_value(&t, "uuid").as_deref() == Some(uuid))
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(matches.len(), 1, "expected one document for {uuid}: {matches:?}");
        matches.into_iter().next().unwrap()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            let content = fs::read_to_string(&path).unwrap_or_default();
            out.insert(path.strip_prefix(root).unwrap().to_path_buf(), content);
        }
    }
}

/// Number of message blocks in a rendered conversation.
pub fn message_blocks(text: &str) -> usize {
    text.lines()
        .filter(|l| l.starts_with("<!-- obsidize:message "))
        .count()
}

/// Value of a header key, read line by line.
pub fn header_value(text: &str, key: &str) -> Option<String> {
    text.lines()
        .skip(1)
        .take_while(|l| *l != "---")
        .find_map(|l| l.strip_prefix(&format!("{key}: ")).map(|v| v.trim_matches('\'').to_string()))
}

/// Builder for a conversation record in Claude's export format
#[derive(Clone)]
pub struct ConversationBuilder {
    uuid: Option<String>,
    name: String,
    created_at: String,
    updated_at: String,
    messages: Vec<Value>,
}

impl ConversationBuilder {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: Some(uuid.to_string()),
            name: format!("Conversation {uuid}"),
            created_at: ts(1, 9),
            updated_at: ts(1, 9),
            messages: Vec::new(),
        }
    }

    /// A record the validator must drop.
    pub fn without_uuid() -> Self {
        Self {
            uuid: None,
            ..Self::new("unused")
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn updated_at(mut self, when: DateTime<Utc>) -> Self {
        self.updated_at = when.to_rfc3339();
        self
    }

    /// Add a message; senders alternate starting with the human.
    pub fn message(mut self, uuid: &str, text: &str, when: DateTime<Utc>) -> Self {
        let sender = if self.messages.len() % 2 == 0 {
            "human"
        } else {
            "assistant"
        };
        self.messages.push(json!({
            "uuid": uuid,
            "sender": sender,
            "text": text,
            "created_at": when.to_rfc3339(),
        }));
        self
    }

    /// `count` messages named `<prefix>-<i>`, one hour apart from `start`.
    pub fn messages(mut self, prefix: &str, count: u32, start: DateTime<Utc>) -> Self {
        for i in 0..count {
            let when = start + chrono::Duration::hours(i as i64);
            self = self.message(&format!("{prefix}-{i}"), &format!("{prefix} message {i}"), when);
        }
        self
    }

    pub fn to_json(&self) -> Value {
        let mut record = json!({
            "name": self.name,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
            "chat_messages": self.messages,
        });
        if let Some(uuid) = &self.uuid {
            record["uuid"] = json!(uuid);
        }
        record
    }
}

/// Builder for a project record in Claude's export format
#[derive(Clone)]
pub struct ProjectBuilder {
    uuid: String,
    name: String,
    description: String,
    created_at: String,
    updated_at: String,
    docs: Vec<Value>,
}

impl ProjectBuilder {
    pub fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
            description: format!("About {name}"),
            created_at: ts(1, 9),
            updated_at: ts(1, 9),
            docs: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn updated_at(mut self, when: DateTime<Utc>) -> Self {
        self.updated_at = when.to_rfc3339();
        self
    }

    pub fn doc(mut self, uuid: &str, filename: &str, content: &str) -> Self {
        self.docs.push(json!({
            "uuid": uuid,
            "filename": filename,
            "content": content,
            "created_at": self.created_at,
        }));
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "name": self.name,
            "description": self.description,
            "prompt_template": "",
            "created_at": self.created_at,
            "updated_at": self.updated_at,
            "docs": self.docs,
        })
    }
}
