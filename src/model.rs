//! Validated export items.
//!
//! Everything in here has already been through [`crate::validate`]: uuids are
//! non-empty, every instant is parsed and normalised to UTC, and messages are in
//! chronological order. Nothing downstream needs to re-check these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Human,
    Assistant,
    Other(String),
}

impl Sender {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" | "user" => Sender::Human,
            "assistant" | "claude" => Sender::Assistant,
            other => Sender::Other(other.to_string()),
        }
    }

    /// Heading label used in rendered documents.
    pub fn label(&self) -> &str {
        match self {
            Sender::Human => "User",
            Sender::Assistant => "Assistant",
            Sender::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub extracted_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uuid: String,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    /// Names of files referenced by the message without inline content.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub uuid: String,
    pub title: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDoc {
    pub uuid: String,
    pub filename: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub prompt_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Documents in their original export order.
    pub docs: Vec<ProjectDoc>,
}

/// Value of the `type` frontmatter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Conversation,
    ProjectOverview,
    ProjectDocument,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Conversation => "conversation",
            DocumentKind::ProjectOverview => "project-overview",
            DocumentKind::ProjectDocument => "project-document",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a top-level export item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Conversation,
    Project,
}

impl ItemKind {
    /// The document kind that carries this item's identity in the folder.
    pub fn document_kind(&self) -> DocumentKind {
        match self {
            ItemKind::Conversation => DocumentKind::Conversation,
            ItemKind::Project => DocumentKind::ProjectOverview,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Conversation => f.write_str("conversation"),
            ItemKind::Project => f.write_str("project"),
        }
    }
}

/// A reconcilable export item. The planner and indexer only look at the
/// identity accessors; rendering and merging dispatch on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportItem {
    Conversation(Conversation),
    Project(Project),
}

impl ExportItem {
    pub fn uuid(&self) -> &str {
        match self {
            ExportItem::Conversation(c) => &c.uuid,
            ExportItem::Project(p) => &p.uuid,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ExportItem::Conversation(c) => &c.title,
            ExportItem::Project(p) => &p.name,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ExportItem::Conversation(c) => c.created_at,
            ExportItem::Project(p) => p.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            ExportItem::Conversation(c) => c.updated_at,
            ExportItem::Project(p) => p.updated_at,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ExportItem::Conversation(_) => ItemKind::Conversation,
            ExportItem::Project(_) => ItemKind::Project,
        }
    }
}
