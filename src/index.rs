//! Folder Indexer.
//!
//! Rebuilt from scratch on every run by reading frontmatter; there is no
//! cache. Only the layout this tool produces is scanned:
//!
//! ```text
//! vault/
//!   some-chat_0f8fad5b.md        conversation
//!   research/
//!     00_overview.md             project-overview
//!     01_notes.md                project-document
//! ```
//!
//! Anything else (files without a header, headers that do not parse, a header
//! whose type does not belong where the file sits, a second file claiming an
//! already indexed uuid) is counted as ignored and otherwise left alone.

use crate::frontmatter::{self, Header};
use crate::model::DocumentKind;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parsed metadata of one document in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub uuid: String,
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// `None` when the stamp is missing or unparseable.
    pub obsidized_at: Option<DateTime<Utc>>,
}

impl FolderEntry {
    fn from_header(header: Header, path: PathBuf) -> Self {
        Self {
            uuid: header.uuid,
            kind: header.kind,
            path,
            created_at: header.created_at,
            updated_at: header.updated_at,
            obsidized_at: header.obsidized_at,
        }
    }
}

/// A project sub-folder: its overview plus the documents beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFolder {
    pub dir: PathBuf,
    pub overview: FolderEntry,
    /// Sorted by file name, which follows the ordinal prefix.
    pub documents: Vec<FolderEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    pub conversations: HashMap<String, FolderEntry>,
    pub projects: HashMap<String, ProjectFolder>,
    /// Markdown files skipped during the scan.
    pub ignored: usize,
}

impl FolderIndex {
    /// The entry carrying an item's identity, conversation or overview.
    pub fn entry(&self, uuid: &str) -> Option<&FolderEntry> {
        self.conversations
            .get(uuid)
            .or_else(|| self.projects.get(uuid).map(|p| &p.overview))
    }

    pub fn len(&self) -> usize {
        self.conversations.len() + self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every indexed path mapped to the uuid written in its header, and every
    /// project folder mapped to its project uuid.
    pub fn owners(&self) -> HashMap<PathBuf, String> {
        let mut owners = HashMap::new();
        for entry in self.conversations.values() {
            owners.insert(entry.path.clone(), entry.uuid.clone());
        }
        for (uuid, project) in &self.projects {
            owners.insert(project.dir.clone(), uuid.clone());
            owners.insert(project.overview.path.clone(), uuid.clone());
            for doc in &project.documents {
                owners.insert(doc.path.clone(), doc.uuid.clone());
            }
        }
        owners
    }
}

/// Index the vault at `root`. A missing root yields an empty index.
pub fn scan(root: &Path) -> FolderIndex {
    let mut index = FolderIndex::default();
    let Ok(entries) = fs::read_dir(root) else {
        debug!(root = %root.display(), "Vault folder not found, starting empty");
        return index;
    };

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => dirs.push(path),
            Ok(ft) if ft.is_file() && is_markdown(&path) => files.push(path),
            _ => {}
        }
    }
    // Sorted so the first of two files claiming one uuid always wins.
    files.sort();
    dirs.sort();

    for path in files {
        match frontmatter::read(&path) {
            Some(header) if header.kind == DocumentKind::Conversation => {
                let entry = FolderEntry::from_header(header, path);
                if let Some(existing) = index.conversations.get(&entry.uuid) {
                    warn!(
                        uuid = %entry.uuid,
                        kept = %existing.path.display(),
                        skipped = %entry.path.display(),
                        "Duplicate conversation uuid in vault"
                    );
                    index.ignored += 1;
                } else {
                    index.conversations.insert(entry.uuid.clone(), entry);
                }
            }
            _ => index.ignored += 1,
        }
    }

    for dir in dirs {
        scan_project_dir(&dir, &mut index);
    }

    debug!(
        conversations = index.conversations.len(),
        projects = index.projects.len(),
        ignored = index.ignored,
        "Indexed vault"
    );
    index
}

fn scan_project_dir(dir: &Path, index: &mut FolderIndex) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_markdown(p) && !is_hidden(p))
        .collect();
    files.sort();

    let mut overview: Option<FolderEntry> = None;
    let mut documents = Vec::new();
    let mut ignored = 0usize;
    for path in files {
        match frontmatter::read(&path) {
            Some(header) if header.kind == DocumentKind::ProjectOverview && overview.is_none() => {
                overview = Some(FolderEntry::from_header(header, path));
            }
            Some(header) if header.kind == DocumentKind::ProjectDocument => {
                documents.push(FolderEntry::from_header(header, path));
            }
            _ => ignored += 1,
        }
    }

    match overview {
        Some(overview) if !index.projects.contains_key(&overview.uuid) => {
            index.projects.insert(
                overview.uuid.clone(),
                ProjectFolder {
                    dir: dir.to_path_buf(),
                    overview,
                    documents,
                },
            );
            index.ignored += ignored;
        }
        Some(overview) => {
            warn!(
                uuid = %overview.uuid,
                skipped = %dir.display(),
                "Duplicate project uuid in vault"
            );
            index.ignored += ignored + 1 + documents.len();
        }
        // Documents without an overview are orphans.
        None => index.ignored += ignored + documents.len(),
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
