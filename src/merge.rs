//! Document Merger: folds new upstream content into documents that already
//! exist in the vault.
//!
//! Conversations are append-only. Messages without an anchor in the document
//! are rendered and inserted just before the [`END_MARKER`] line; everything
//! else in the file, including edits made in Obsidian, is kept byte for byte.
//! Only the sync lines of the header are rewritten. A document that carries
//! no anchors at all falls back to time ordering against its last sync.
//!
//! Projects keep their existing documents, gain the missing ones, and get a
//! fresh overview.

use crate::frontmatter::{self, SyncStamp};
use crate::model::{Conversation, Message, Project};
use crate::render::{self, END_MARKER};
use crate::writer::{self, ProjectLayout};
use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// How the delta of a conversation is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Not anchored yet. When the document has no anchors to go by, only
    /// messages strictly newer than the last sync.
    SinceSync(Option<DateTime<Utc>>),
    /// Every message without an anchor, whatever its timestamp.
    Unanchored,
}

impl DeltaMode {
    fn includes(&self, msg: &Message, anchors: &HashSet<&str>) -> bool {
        if anchors.contains(msg.uuid.as_str()) {
            return false;
        }
        match self {
            DeltaMode::SinceSync(Some(synced_at)) if anchors.is_empty() => {
                msg.created_at > *synced_at
            }
            DeltaMode::SinceSync(_) | DeltaMode::Unanchored => true,
        }
    }
}

/// Merge `conv` into the document text, returning the new text and the number
/// of message blocks appended.
pub fn merge_conversation_text(
    text: &str,
    conv: &Conversation,
    mode: DeltaMode,
    stamp: &SyncStamp,
) -> Result<(String, usize)> {
    let split = frontmatter::split(text).ok_or_else(|| eyre!("Document has no frontmatter"))?;
    let anchors: HashSet<&str> = split.body.lines().filter_map(render::parse_anchor).collect();

    let delta: Vec<&Message> = conv
        .messages
        .iter()
        .filter(|msg| mode.includes(msg, &anchors))
        .collect();

    let merged = if delta.is_empty() {
        text.to_string()
    } else {
        let mut blocks = Vec::new();
        for msg in &delta {
            render::render_message(&mut blocks, msg)?;
        }
        let blocks = String::from_utf8(blocks).wrap_err("Rendered message is not UTF-8")?;
        insert_blocks(text, split.body_start, &blocks)
    };

    let refreshed = frontmatter::refresh(
        &merged,
        conv.updated_at,
        stamp.obsidized_at(conv.updated_at),
    )
    .ok_or_else(|| eyre!("Document has no frontmatter"))?;
    Ok((refreshed, delta.len()))
}

/// Insert `blocks` before the last marker line of the body, or append them
/// with a new marker when the marker is gone.
fn insert_blocks(text: &str, body_start: usize, blocks: &str) -> String {
    let mut out = String::with_capacity(text.len() + blocks.len() + END_MARKER.len() + 2);
    match marker_offset(text, body_start) {
        Some(pos) => {
            let before = &text[..pos];
            out.push_str(before);
            if !before.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(blocks);
            out.push_str(&text[pos..]);
        }
        None => {
            out.push_str(text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
            out.push_str(blocks);
            out.push_str(END_MARKER);
            out.push('\n');
        }
    }
    out
}

/// Byte offset of the start of the last line that is exactly the marker.
fn marker_offset(text: &str, body_start: usize) -> Option<usize> {
    let mut found = None;
    let mut pos = body_start;
    for line in text[body_start..].split_inclusive('\n') {
        if line.trim() == END_MARKER {
            found = Some(pos);
        }
        pos += line.len();
    }
    found
}

/// Merge into the conversation document at `path`. Returns the number of
/// message blocks appended.
pub fn merge_conversation(
    path: &Path,
    conv: &Conversation,
    mode: DeltaMode,
    stamp: &SyncStamp,
) -> Result<usize> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let (merged, appended) = merge_conversation_text(&text, conv, mode, stamp)
        .wrap_err_with(|| format!("Failed to merge {}", path.display()))?;
    debug!(path = %path.display(), appended, "Merged conversation");
    writer::write_text(path, &merged)?;
    Ok(appended)
}

/// Re-derive the conversation at `path` after its sync stamp was lost. An
/// anchored body is kept and completed; anything else is rendered afresh.
pub fn rebuild_conversation(path: &Path, conv: &Conversation, stamp: &SyncStamp) -> Result<()> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let anchored = frontmatter::split(&text)
        .is_some_and(|split| split.body.lines().any(|line| render::parse_anchor(line).is_some()));
    if !anchored {
        warn!(path = %path.display(), "No message anchors, replacing document content");
        return writer::write_conversation(path, conv, stamp);
    }
    let (merged, appended) = merge_conversation_text(&text, conv, DeltaMode::Unanchored, stamp)
        .wrap_err_with(|| format!("Failed to rebuild {}", path.display()))?;
    debug!(path = %path.display(), appended, "Rebuilt conversation header");
    writer::write_text(path, &merged)
}

/// Write the project documents that are not in the folder yet and rewrite the
/// overview. Returns the number of documents added.
pub fn merge_project(layout: &ProjectLayout, project: &Project, stamp: &SyncStamp) -> Result<usize> {
    let added = writer::write_project(layout, project, stamp)?;
    debug!(dir = %layout.dir.display(), added, "Merged project");
    Ok(added)
}
