//! Writer: full renders for new items and the file plumbing shared with the
//! merger.
//!
//! Every document goes through a temp file in its own directory that is then
//! renamed over the destination, so a failed write never leaves a truncated
//! document behind.

use crate::frontmatter::SyncStamp;
use crate::index::ProjectFolder;
use crate::model::{Conversation, DocumentKind, Project, ProjectDoc};
use crate::render::{self, DocLink};
use crate::sanitize::{PathAllocator, sanitize, sanitize_filename};
use eyre::{Context, Result, eyre};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stem of the overview document inside a project folder.
pub const OVERVIEW_STEM: &str = "00_overview";

/// Render into a temp file beside `path` and move it into place.
pub fn write_document<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<NamedTempFile>) -> io::Result<()>,
{
    let dir = path
        .parent()
        .ok_or_else(|| eyre!("No parent directory for {}", path.display()))?;
    let tmp = NamedTempFile::new_in(dir)
        .wrap_err_with(|| format!("Failed to create temp file in {}", dir.display()))?;
    match fs::metadata(path) {
        Ok(meta) => tmp
            .as_file()
            .set_permissions(meta.permissions())
            .wrap_err_with(|| format!("Failed to copy permissions of {}", path.display()))?,
        Err(_) => default_permissions(tmp.as_file())?,
    }

    let mut writer = BufWriter::new(tmp);
    render(&mut writer).wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    writer.flush().wrap_err("Failed to flush document")?;
    let tmp = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .wrap_err("Failed to flush document")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .wrap_err_with(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn default_permissions(file: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
        .wrap_err("Failed to set document permissions")
}

#[cfg(not(unix))]
fn default_permissions(_file: &fs::File) -> Result<()> {
    Ok(())
}

/// Replace the file at `path` with `contents`.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    write_document(path, |w| w.write_all(contents.as_bytes()))
}

// ── Conversations ────────────────────────────────────────────────────────────

/// Path for a conversation: sanitised title plus uuid prefix, at the vault root.
pub fn conversation_path(alloc: &mut PathAllocator, vault: &Path, conv: &Conversation) -> PathBuf {
    alloc.claim_file(vault, &sanitize(&conv.title), "md", &conv.uuid)
}

pub fn write_conversation(path: &Path, conv: &Conversation, stamp: &SyncStamp) -> Result<()> {
    let fm = stamp.frontmatter(
        &conv.uuid,
        DocumentKind::Conversation,
        conv.created_at,
        conv.updated_at,
    );
    write_document(path, |w| render::render_conversation(w, &fm, conv))
}

// ── Projects ─────────────────────────────────────────────────────────────────

/// Where each part of a project lives, decided before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub dir: PathBuf,
    pub overview: PathBuf,
    /// One slot per export document, in export order.
    pub docs: Vec<DocSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSlot {
    pub path: PathBuf,
    /// Sanitised extension of the export filename, picks prose vs code fence.
    pub extension: String,
    /// False for documents already in the folder that must be left alone.
    pub write: bool,
}

/// Lay out `project`, reusing `existing` folder contents where present.
///
/// With `rewrite_existing` every document is written, including ones already
/// in the folder (used when a folder is re-derived from scratch). Otherwise
/// matched documents keep their file untouched and only new ones are written.
pub fn layout_project(
    alloc: &mut PathAllocator,
    vault: &Path,
    project: &Project,
    existing: Option<&ProjectFolder>,
    rewrite_existing: bool,
) -> ProjectLayout {
    let dir = match existing {
        Some(folder) => folder.dir.clone(),
        None => alloc.claim_dir(vault, &project_dir_base(project), &project.uuid),
    };
    let overview = match existing {
        Some(folder) => folder.overview.path.clone(),
        None => alloc.claim_file_bare(&dir, OVERVIEW_STEM, "md", &project.uuid),
    };

    let mut matched: HashSet<PathBuf> = HashSet::new();
    let docs = project
        .docs
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let (stem, extension) = sanitize_filename(&doc.filename);
            let found = existing.and_then(|folder| find_existing_doc(folder, doc, &stem, &matched));
            match found {
                Some(path) => {
                    matched.insert(path.clone());
                    DocSlot {
                        path,
                        extension,
                        write: rewrite_existing,
                    }
                }
                None => {
                    let base = if stem.is_empty() {
                        format!("{:02}", i + 1)
                    } else {
                        format!("{:02}_{}", i + 1, stem)
                    };
                    DocSlot {
                        path: alloc.claim_file_bare(&dir, &base, "md", &doc.uuid),
                        extension,
                        write: true,
                    }
                }
            }
        })
        .collect();

    ProjectLayout {
        dir,
        overview,
        docs,
    }
}

fn project_dir_base(project: &Project) -> String {
    let base = sanitize(&project.name);
    if base.is_empty() {
        "project".to_string()
    } else {
        base
    }
}

/// An existing document matches by uuid first, then by sanitised filename
/// with the ordinal prefix ignored.
fn find_existing_doc(
    folder: &ProjectFolder,
    doc: &ProjectDoc,
    stem: &str,
    taken: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let available = || folder.documents.iter().filter(|d| !taken.contains(&d.path));
    if let Some(entry) = available().find(|d| d.uuid == doc.uuid) {
        return Some(entry.path.clone());
    }
    if stem.is_empty() {
        return None;
    }
    available()
        .find(|d| name_key(&d.path).as_deref() == Some(stem))
        .map(|d| d.path.clone())
}

/// `01_meeting-notes.md` -> `meeting-notes`.
fn name_key(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let rest = stem.trim_start_matches(|c: char| c.is_ascii_digit());
    Some(rest.strip_prefix('_').unwrap_or(rest).to_string())
}

pub fn write_project_doc(slot: &DocSlot, doc: &ProjectDoc, stamp: &SyncStamp) -> Result<()> {
    let fm = stamp.frontmatter(
        &doc.uuid,
        DocumentKind::ProjectDocument,
        doc.created_at,
        doc.created_at,
    );
    write_document(&slot.path, |w| {
        render::render_project_doc(w, &fm, doc, &slot.extension)
    })
}

/// Write (or fully rewrite) the overview. The overview is system-owned.
pub fn write_project_overview(
    layout: &ProjectLayout,
    project: &Project,
    stamp: &SyncStamp,
) -> Result<()> {
    let folder_name = layout
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let links: Vec<DocLink> = layout
        .docs
        .iter()
        .zip(&project.docs)
        .map(|(slot, doc)| {
            let stem = slot
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            DocLink {
                target: format!("{folder_name}/{stem}"),
                label: doc.filename.clone(),
            }
        })
        .collect();

    let fm = stamp.frontmatter(
        &project.uuid,
        DocumentKind::ProjectOverview,
        project.created_at,
        project.updated_at,
    );
    write_document(&layout.overview, |w| {
        render::render_project_overview(w, &fm, project, &links)
    })
}

/// Write every pending document of a project, then its overview. Returns the
/// number of documents written.
pub fn write_project(layout: &ProjectLayout, project: &Project, stamp: &SyncStamp) -> Result<usize> {
    fs::create_dir_all(&layout.dir)
        .wrap_err_with(|| format!("Failed to create project folder {}", layout.dir.display()))?;

    let mut written = 0;
    for (slot, doc) in layout.docs.iter().zip(&project.docs) {
        if slot.write {
            write_project_doc(slot, doc, stamp)?;
            written += 1;
        }
    }
    // Last, so a folder whose overview exists has all its documents.
    write_project_overview(layout, project, stamp)?;
    Ok(written)
}
