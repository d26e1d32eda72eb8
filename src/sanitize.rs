//! Filename sanitising and allocation.
//!
//! Names are cosmetic: identity always comes from the `uuid` in the
//! frontmatter. A name only has to be a valid path component that does not
//! collide with somebody else's file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest slug kept in a file or folder name.
const MAX_SLUG_LEN: usize = 60;

/// First eight characters of an id, for display and short filename suffixes.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Turn free text into a safe, lower-case, dash-separated path component.
/// Returns an empty string when nothing usable is left.
pub fn sanitize(raw: &str) -> String {
    let raw_slug = slug::slugify(raw);
    // slug output is ASCII-only, so byte == char
    raw_slug[..raw_slug.len().min(MAX_SLUG_LEN)]
        .trim_end_matches('-')
        .to_string()
}

/// Sanitise a document filename, keeping its extension apart from the stem.
/// `Meeting Notes.MD` becomes (`meeting-notes`, `md`).
pub fn sanitize_filename(raw: &str) -> (String, String) {
    let path = Path::new(raw.trim());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| sanitize(&e.to_string_lossy()))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "md".to_string());
    let stem = sanitize(&stem);
    if stem.is_empty() {
        (sanitize(raw), ext)
    } else {
        (stem, ext)
    }
}

/// Hands out paths inside the vault so that no two items share one and no
/// file this tool did not write is ever claimed.
///
/// Each request supplies a base name; the allocator tries it with the id
/// appended at 8, 12 and full length (optionally trying the bare base first)
/// and takes the first candidate that is free or already owned by the same id.
#[derive(Debug, Default)]
pub struct PathAllocator {
    /// Paths known to belong to an id: indexed documents plus this run's claims.
    owners: HashMap<PathBuf, String>,
}

impl PathAllocator {
    pub fn new(owners: HashMap<PathBuf, String>) -> Self {
        Self { owners }
    }

    /// Allocate `<dir>/<base>_<id>.<ext>`.
    pub fn claim_file(&mut self, dir: &Path, base: &str, ext: &str, id: &str) -> PathBuf {
        self.claim(dir, base, Some(ext), id, false)
    }

    /// Allocate `<dir>/<base>.<ext>`, falling back to id suffixes on collision.
    pub fn claim_file_bare(&mut self, dir: &Path, base: &str, ext: &str, id: &str) -> PathBuf {
        self.claim(dir, base, Some(ext), id, true)
    }

    /// Allocate a folder `<dir>/<base>`, falling back to id suffixes on collision.
    pub fn claim_dir(&mut self, dir: &Path, base: &str, id: &str) -> PathBuf {
        self.claim(dir, base, None, id, true)
    }

    fn claim(
        &mut self,
        dir: &Path,
        base: &str,
        ext: Option<&str>,
        id: &str,
        bare_first: bool,
    ) -> PathBuf {
        let with_ext = |stem: String| match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };

        let mut candidates = Vec::with_capacity(4);
        if bare_first && !base.is_empty() {
            candidates.push(with_ext(base.to_string()));
        }
        for len in [8usize, 12usize, id.len()] {
            let prefix = &id[..floor_char_boundary(id, len)];
            candidates.push(with_ext(if base.is_empty() {
                prefix.to_string()
            } else {
                format!("{base}_{prefix}")
            }));
        }

        for name in &candidates {
            let path = dir.join(name);
            let free = match self.owners.get(&path) {
                Some(owner) => owner == id,
                None => !path.exists(),
            };
            if free {
                self.owners.insert(path.clone(), id.to_string());
                return path;
            }
        }

        // Full-id fallback; an id is unique so nobody else can own it
        let path = dir.join(with_ext(format!("{base}_{id}")));
        self.owners.insert(path.clone(), id.to_string());
        path
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
