use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::bundle::header::parse_document;
use crate::bundle::related::related_files;
use crate::bundle::{Bundle, SKILL_DOCUMENT};
use crate::error::{IntakeError, MalformedReason};
use crate::util::hash::{bundle_hash, present_folders};

/// Read a bundle folder into memory.
///
/// Read-only. Fails with `MalformedBundle` when the skill document is
/// absent, not UTF-8, or its header block is missing, misplaced, badly
/// delimited, or lacks `name`/`description`.
pub fn load_bundle(dir: &Path) -> Result<Bundle, IntakeError> {
    let malformed = |reason| IntakeError::MalformedBundle {
        path: dir.to_path_buf(),
        reason,
    };

    let doc_path = dir.join(SKILL_DOCUMENT);
    let bytes = match fs::read(&doc_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound || doc_path.is_dir() => {
            return Err(malformed(MalformedReason::MissingDocument));
        }
        Err(err) => {
            return Err(malformed(MalformedReason::Unreadable {
                message: err.to_string(),
            }));
        }
    };

    let folders = present_folders(dir);
    let related = related_files(dir);
    let content_hash = bundle_hash(Some(&bytes), &folders, &related);

    let document = String::from_utf8(bytes).map_err(|_| malformed(MalformedReason::NotUtf8))?;
    let parsed = parse_document(&document).map_err(malformed)?;

    Ok(Bundle {
        id: folder_name(dir),
        path: dir.to_path_buf(),
        header: parsed.header,
        document,
        body_offset: parsed.body_offset,
        folders,
        related,
        content_hash,
    })
}

/// Immediate, non-hidden subdirectories of `dir`, sorted by name.
///
/// A missing `dir` yields an empty list; an empty intake area is not an
/// error.
pub fn discover_bundles(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", dir.display()));
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() && !entry.file_name().to_string_lossy().starts_with('.') {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

pub(crate) fn folder_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
