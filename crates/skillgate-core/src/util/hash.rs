//! Content fingerprints.
//!
//! A bundle's identity depends only on the bytes of its skill document, the
//! set of optional subfolders present next to it and its scanned related
//! files. Filesystem metadata
//! (timestamps, permissions, location) is ignored so a bundle keeps the same
//! hash when it is moved between intake, library and quarantine.

use std::collections::BTreeSet;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::bundle::related::related_files;
use crate::bundle::{OPTIONAL_FOLDERS, RelatedFile, SKILL_DOCUMENT};

pub const HASH_ALGORITHM: &str = "sha256";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of a bundle's document bytes plus its present optional folders and
/// related files.
///
/// Folder names are fed in sorted order, separated by NUL, so the hash does
/// not depend on directory iteration order. Related files arrive sorted by
/// path from the loader.
pub fn bundle_hash(
    document: Option<&[u8]>,
    folders: &BTreeSet<String>,
    related: &[RelatedFile],
) -> String {
    let mut hasher = Sha256::new();
    match document {
        Some(bytes) => {
            hasher.update(b"doc:");
            hasher.update(bytes);
        }
        None => hasher.update(b"nodoc"),
    }
    for folder in folders {
        hasher.update([0u8]);
        hasher.update(folder.as_bytes());
    }
    for file in related {
        hasher.update(b"\0file:");
        hasher.update(file.path.as_bytes());
        hasher.update([0u8]);
        hasher.update((file.text.len() as u64).to_le_bytes());
        hasher.update(file.text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Optional subfolders present on disk under `dir`.
pub fn present_folders(dir: &Path) -> BTreeSet<String> {
    OPTIONAL_FOLDERS
        .iter()
        .filter(|name| dir.join(name).is_dir())
        .map(|name| name.to_string())
        .collect()
}

/// Hash a bundle directory without parsing it.
///
/// Used by sweeps to decide whether a bundle changed since it was last
/// concluded. An unreadable document hashes like a missing one.
pub fn bundle_dir_hash(dir: &Path) -> String {
    let document = std::fs::read(dir.join(SKILL_DOCUMENT)).ok();
    bundle_hash(
        document.as_deref(),
        &present_folders(dir),
        &related_files(dir),
    )
}
