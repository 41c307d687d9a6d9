//! Text files shipped alongside the skill document.
//!
//! Scripts and reference material are read into the bundle so the scanner
//! sees every piece of text the skill can hand to an agent, not just
//! `SKILL.md`.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

/// Subfolders whose files are scanned.
pub const SCANNED_FOLDERS: [&str; 2] = ["references", "scripts"];

/// Extensions treated as scannable text.
pub const SCANNED_EXTENSIONS: [&str; 10] = [
    "md", "txt", "rst", "py", "sh", "ps1", "json", "yaml", "yml", "toml",
];

/// Larger files are skipped.
pub const MAX_RELATED_BYTES: u64 = 256 * 1024;

/// At most this many related files are read per bundle, in path order.
pub const MAX_RELATED_FILES: usize = 39;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedFile {
    /// Path relative to the bundle folder, `/`-separated.
    pub path: String,
    /// File contents; invalid UTF-8 sequences are replaced.
    pub text: String,
}

/// Scannable text files under the bundle's `references/` and `scripts/`
/// folders, sorted by path. Symlinks are not followed; unreadable files are
/// skipped.
pub fn related_files(dir: &Path) -> Vec<RelatedFile> {
    let mut files = Vec::new();

    for folder in SCANNED_FOLDERS {
        let root = dir.join(folder);
        if !root.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if files.len() == MAX_RELATED_FILES {
                return files;
            }
            if !entry.file_type().is_file() || !is_scannable(entry.path()) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
            if size > MAX_RELATED_BYTES {
                continue;
            }
            let Ok(bytes) = fs::read(entry.path()) else {
                continue;
            };
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };

            files.push(RelatedFile {
                path: relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
    }

    files
}

fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SCANNED_EXTENSIONS.contains(&e.as_str()))
}
