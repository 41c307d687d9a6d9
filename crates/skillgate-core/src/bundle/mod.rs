pub mod header;
pub mod read;
pub mod related;

use std::collections::BTreeSet;
use std::path::PathBuf;

pub use header::Header;
pub use read::{discover_bundles, load_bundle};
pub use related::RelatedFile;

/// File name of the required skill document inside every bundle.
pub const SKILL_DOCUMENT: &str = "SKILL.md";

/// Optional subfolders a bundle may carry. Each one present on disk is
/// expected to be referenced from the document body.
pub const OPTIONAL_FOLDERS: [&str; 3] = ["scripts", "assets", "references"];

/// One submitted skill folder, parsed.
///
/// Immutable for the duration of a pipeline run.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Folder name.
    pub id: String,

    /// Folder location at load time (informational only).
    pub path: PathBuf,

    pub header: Header,

    /// Full document text, header block included. Scanned as-is.
    pub document: String,

    /// Byte offset of the body within `document`.
    pub body_offset: usize,

    /// Optional subfolders present on disk.
    pub folders: BTreeSet<String>,

    /// Text files under `references/` and `scripts/`, scanned with the
    /// document.
    pub related: Vec<RelatedFile>,

    /// Hex sha256 over the document bytes, present folders and related
    /// files.
    pub content_hash: String,
}

impl Bundle {
    /// Document text following the header block.
    pub fn body(&self) -> &str {
        &self.document[self.body_offset..]
    }
}
