use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Replace `path` with `bytes` so readers see either the old file or the
/// complete new one, never a truncated write.
///
/// The temp file lives next to the destination so the final rename stays
/// on one filesystem.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, bytes)
        .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err).with_context(|| format!("failed to replace {}", path.display()));
    }

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
