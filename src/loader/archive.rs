use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use log::{debug, warn};
use zip::ZipArchive;

use super::{local, SourceFile, WalkOptions};
use crate::error::{AtlasError, Result};

const SYMLINK_MODE: u32 = 0o120000;
const FILE_TYPE_MASK: u32 = 0o170000;

/// Unpacks a ZIP archive into a fresh scratch directory and reads it back
///
/// Every entry is checked before anything is written, so an unsafe archive
/// extracts zero files. The scratch directory is removed when this returns,
/// whether it succeeds or not. `max_bytes` caps the extracted size; `walk`
/// governs which extracted files are read back.
pub fn unpack(bytes: &[u8], scratch_root: &Path, max_bytes: u64, walk: &WalkOptions) -> Result<Vec<SourceFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AtlasError::InvalidSource(format!("Invalid ZIP archive: {}", e)))?;

    let entries = check_entries(&mut archive, max_bytes)?;

    fs::create_dir_all(scratch_root)?;
    let scratch = tempfile::Builder::new()
        .prefix("codeatlas-")
        .tempdir_in(scratch_root)?;
    debug!("Extracting {} entries into {}", entries.len(), scratch.path().display());

    extract(&mut archive, &entries, scratch.path(), max_bytes)?;
    let root = local::unwrap_single_dir(scratch.path())?;
    local::read_tree(&root, walk)
}

/// An entry that passed validation
#[derive(Debug)]
struct CheckedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

/// Rejects traversal, absolute paths, symlinks and oversized archives
fn check_entries<R: Read + Seek>(archive: &mut ZipArchive<R>, max_bytes: u64) -> Result<Vec<CheckedEntry>> {
    let mut entries = Vec::with_capacity(archive.len());
    let mut declared: u64 = 0;

    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| AtlasError::InvalidSource(format!("Corrupt archive entry #{}: {}", index, e)))?;
        let name = file.name().to_string();

        let relative = safe_relative_path(&name).ok_or_else(|| {
            warn!("Rejecting archive with unsafe entry {:?}", name);
            AtlasError::InvalidSource(format!("Unsafe archive entry: {}", name))
        })?;
        if file.enclosed_name().is_none() {
            return Err(AtlasError::InvalidSource(format!("Unsafe archive entry: {}", name)));
        }
        if file
            .unix_mode()
            .map(|mode| mode & FILE_TYPE_MASK == SYMLINK_MODE)
            .unwrap_or(false)
        {
            return Err(AtlasError::InvalidSource(format!("Archive entry {} is a symbolic link", name)));
        }

        declared = declared.saturating_add(file.size());
        if declared > max_bytes {
            return Err(AtlasError::InvalidSource(format!(
                "Archive expands beyond the {} byte limit",
                max_bytes
            )));
        }

        entries.push(CheckedEntry {
            index,
            relative,
            is_dir: file.is_dir(),
        });
    }
    Ok(entries)
}

/// Returns the entry name as a relative path, or `None` if it could escape the target
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('\0') {
        return None;
    }
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return None;
    }

    let mut path = PathBuf::new();
    for component in normalized.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            part => path.push(part),
        }
    }
    Some(path)
}

fn extract<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entries: &[CheckedEntry],
    target: &Path,
    max_bytes: u64,
) -> Result<()> {
    let mut written: u64 = 0;

    for entry in entries {
        // Bare "./" entries carry nothing to extract.
        if entry.relative.as_os_str().is_empty() {
            continue;
        }
        let out_path = target.join(&entry.relative);
        if entry.is_dir {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = archive
            .by_index(entry.index)
            .map_err(|e| AtlasError::InvalidSource(format!("Corrupt archive entry #{}: {}", entry.index, e)))?;
        let remaining = max_bytes.saturating_sub(written);
        let mut out = File::create(&out_path)?;
        let copied = io::copy(&mut file.take(remaining + 1), &mut out)
            .map_err(|e| AtlasError::InvalidSource(format!("Failed to extract {}: {}", entry.relative.display(), e)))?;
        written += copied;
        if copied > remaining {
            return Err(AtlasError::InvalidSource(format!(
                "Archive expands beyond the {} byte limit",
                max_bytes
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn scratch_is_empty(root: &Path) -> bool {
        fs::read_dir(root).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[test]
    fn test_unpack_strips_wrapper_directory() -> Result<()> {
        let scratch = TempDir::new()?;
        let bytes = build_zip(&[
            ("repo-main/README.md", "# Repo"),
            ("repo-main/src/main.py", "print('hi')"),
        ]);

        let files = unpack(&bytes, scratch.path(), 1_000_000, &WalkOptions::new(1_000_000))?;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.py"]);
        assert!(scratch_is_empty(scratch.path()));
        Ok(())
    }

    #[test]
    fn test_traversal_entry_rejects_whole_archive() {
        let scratch = TempDir::new().unwrap();
        let bytes = build_zip(&[
            ("ok.txt", "fine"),
            ("../../etc/passwd", "root:x:0:0"),
        ]);

        let result = unpack(&bytes, scratch.path(), 1_000_000, &WalkOptions::new(1_000_000));
        assert!(matches!(result, Err(AtlasError::InvalidSource(msg)) if msg.contains("../../etc/passwd")));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn test_absolute_entry_is_rejected() {
        let scratch = TempDir::new().unwrap();
        let bytes = build_zip(&[("/etc/hosts", "127.0.0.1")]);
        let result = unpack(&bytes, scratch.path(), 1_000, &WalkOptions::new(1_000));
        assert!(matches!(result, Err(AtlasError::InvalidSource(_))));
    }

    #[test]
    fn test_size_limit() {
        let scratch = TempDir::new().unwrap();
        let big = "a".repeat(2048);
        let bytes = build_zip(&[("big.txt", big.as_str())]);

        let result = unpack(&bytes, scratch.path(), 1024, &WalkOptions::new(1024));
        assert!(matches!(result, Err(AtlasError::InvalidSource(msg)) if msg.contains("byte limit")));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn test_garbage_is_not_an_archive() {
        let scratch = TempDir::new().unwrap();
        let result = unpack(b"definitely not a zip", scratch.path(), 1024, &WalkOptions::new(1024));
        assert!(matches!(result, Err(AtlasError::InvalidSource(msg)) if msg.contains("Invalid ZIP")));
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(safe_relative_path("a/./b.txt"), Some(PathBuf::from("a/b.txt")));
        assert_eq!(safe_relative_path("a\\..\\..\\b"), None);
        assert_eq!(safe_relative_path("C:/Windows/system.ini"), None);
        assert_eq!(safe_relative_path("/abs"), None);
        assert_eq!(safe_relative_path(""), None);
    }
}
