use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::SourceFile;
use crate::error::{AtlasError, Result};

// Version-control metadata is never part of the analysed tree.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

/// Returns the only child of `root` if it is a lone directory, else `root`
///
/// GitHub archives wrap everything in `repo-branch/`; the wrapper is not part
/// of the repository's own paths. Only the outermost level is stripped.
pub fn unwrap_single_dir(root: &Path) -> Result<PathBuf> {
    let mut children = fs::read_dir(root)?.collect::<std::io::Result<Vec<_>>>()?;
    if children.len() == 1 && children[0].file_type()?.is_dir() {
        return Ok(children.remove(0).path());
    }
    Ok(root.to_path_buf())
}

/// What a directory walk may skip
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOptions {
    /// Fails once more than this many bytes of content have been read
    pub max_bytes: u64,
    /// Directory names that are never descended into
    pub skip_dirs: Vec<String>,
    /// Files above this size are listed with their size but not read
    pub skip_above: Option<u64>,
}

impl WalkOptions {
    /// Reads everything up to `max_bytes`
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            skip_dirs: Vec::new(),
            skip_above: None,
        }
    }
}

fn is_skipped_dir(entry: &DirEntry, skip_dirs: &[String]) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| VCS_DIRS.contains(&name) || skip_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
}

/// Reads every regular file below `root`, sorted by relative path
///
/// Symbolic links are not followed. Directories named in `options.skip_dirs`
/// are pruned without being walked.
pub fn read_tree(root: &Path, options: &WalkOptions) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(AtlasError::InvalidSource(format!("{} is not a directory", root.display())));
    }

    let mut files = Vec::new();
    let mut total: u64 = 0;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e, &options.skip_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match relative_path(root, entry.path()) {
            Some(rel) => rel,
            None => continue,
        };
        if let Some(limit) = options.skip_above {
            let size = entry.metadata()?.len();
            if size > limit {
                debug!("Not reading {}: {} bytes", relative, size);
                files.push(SourceFile::unread(relative, size));
                continue;
            }
        }
        let bytes = fs::read(entry.path())?;
        total += bytes.len() as u64;
        if total > options.max_bytes {
            return Err(AtlasError::InvalidSource(format!(
                "Repository is larger than the {} byte limit",
                options.max_bytes
            )));
        }
        files.push(SourceFile::from_bytes(relative, &bytes));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Read {} files ({} bytes) from {}", files.len(), total, root.display());
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_read_tree_sorted_and_skips_vcs() -> Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "src/b.rs", "fn b() {}");
        write(dir.path(), "src/a.rs", "fn a() {}");
        write(dir.path(), "README.md", "# hi");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main");

        let files = read_tree(dir.path(), &WalkOptions::new(1_000_000))?;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/a.rs", "src/b.rs"]);
        Ok(())
    }

    #[test]
    fn test_read_tree_limit() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", &"x".repeat(600));
        write(dir.path(), "b.txt", &"y".repeat(600));

        assert!(matches!(
            read_tree(dir.path(), &WalkOptions::new(1000)),
            Err(AtlasError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_read_tree_prunes_skipped_dirs() -> Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "src/app.js", "run()");
        write(dir.path(), "node_modules/left-pad/index.js", &"x".repeat(5_000));
        write(dir.path(), "target/debug/build.log", &"y".repeat(5_000));

        let options = WalkOptions {
            max_bytes: 1_000,
            skip_dirs: vec!["node_modules".into(), "target".into()],
            skip_above: None,
        };
        let files = read_tree(dir.path(), &options)?;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.js"]);
        Ok(())
    }

    #[test]
    fn test_read_tree_lists_oversized_files_unread() -> Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "main.py", "print(1)");
        write(dir.path(), "dump.sql", &"z".repeat(2_000));

        let options = WalkOptions {
            max_bytes: 1_000,
            skip_dirs: Vec::new(),
            skip_above: Some(500),
        };
        let files = read_tree(dir.path(), &options)?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "dump.sql");
        assert_eq!(files[0].size, 2_000);
        assert!(files[0].content.is_empty());
        assert_eq!(files[1].content, "print(1)");
        Ok(())
    }

    #[test]
    fn test_unwrap_single_dir() -> Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "repo-main/src/lib.rs", "");
        assert_eq!(unwrap_single_dir(dir.path())?, dir.path().join("repo-main"));

        let flat = TempDir::new()?;
        write(flat.path(), "a.py", "");
        write(flat.path(), "b.py", "");
        assert_eq!(unwrap_single_dir(flat.path())?, flat.path().to_path_buf());
        Ok(())
    }
}
