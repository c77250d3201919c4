//! Repository loading
//!
//! Turns a [`RepoRef`] into a flat, path-sorted list of [`SourceFile`]s. GitHub
//! repositories are downloaded as ZIP archives, archives are unpacked into a
//! per-request scratch directory that is removed on every exit path, and local
//! directories are walked in place.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{AtlasConfig, GitHubConfig};
use crate::error::{AtlasError, Result};
use crate::filter::RuleSet;
use crate::utils::{normalize_user_input_path, with_timeout};

/// Safe ZIP extraction
pub mod archive;
/// GitHub URL parsing and archive download
pub mod github;
/// Directory walking
pub mod local;

pub use local::WalkOptions;

/// One file of the repository under analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    /// Decoded text; empty for binary files
    pub content: String,
    /// Size of the file on disk in bytes
    pub size: u64,
    /// Whether the raw bytes looked binary
    pub binary: bool,
}

impl SourceFile {
    /// Creates a text file entry
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
            binary: false,
        }
    }

    /// Creates an entry for a file that was listed but not read
    pub fn unread(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            size,
            binary: false,
        }
    }

    /// Creates an entry from raw bytes, sniffing whether they are binary
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        let binary = content_inspector::inspect(bytes).is_binary();
        let content = if binary {
            String::new()
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        };
        Self {
            path: path.into(),
            content,
            size: bytes.len() as u64,
            binary,
        }
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lower-case extension including the dot, or an empty string
    pub fn extension(&self) -> String {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => name[idx..].to_lowercase(),
            _ => String::new(),
        }
    }

    /// Number of directories above the file
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }

    /// Directory components above the file
    pub fn parent_dirs(&self) -> impl Iterator<Item = &str> {
        let mut parts: Vec<&str> = self.path.split('/').collect();
        parts.pop();
        parts.into_iter()
    }
}

/// What the caller asked to analyse
#[derive(Clone, PartialEq, Eq)]
pub enum RepoRef {
    /// A public GitHub repository
    GitHub {
        /// Repository owner or organisation
        owner: String,
        /// Repository name
        repo: String,
    },
    /// A ZIP archive on the local filesystem
    ZipFile(PathBuf),
    /// A local directory
    Directory(PathBuf),
    /// ZIP bytes uploaded by a client
    Upload {
        /// Original file name of the upload
        name: String,
        /// Archive payload
        bytes: Vec<u8>,
    },
}

impl fmt::Debug for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { name, bytes } => f
                .debug_struct("Upload")
                .field("name", name)
                .field("bytes", &bytes.len())
                .finish(),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub { owner, repo } => write!(f, "https://github.com/{}/{}", owner, repo),
            Self::ZipFile(path) | Self::Directory(path) => write!(f, "{}", path.display()),
            Self::Upload { name, .. } => write!(f, "upload:{}", name),
        }
    }
}

impl RepoRef {
    /// Classifies user input as a GitHub URL, a ZIP file or a directory
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AtlasError::Validation("Please provide a GitHub URL or a path".into()));
        }
        if trimmed.contains("github.com") {
            let (owner, repo) = github::parse_github_url(trimmed)?;
            return Ok(Self::GitHub { owner, repo });
        }

        let path = normalize_user_input_path(trimmed);
        if path.is_dir() {
            return Ok(Self::Directory(path));
        }
        if path.is_file() {
            let is_zip = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("zip"))
                .unwrap_or(false);
            if is_zip {
                return Ok(Self::ZipFile(path));
            }
            return Err(AtlasError::Validation(format!(
                "{} is not a ZIP archive",
                path.display()
            )));
        }
        Err(AtlasError::Validation(format!(
            "Unsupported input '{}': use a GitHub URL, a ZIP file or a directory",
            trimmed
        )))
    }

    /// Short human name, e.g. `owner/repo` or the archive stem
    pub fn display_name(&self) -> String {
        fn stem(path: &Path) -> String {
            path.file_stem()
                .or_else(|| path.file_name())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "local".to_string())
        }
        match self {
            Self::GitHub { owner, repo } => format!("{}/{}", owner, repo),
            Self::ZipFile(path) => stem(path),
            Self::Directory(path) => {
                let path = path.canonicalize().unwrap_or_else(|_| path.clone());
                path.file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "local".to_string())
            }
            Self::Upload { name, .. } => stem(Path::new(name)),
        }
    }
}

/// Files read for one request
#[derive(Debug, Clone)]
pub struct LoadedRepository {
    /// Display name of the repository
    pub name: String,
    /// Files sorted by path
    pub files: Vec<SourceFile>,
}

impl LoadedRepository {
    /// Sum of file sizes in bytes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Loads repositories from GitHub, archives and directories
pub struct RepositoryLoader {
    client: Client,
    github: GitHubConfig,
    scratch_root: PathBuf,
    max_bytes: u64,
    walk: WalkOptions,
    download_timeout: Duration,
}

impl RepositoryLoader {
    /// Creates a loader from the configuration
    pub fn new(config: &AtlasConfig) -> Result<Self> {
        let client = github::create_github_client(config.api_keys.github_token.as_deref())?;
        Ok(Self {
            client,
            github: config.github.clone(),
            scratch_root: config.paths.scratch_root(),
            max_bytes: config.processing.max_archive_bytes,
            walk: WalkOptions::new(config.processing.max_archive_bytes),
            download_timeout: config.timeouts.download(),
        })
    }

    /// Skips directories and oversized files that `rules` would reject whatever they contain
    pub fn with_rules(mut self, rules: &RuleSet) -> Self {
        self.walk.skip_dirs = rules.pruned_dirs();
        self.walk.skip_above = rules.size_cutoff();
        self
    }

    /// Loads every file of the repository
    ///
    /// A single attempt is made; failures surface as `Fetch`, `InvalidSource` or `Timeout` errors.
    pub async fn load(&self, repo: &RepoRef) -> Result<LoadedRepository> {
        let name = repo.display_name();
        let files = match repo {
            RepoRef::GitHub { owner, repo: repo_name } => {
                let bytes = with_timeout(
                    "repository download",
                    self.download_timeout,
                    github::download_archive(&self.client, &self.github, owner, repo_name, self.max_bytes),
                )
                .await?;
                self.unpack(bytes).await?
            }
            RepoRef::ZipFile(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    AtlasError::InvalidSource(format!("Cannot read archive {}: {}", path.display(), e))
                })?;
                self.unpack(bytes).await?
            }
            RepoRef::Upload { bytes, .. } => self.unpack(bytes.clone()).await?,
            RepoRef::Directory(path) => {
                let root = path.clone();
                let walk = self.walk.clone();
                tokio::task::spawn_blocking(move || local::read_tree(&root, &walk))
                    .await
                    .map_err(|e| AtlasError::Fetch(format!("Directory walk failed: {}", e)))??
            }
        };

        if files.is_empty() {
            return Err(AtlasError::InvalidSource(format!("No files found in {}", name)));
        }
        info!("Loaded {} files from {}", files.len(), name);
        Ok(LoadedRepository { name, files })
    }

    async fn unpack(&self, bytes: Vec<u8>) -> Result<Vec<SourceFile>> {
        let scratch_root = self.scratch_root.clone();
        let max_bytes = self.max_bytes;
        let walk = self.walk.clone();
        tokio::task::spawn_blocking(move || archive::unpack(&bytes, &scratch_root, max_bytes, &walk))
            .await
            .map_err(|e| AtlasError::Fetch(format!("Archive extraction failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_file_helpers() {
        let file = SourceFile::new("src/core/Main.PY", "print(1)");
        assert_eq!(file.file_name(), "Main.PY");
        assert_eq!(file.extension(), ".py");
        assert_eq!(file.depth(), 2);
        assert_eq!(file.parent_dirs().collect::<Vec<_>>(), vec!["src", "core"]);
        assert_eq!(file.size, 8);

        let dotfile = SourceFile::new(".gitignore", "target");
        assert_eq!(dotfile.extension(), "");
    }

    #[test]
    fn test_binary_detection() {
        let file = SourceFile::from_bytes("logo.png", &[0x89, b'P', b'N', b'G', 0, 0, 1, 2]);
        assert!(file.binary);
        assert!(file.content.is_empty());
        assert_eq!(file.size, 8);
    }

    #[test]
    fn test_parse_repo_refs() -> Result<()> {
        let github = RepoRef::parse("github.com/rust-lang/rust.git/")?;
        assert_eq!(
            github,
            RepoRef::GitHub { owner: "rust-lang".into(), repo: "rust".into() }
        );
        assert_eq!(github.display_name(), "rust-lang/rust");

        let dir = TempDir::new()?;
        assert!(matches!(RepoRef::parse(&dir.path().to_string_lossy())?, RepoRef::Directory(_)));

        let zip_path = dir.path().join("project.zip");
        std::fs::write(&zip_path, b"PK")?;
        let zip = RepoRef::parse(&format!(" {} ", zip_path.display()))?;
        assert_eq!(zip.display_name(), "project");

        assert!(matches!(RepoRef::parse("  "), Err(AtlasError::Validation(_))));
        assert!(matches!(
            RepoRef::parse("https://gitlab.com/owner/repo"),
            Err(AtlasError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_upload_debug_hides_bytes() {
        let upload = RepoRef::Upload { name: "app.zip".into(), bytes: vec![1, 2, 3] };
        assert_eq!(format!("{:?}", upload), "Upload { name: \"app.zip\", bytes: 3 }");
        assert_eq!(upload.to_string(), "upload:app.zip");
        assert_eq!(upload.display_name(), "app");
    }
}
