//! Saved diagrams
//!
//! Every successful analysis leaves `raw_<repo>_<timestamp>_<id>.dot` in the
//! diagrams directory, next to a `.json` file with the same stem holding its
//! [`DiagramRecord`].

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembler::AssembledContext;
use crate::config::AtlasConfig;
use crate::diagram::DiagramSpec;
use crate::error::{AtlasError, Result};
use crate::utils::sanitize_file_component;

/// Metadata stored beside a saved diagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramRecord {
    /// File stem shared by the `.dot` and `.json` files
    pub id: String,
    /// What was analysed, as given by the caller
    pub repo_ref: String,
    /// Short repository name
    pub repo_name: String,
    /// Model that produced the diagram
    pub model_name: String,
    /// Files that made it into the context
    pub files_processed: usize,
    /// Length of the context in bytes
    pub total_characters: usize,
    /// Whether the context budget bound
    pub truncated: bool,
    /// Declared nodes
    pub node_count: usize,
    /// Distinct edges
    pub edge_count: usize,
    /// When the diagram was saved
    pub created_at: DateTime<Utc>,
}

/// Directory-backed diagram history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !id.contains("..");
    if valid {
        Ok(())
    } else {
        Err(AtlasError::Validation(format!("Invalid diagram id '{}'", id)))
    }
}

impl HistoryStore {
    /// Creates a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store in the configured diagrams directory
    pub fn from_config(config: &AtlasConfig) -> Self {
        Self::new(config.paths.diagrams_dir())
    }

    /// Directory the store writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves a validated diagram with its metadata
    ///
    /// # Arguments
    /// * `repo_ref` - What was analysed, as the caller wrote it
    /// * `repo_name` - Short name used in the file name
    /// * `model_name` - Model that produced the diagram
    /// * `spec` - The validated diagram
    /// * `context` - The context the diagram was generated from
    ///
    /// # Returns
    /// The record written next to the diagram
    pub async fn save(
        &self,
        repo_ref: &str,
        repo_name: &str,
        model_name: &str,
        spec: &DiagramSpec,
        context: &AssembledContext,
    ) -> Result<DiagramRecord> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AtlasError::History(format!("Cannot create {}: {}", self.dir.display(), e)))?;

        let created_at = Utc::now();
        let safe_repo: String = sanitize_file_component(repo_name).chars().take(50).collect();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "raw_{}_{}_{}",
            safe_repo,
            created_at.format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );

        let record = DiagramRecord {
            id: id.clone(),
            repo_ref: repo_ref.to_string(),
            repo_name: repo_name.to_string(),
            model_name: model_name.to_string(),
            files_processed: context.stats.files_processed,
            total_characters: context.stats.total_characters,
            truncated: context.truncated,
            node_count: spec.node_count(),
            edge_count: spec.edge_count(),
            created_at,
        };

        let dot_path = self.dir.join(format!("{}.dot", id));
        let meta_path = self.dir.join(format!("{}.json", id));
        tokio::fs::write(&dot_path, &spec.raw_text)
            .await
            .map_err(|e| AtlasError::History(format!("Cannot write {}: {}", dot_path.display(), e)))?;
        tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&record)?)
            .await
            .map_err(|e| AtlasError::History(format!("Cannot write {}: {}", meta_path.display(), e)))?;

        info!("Saved diagram: {}", dot_path.display());
        Ok(record)
    }

    /// Lists saved diagrams, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DiagramRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AtlasError::History(format!("Cannot read {}: {}", self.dir.display(), e))),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(AtlasError::from)
                .and_then(|bytes| serde_json::from_slice::<DiagramRecord>(&bytes).map_err(AtlasError::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable metadata {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    /// Reads the metadata of a saved diagram
    pub async fn record(&self, id: &str) -> Result<DiagramRecord> {
        check_id(id)?;
        let path = self.dir.join(format!("{}.json", id));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| AtlasError::History(format!("No saved diagram '{}'", id)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reads the DOT source of a saved diagram
    pub async fn load(&self, id: &str) -> Result<String> {
        check_id(id)?;
        let path = self.dir.join(format!("{}.dot", id));
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| AtlasError::History(format!("No saved diagram '{}'", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::diagram::{validate, DiagramLimits};
    use crate::loader::SourceFile;
    use tempfile::TempDir;

    fn fixtures() -> (DiagramSpec, AssembledContext) {
        let spec = validate("digraph { a; b; a -> b }", &DiagramLimits::default()).unwrap();
        let context = assemble(&[SourceFile::new("main.py", "print(1)")], 1_000);
        (spec, context)
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let store = HistoryStore::new(dir.path().join("diagrams"));
        let (spec, context) = fixtures();

        let record = store
            .save("https://github.com/owner/repo", "owner/repo", "gemini-2.5-pro", &spec, &context)
            .await?;
        assert!(record.id.starts_with("raw_owner_repo_"));
        assert_eq!(record.node_count, 2);
        assert_eq!(record.edge_count, 1);
        assert_eq!(record.files_processed, 1);

        assert_eq!(store.load(&record.id).await?, spec.raw_text);
        assert_eq!(store.record(&record.id).await?, record);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() -> Result<()> {
        let dir = TempDir::new()?;
        let store = HistoryStore::new(dir.path());
        let (spec, context) = fixtures();

        let mut ids = Vec::new();
        for name in ["one", "two", "three"] {
            ids.push(store.save(name, name, "m", &spec, &context).await?.id);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        std::fs::write(dir.path().join("broken.json"), "{not json")?;

        let recent = store.list_recent(2).await?;
        let names: Vec<_> = recent.iter().map(|r| r.repo_name.as_str()).collect();
        assert_eq!(names, vec!["three", "two"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = HistoryStore::new(dir.path().join("nope"));
        assert!(store.list_recent(10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_path_ids() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(matches!(store.load("../secret").await, Err(AtlasError::Validation(_))));
        assert!(matches!(store.load("raw_missing").await, Err(AtlasError::History(_))));
    }
}
