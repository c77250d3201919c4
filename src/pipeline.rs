//! End-to-end analysis
//!
//! [`CodeAtlas`] runs one request at a time through
//! load, filter, assemble, model call, validate and save. It holds only
//! immutable configuration and shared clients, so a single value can serve
//! any number of concurrent requests.

use std::path::PathBuf;
use std::sync::Arc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analyzer::CodeAnalyzer;
use crate::assembler::{self, AssembledContext, BudgetExceeded, ProcessingStats};
use crate::config::AtlasConfig;
use crate::diagram::{self, DiagramLimits, DiagramSpec, GraphvizRenderer, LayoutOptions, RenderFormat};
use crate::error::{AtlasError, Result};
use crate::filter::RuleSet;
use crate::history::{DiagramRecord, HistoryStore};
use crate::llm::{ChatMessage, CompletionBackend, OpenAiBackend};
use crate::loader::{RepoRef, RepositoryLoader};
use crate::voice::VoiceNarrator;

/// Result of a full analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Display name of the repository
    pub repo_name: String,
    /// Model that produced the diagram
    pub model: String,
    /// The validated diagram
    pub diagram: DiagramSpec,
    /// Prose summary of the architecture
    pub summary: String,
    /// Counters from context assembly
    pub stats: ProcessingStats,
    /// Paths the model saw, in order
    pub included_paths: Vec<String>,
    /// Set when the context budget bound
    pub budget_warning: Option<String>,
    /// Where the diagram was saved, if saving succeeded
    pub saved: Option<DiagramRecord>,
}

/// Result of a summary request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Display name of the repository
    pub repo_name: String,
    /// Model that wrote the summary
    pub model: String,
    /// Prose summary
    pub summary: String,
    /// Counters from context assembly
    pub stats: ProcessingStats,
    /// Set when the context budget bound
    pub budget_warning: Option<String>,
}

/// Result of a narration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narration {
    /// What the voice says
    pub script: String,
    /// Saved audio file
    pub audio_path: PathBuf,
    /// Size of the audio in bytes
    pub audio_bytes: usize,
}

/// Context built for one repository
#[derive(Debug, Clone)]
pub struct PreparedContext {
    /// Display name of the repository
    pub repo_name: String,
    /// Assembled text and counters
    pub context: AssembledContext,
}

impl PreparedContext {
    /// The truncation warning, rendered for display
    pub fn warning_text(&self) -> Option<String> {
        self.context.budget_warning().as_ref().map(BudgetExceeded::to_string)
    }
}

/// Repository analysis pipeline
#[derive(Clone)]
pub struct CodeAtlas {
    config: AtlasConfig,
    backend: Arc<dyn CompletionBackend>,
    loader: Arc<RepositoryLoader>,
    rules: Arc<RuleSet>,
    analyzer: CodeAnalyzer,
    history: HistoryStore,
}

impl CodeAtlas {
    /// Creates a pipeline talking to the hosted models named in `config`
    pub fn new(config: AtlasConfig) -> Result<Self> {
        let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(&config));
        Self::with_backend(config, backend)
    }

    /// Creates a pipeline with a custom model backend
    pub fn with_backend(config: AtlasConfig, backend: Arc<dyn CompletionBackend>) -> Result<Self> {
        let rules = Arc::new(RuleSet::from_config(&config.processing)?);
        let loader = Arc::new(RepositoryLoader::new(&config)?.with_rules(&rules));
        let analyzer = CodeAnalyzer::new(backend.clone(), &config);
        let history = HistoryStore::from_config(&config);
        Ok(Self {
            config,
            backend,
            loader,
            rules,
            analyzer,
            history,
        })
    }

    /// Returns a pipeline using a per-request API key and model
    ///
    /// The shared backend is kept when it is not the hosted one, which keeps
    /// test doubles in place.
    pub fn scoped(&self, api_key: Option<&str>, model: Option<&str>) -> Result<Self> {
        let has_override = api_key.map_or(false, |k| !k.trim().is_empty())
            || model.map_or(false, |m| !m.trim().is_empty());
        if !has_override {
            return Ok(self.clone());
        }
        let config = self.config.scoped(api_key, model);
        let backend: Arc<dyn CompletionBackend> = if api_key.map_or(false, |k| !k.trim().is_empty()) {
            Arc::new(OpenAiBackend::new(&config))
        } else {
            self.backend.clone()
        };
        Ok(Self {
            analyzer: CodeAnalyzer::new(backend.clone(), &config),
            loader: self.loader.clone(),
            rules: self.rules.clone(),
            history: self.history.clone(),
            backend,
            config,
        })
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Saved diagram history
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Loads, filters and assembles the context for a repository
    pub async fn prepare_context(&self, repo: &RepoRef) -> Result<PreparedContext> {
        let loaded = self.loader.load(repo).await?;
        let selected = self.rules.filter(&loaded.files);
        info!(
            "{}: {} of {} files passed the filter",
            loaded.name,
            selected.len(),
            loaded.files.len()
        );
        if selected.is_empty() {
            return Err(AtlasError::Validation(format!(
                "No relevant source files found in {}",
                loaded.name
            )));
        }

        let context = assembler::assemble(&selected, self.config.processing.context_budget);
        if context.is_empty() {
            return Err(AtlasError::Validation(format!(
                "No file in {} fits within the context budget",
                loaded.name
            )));
        }
        Ok(PreparedContext {
            repo_name: loaded.name,
            context,
        })
    }

    /// Generates, validates and saves an architecture diagram, then summarizes the same context
    pub async fn analyze(&self, repo: &RepoRef) -> Result<AnalysisReport> {
        let prepared = self.prepare_context(repo).await?;
        let diagram = self.analyzer.generate_diagram(&prepared.context.text).await?;
        let summary = self.analyzer.generate_summary(&prepared.context.text).await?;

        let saved = match self
            .history
            .save(
                &repo.to_string(),
                &prepared.repo_name,
                self.analyzer.model(),
                &diagram,
                &prepared.context,
            )
            .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Diagram for {} was not saved: {}", prepared.repo_name, e);
                None
            }
        };

        Ok(AnalysisReport {
            budget_warning: prepared.warning_text(),
            model: self.analyzer.model().to_string(),
            stats: prepared.context.stats.clone(),
            included_paths: prepared.context.included_paths,
            repo_name: prepared.repo_name,
            diagram,
            summary,
            saved,
        })
    }

    /// Writes a prose summary of a repository
    pub async fn summarize(&self, repo: &RepoRef) -> Result<SummaryReport> {
        let prepared = self.prepare_context(repo).await?;
        let summary = self.analyzer.generate_summary(&prepared.context.text).await?;
        Ok(SummaryReport {
            budget_warning: prepared.warning_text(),
            model: self.analyzer.model().to_string(),
            stats: prepared.context.stats,
            repo_name: prepared.repo_name,
            summary,
        })
    }

    /// Answers a question about a repository
    pub async fn chat(&self, repo: &RepoRef, question: &str, history: &[ChatMessage]) -> Result<String> {
        if question.trim().is_empty() {
            return Err(AtlasError::Validation("Please enter a question".into()));
        }
        let prepared = self.prepare_context(repo).await?;
        self.analyzer.chat(question, &prepared.context.text, history).await
    }

    /// Answers a question against an already assembled context
    pub async fn chat_with_context(&self, context: &str, question: &str, history: &[ChatMessage]) -> Result<String> {
        if question.trim().is_empty() {
            return Err(AtlasError::Validation("Please enter a question".into()));
        }
        self.analyzer.chat(question, context, history).await
    }

    /// Lists saved diagrams, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DiagramRecord>> {
        self.history.list_recent(limit).await
    }

    /// Validates diagram text and renders it with Graphviz
    pub async fn render(&self, dot: &str, format: RenderFormat, layout: Option<LayoutOptions>) -> Result<Vec<u8>> {
        let spec = diagram::validate(&diagram::extract_dot(dot), &self.limits())?;
        let mut renderer = GraphvizRenderer::from_config(&self.config);
        if let Some(layout) = layout {
            renderer = renderer.with_layout(layout);
        }
        renderer.render(&spec, format).await
    }

    /// Reads text aloud, typically a summary, and saves the audio
    pub async fn speak(&self, text: &str, voice_id: Option<&str>) -> Result<Narration> {
        let narrator = self.narrator()?;
        self.voice(&narrator, text.trim().to_string(), voice_id).await
    }

    /// Describes a diagram aloud and saves the audio
    pub async fn narrate(&self, dot: &str, voice_id: Option<&str>) -> Result<Narration> {
        let narrator = self.narrator()?;
        let spec = diagram::validate(&diagram::extract_dot(dot), &self.limits())?;
        let script = self.analyzer.narration_script(&spec.raw_text).await?;
        self.voice(&narrator, script, voice_id).await
    }

    fn narrator(&self) -> Result<VoiceNarrator> {
        let narrator = VoiceNarrator::new(&self.config);
        if !narrator.available() {
            return Err(AtlasError::Synthesis("ElevenLabs API key not configured".into()));
        }
        Ok(narrator)
    }

    async fn voice(&self, narrator: &VoiceNarrator, script: String, voice_id: Option<&str>) -> Result<Narration> {
        let audio = narrator.synthesize(&script, voice_id).await?;
        let audio_path = narrator.save(&audio, &self.config.paths.audios_dir()).await?;
        Ok(Narration {
            script,
            audio_bytes: audio.len(),
            audio_path,
        })
    }

    fn limits(&self) -> DiagramLimits {
        DiagramLimits {
            max_nodes: self.config.processing.max_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixed(&'static str);

    #[async_trait]
    impl CompletionBackend for Fixed {
        async fn complete(&self, _model: &str, _system: &str, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn atlas(data: &TempDir, reply: &'static str) -> CodeAtlas {
        let config = AtlasConfig::new(data.path().to_path_buf());
        CodeAtlas::with_backend(config, Arc::new(Fixed(reply))).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_relevant_is_a_validation_error() {
        let data = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::create_dir(repo.path().join("node_modules")).unwrap();
        std::fs::write(repo.path().join("node_modules/x.js"), "x").unwrap();
        std::fs::write(repo.path().join("logo.bin"), [0u8, 1, 2, 0]).unwrap();

        let result = atlas(&data, "digraph { a; }")
            .prepare_context(&RepoRef::Directory(repo.path().to_path_buf()))
            .await;
        assert!(matches!(result, Err(AtlasError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let data = TempDir::new().unwrap();
        let result = atlas(&data, "ok").chat_with_context("ctx", "  ", &[]).await;
        assert!(matches!(result, Err(AtlasError::Validation(_))));
    }

    #[tokio::test]
    async fn test_render_validates_before_spawning() {
        let data = TempDir::new().unwrap();
        let result = atlas(&data, "ok")
            .render("digraph { a -> b; }", RenderFormat::Svg, None)
            .await;
        assert!(matches!(result, Err(AtlasError::InvalidDiagram(_))));
    }

    #[tokio::test]
    async fn test_narrate_without_key() {
        let data = TempDir::new().unwrap();
        let mut config = AtlasConfig::new(data.path().to_path_buf());
        config.api_keys.elevenlabs = None;
        let atlas = CodeAtlas::with_backend(config, Arc::new(Fixed("script"))).unwrap();
        let result = atlas.narrate("digraph { a; }", None).await;
        assert!(matches!(result, Err(AtlasError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_speak_sends_text_as_is() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/text-to-speech/JBFqnCBsd6RMkjVDRZzb")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({ "text": "A tidy shop." })))
            .with_status(200)
            .with_body([1u8, 2, 3])
            .create_async()
            .await;

        let data = TempDir::new().unwrap();
        let mut config = AtlasConfig::new(data.path().to_path_buf());
        config.voice.base_url = server.url();
        config.api_keys.elevenlabs = Some("el-key".into());
        let atlas = CodeAtlas::with_backend(config, Arc::new(Fixed("unused"))).unwrap();

        let narration = atlas.speak("  A tidy shop.\n", None).await.unwrap();
        assert_eq!(narration.script, "A tidy shop.");
        assert_eq!(narration.audio_bytes, 3);
        assert!(narration.audio_path.starts_with(data.path().join("audios")));
        mock.assert_async().await;
    }

    #[test]
    fn test_scoped_without_overrides_keeps_model() {
        let data = TempDir::new().unwrap();
        let atlas = atlas(&data, "ok");
        let scoped = atlas.scoped(None, Some("gemini-2.5-flash")).unwrap();
        assert_eq!(scoped.config().models.default_model, "gemini-2.5-flash");
        assert_eq!(atlas.config().models.default_model, "gemini-2.5-pro");
    }
}
