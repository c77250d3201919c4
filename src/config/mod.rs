mod env_manager;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::diagram::LayoutOptions;
use crate::error::{AtlasError, Result};

pub use env_manager::{get_env_value, ApiKeys};

/// Main configuration struct for the application
///
/// One value is built per process (or per request when keys are overridden) and
/// passed explicitly into every pipeline invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// File selection and budget settings
    pub processing: ProcessingConfig,
    /// Model selection and generation parameters
    pub models: ModelConfig,
    /// Where diagrams, audio and scratch data live
    pub paths: PathsConfig,
    /// HTTP service settings
    pub server: ServerConfig,
    /// Graphviz renderer settings
    pub render: RenderConfig,
    /// Text-to-speech settings
    pub voice: VoiceConfig,
    /// Limits for external calls
    pub timeouts: TimeoutConfig,
    /// Repository host settings
    pub github: GitHubConfig,
    /// API keys for the hosted services
    pub api_keys: ApiKeys,
}

/// Settings that drive the filter and the context assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// File extensions accepted by default
    pub allowed_extensions: Vec<String>,
    /// File names accepted regardless of extension
    pub allowed_files: Vec<String>,
    /// Directory names whose whole subtree is dropped
    pub blocked_dirs: Vec<String>,
    /// Exact file names that are always dropped
    pub blocked_files: Vec<String>,
    /// Lower-case fragments that mark a file name as a test file
    pub test_file_patterns: Vec<String>,
    /// Additional glob patterns to drop
    pub excluded_globs: Vec<String>,
    /// Files larger than this many bytes are dropped
    pub max_file_size: u64,
    /// Repositories larger than this many bytes are filtered aggressively
    pub large_repo_threshold: u64,
    /// Path fragments skipped in aggressive mode
    pub aggressive_skip_patterns: Vec<String>,
    /// The only extensions kept in aggressive mode
    pub core_extensions: Vec<String>,
    /// Optional cap on the summed size of files passing the filter
    pub max_included_bytes: Option<u64>,
    /// Maximum length in bytes of the text handed to the model
    pub context_budget: usize,
    /// Upper bound on the bytes a loader may read or unpack
    pub max_archive_bytes: u64,
    /// Maximum number of declared nodes in a diagram
    pub max_nodes: usize,
}

/// Model selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model id used when a request does not name one
    pub default_model: String,
    /// Model id used to write narration scripts
    pub narration_model: String,
    /// Base URL of the OpenAI API
    pub openai_base_url: String,
    /// Base URL of Gemini's OpenAI-compatible endpoint
    pub gemini_base_url: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per completion
    pub max_tokens: u32,
    /// Number of earlier chat messages replayed to the model
    pub chat_history_messages: usize,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of all persisted data
    pub data_dir: PathBuf,
    /// Parent directory for per-request scratch areas; the system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
}

/// HTTP service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Whether HTTP clients may name directories and archives on the server's disk
    pub allow_local_paths: bool,
}

/// Graphviz renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Path or name of the `dot` executable
    pub dot_binary: PathBuf,
    /// Layout applied before rendering
    pub layout: LayoutOptions,
}

/// ElevenLabs voice settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// API base URL
    pub base_url: String,
    /// Default voice
    pub voice_id: String,
    /// Synthesis model
    pub model_id: String,
    /// Audio encoding requested from the API
    pub output_format: String,
}

/// Limits for external calls, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Repository download
    pub download_secs: u64,
    /// One model completion
    pub model_secs: u64,
    /// One Graphviz invocation
    pub render_secs: u64,
    /// One text-to-speech call
    pub speech_secs: u64,
}

/// Repository host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL archives are downloaded from
    pub base_url: String,
    /// Archive refs tried in order; only a 404 moves on to the next one
    pub archive_refs: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: strings(&[
                ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h",
                ".cs", ".go", ".rs", ".php", ".rb", ".sql", ".yaml", ".yml",
                ".json", ".md", ".txt", ".sh", ".bash", ".zsh", ".toml",
            ]),
            allowed_files: strings(&["Dockerfile", "Makefile", "README", "LICENSE", ".gitignore"]),
            blocked_dirs: strings(&[
                "node_modules", "__pycache__", ".git", "dist", "build", "venv",
                ".venv", "env", ".env", ".idea", ".vscode", "coverage", ".next",
                "target", "bin", "obj", ".gradle", ".m2", "vendor", "Pods",
                "test", "tests", "__tests__", "spec", "specs", "testing",
                "test_data", "testdata", "fixtures", "mocks", "mock",
                "e2e", "integration", "unit", "cypress", "playwright",
            ]),
            blocked_files: strings(&[
                "package-lock.json", "yarn.lock", "pnpm-lock.yaml", "composer.lock",
                "Gemfile.lock", "Cargo.lock", "poetry.lock", ".DS_Store",
                ".eslintrc", ".prettierrc", "tsconfig.json", "jest.config.js",
                "babel.config.js", ".babelrc", "webpack.config.js", "vite.config.js",
                "setup.cfg", "tox.ini", ".coveragerc",
            ]),
            test_file_patterns: strings(&[
                "test_", "_test.", ".test.", ".spec.", "_spec.",
                "conftest.py", "pytest.ini",
            ]),
            excluded_globs: Vec::new(),
            max_file_size: 50 * 1024,
            large_repo_threshold: 10_000_000,
            aggressive_skip_patterns: strings(&[
                "example", "demo", "sample", "doc/", "docs/",
                "tutorial", "benchmark", "contrib/", "scripts/",
            ]),
            core_extensions: strings(&[".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".go", ".rs"]),
            max_included_bytes: None,
            context_budget: 3_500_000,
            max_archive_bytes: 250_000_000,
            max_nodes: 150,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: "gemini-2.5-pro".to_string(),
            narration_model: "gemini-2.0-flash".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            chat_history_messages: 6,
        }
    }
}

impl ModelConfig {
    /// Known models as (display name, model id), newest first
    pub const KNOWN_MODELS: &'static [(&'static str, &'static str)] = &[
        ("Gemini 2.5 Pro", "gemini-2.5-pro"),
        ("Gemini 2.5 Flash", "gemini-2.5-flash"),
        ("Gemini 2.5 Flash Lite", "gemini-2.5-flash-lite"),
        ("Gemini 2.0 Flash", "gemini-2.0-flash"),
        ("GPT-5.1", "gpt-5.1"),
        ("GPT-5 Mini", "gpt-5-mini"),
        ("GPT-5 Nano", "gpt-5-nano"),
    ];

    /// Checks if a model id belongs to OpenAI rather than Gemini
    pub fn is_openai_model(model: &str) -> bool {
        model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3")
    }

    /// Resolves a display name or id to a model id, falling back to the default model
    pub fn resolve(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            return self.default_model.clone();
        }
        Self::KNOWN_MODELS
            .iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
            .map(|(_, id)| id.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    /// Returns the endpoint serving the given model
    pub fn base_url_for(&self, model: &str) -> &str {
        if Self::is_openai_model(model) {
            &self.openai_base_url
        } else {
            &self.gemini_base_url
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            scratch_dir: None,
        }
    }
}

impl PathsConfig {
    /// Directory holding saved diagrams and their metadata
    pub fn diagrams_dir(&self) -> PathBuf {
        self.data_dir.join("diagrams")
    }

    /// Directory holding generated narration audio
    pub fn audios_dir(&self) -> PathBuf {
        self.data_dir.join("audios")
    }

    /// Parent of per-request scratch directories
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            allow_local_paths: false,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dot_binary: PathBuf::from("dot"),
            layout: LayoutOptions::default(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".to_string(),
            voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            output_format: "mp3_44100_128".to_string(),
        }
    }
}

impl VoiceConfig {
    /// Voices offered to users as (display name, voice id)
    pub const VOICES: &'static [(&'static str, &'static str)] = &[
        ("George (Male)", "JBFqnCBsd6RMkjVDRZzb"),
        ("Rachel (Female)", "21m00Tcm4TlvDq8ikWAM"),
        ("Adam (Male)", "pNInz6obpgDQGcFmaJgB"),
        ("Bella (Female)", "EXAVITQu4vr4xnSDxMaL"),
        ("Antoni (Male)", "ErXwobaYiN019PkySvjV"),
    ];
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            download_secs: 60,
            model_secs: 180,
            render_secs: 30,
            speech_secs: 60,
        }
    }
}

impl TimeoutConfig {
    /// Repository download limit
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    /// Model completion limit
    pub fn model(&self) -> Duration {
        Duration::from_secs(self.model_secs)
    }

    /// Renderer limit
    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_secs)
    }

    /// Text-to-speech limit
    pub fn speech(&self) -> Duration {
        Duration::from_secs(self.speech_secs)
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://github.com".to_string(),
            archive_refs: strings(&["HEAD", "main", "master"]),
        }
    }
}

impl AtlasConfig {
    /// Creates a configuration rooted at the given data directory
    pub fn new(data_dir: PathBuf) -> Self {
        let mut config = Self::default();
        config.paths.data_dir = data_dir;
        config.api_keys = ApiKeys::from_env();
        config
    }

    /// Loads configuration from the default config file location
    ///
    /// If the config file doesn't exist, the defaults are used. Environment
    /// variables override API keys and the data directory either way.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AtlasError::Config("Could not find config directory".into()))?;
        let config_path = config_dir.join("codeatlas").join("config.toml");

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Reads a TOML configuration file without applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AtlasError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| AtlasError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))
    }

    /// Applies environment overrides on top of the current values
    pub fn apply_env(&mut self) {
        self.api_keys.merge_env();
        if let Some(dir) = get_env_value("CODEATLAS_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
    }

    /// Validates limits and makes sure the data directories exist
    pub async fn validate(&self) -> Result<()> {
        if self.processing.context_budget == 0 {
            return Err(AtlasError::Config("context_budget must be greater than zero".into()));
        }
        if self.processing.max_nodes == 0 {
            return Err(AtlasError::Config("max_nodes must be greater than zero".into()));
        }
        if self.github.archive_refs.is_empty() {
            return Err(AtlasError::Config("at least one archive ref is required".into()));
        }
        self.ensure_directories_exist().await
    }

    /// Ensures all directories the application writes to exist
    pub async fn ensure_directories_exist(&self) -> Result<()> {
        for dir in [self.paths.diagrams_dir(), self.paths.audios_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Returns a copy with the given per-request API key and model applied
    ///
    /// The key is stored for whichever provider serves the model.
    pub fn scoped(&self, api_key: Option<&str>, model: Option<&str>) -> Self {
        let mut config = self.clone();
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            config.models.default_model = config.models.resolve(model);
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let key = Some(key.trim().to_string());
            if ModelConfig::is_openai_model(&config.models.default_model) {
                config.api_keys.openai = key;
            } else {
                config.api_keys.gemini = key;
            }
        }
        config
    }

    /// Returns the API key for the currently selected model
    pub fn model_api_key(&self) -> Result<&str> {
        let model = &self.models.default_model;
        self.api_keys
            .key_for_model(model)
            .ok_or_else(|| AtlasError::Config(format!("No API key configured for model {}", model)))
    }
}
