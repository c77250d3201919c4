use serde::{Deserialize, Serialize};
use super::ModelConfig;

/// Stores API keys for the hosted services
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    /// Gemini key, used for every non-OpenAI model
    pub gemini: Option<String>,
    /// OpenAI key
    pub openai: Option<String>,
    /// ElevenLabs key for narration
    pub elevenlabs: Option<String>,
    /// GitHub token for authenticated archive downloads
    pub github_token: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(key: &Option<String>) -> &'static str {
            if key.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("ApiKeys")
            .field("gemini", &mask(&self.gemini))
            .field("openai", &mask(&self.openai))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .field("github_token", &mask(&self.github_token))
            .finish()
    }
}

impl ApiKeys {
    /// Reads every key from the environment
    pub fn from_env() -> Self {
        let mut keys = Self::default();
        keys.merge_env();
        keys
    }

    /// Overwrites keys that are set in the environment, keeping the rest
    pub fn merge_env(&mut self) {
        let pairs = [
            ("GEMINI_API_KEY", &mut self.gemini),
            ("OPENAI_API_KEY", &mut self.openai),
            ("ELEVENLABS_API_KEY", &mut self.elevenlabs),
            ("GITHUB_TOKEN", &mut self.github_token),
        ];
        for (var, slot) in pairs {
            if let Some(value) = get_env_value(var) {
                *slot = Some(value);
            }
        }
    }

    /// Returns the key for the provider serving `model`
    pub fn key_for_model(&self, model: &str) -> Option<&str> {
        let key = if ModelConfig::is_openai_model(model) {
            self.openai.as_deref()
        } else {
            self.gemini.as_deref()
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

/// Reads an environment variable, treating empty values as unset
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
