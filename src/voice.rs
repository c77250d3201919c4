use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::Local;
use log::{info, warn};
use reqwest::{header, Client};
use serde::Serialize;

use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::utils::with_timeout;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Text-to-speech through the ElevenLabs API
#[derive(Debug, Clone)]
pub struct VoiceNarrator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    voice_id: String,
    model_id: String,
    output_format: String,
    timeout: Duration,
}

impl VoiceNarrator {
    /// Creates a narrator from configuration
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.voice.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_keys.elevenlabs.clone().filter(|k| !k.trim().is_empty()),
            voice_id: config.voice.voice_id.clone(),
            model_id: config.voice.model_id.clone(),
            output_format: config.voice.output_format.clone(),
            timeout: config.timeouts.speech(),
        }
    }

    /// Checks whether an API key is configured
    pub fn available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Converts text to audio bytes, using the configured voice unless one is given
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AtlasError::Synthesis("ElevenLabs API key not configured".into()))?;
        if text.trim().is_empty() {
            return Err(AtlasError::Synthesis("No text provided".into()));
        }
        let voice_id = voice_id.filter(|v| !v.trim().is_empty()).unwrap_or(&self.voice_id);

        with_timeout("speech synthesis", self.timeout, self.request(api_key, voice_id, text)).await
    }

    async fn request(&self, api_key: &str, voice_id: &str, text: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", api_key)
            .header(header::ACCEPT, "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(|e| AtlasError::Synthesis(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("ElevenLabs returned {}: {}", status, body);
            return Err(AtlasError::Synthesis(format!("ElevenLabs returned HTTP {}: {}", status, body.trim())));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AtlasError::Synthesis(format!("Failed to read audio: {}", e)))?;
        if audio.is_empty() {
            return Err(AtlasError::Synthesis("ElevenLabs returned no audio".into()));
        }
        info!("Synthesized {} bytes of audio with voice {}", audio.len(), voice_id);
        Ok(audio.to_vec())
    }

    /// Writes audio to `summary_<timestamp>.mp3` in `dir`
    pub async fn save(&self, audio: &[u8], dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("summary_{}.mp3", stamp));
        tokio::fs::write(&path, audio).await?;
        info!("Saved audio: {}", path.display());
        Ok(path)
    }
}
