use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use log::{debug, info};

use super::{ChatMessage, ChatRole, CompletionBackend};
use crate::config::{ApiKeys, AtlasConfig, ModelConfig};
use crate::error::{AtlasError, Result};

/// Chat completions over the OpenAI API or Gemini's OpenAI-compatible endpoint
///
/// The endpoint and key are picked per call from the model id.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    keys: ApiKeys,
    models: ModelConfig,
}

impl OpenAiBackend {
    /// Creates a backend using the configured keys and endpoints
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            keys: config.api_keys.clone(),
            models: config.models.clone(),
        }
    }

    fn client_for(&self, model: &str) -> Result<Client<OpenAIConfig>> {
        let key = self
            .keys
            .key_for_model(model)
            .ok_or_else(|| AtlasError::Config(format!("No API key configured for model {}", model)))?;
        let config = OpenAIConfig::new()
            .with_api_key(key)
            .with_api_base(self.models.base_url_for(model).trim_end_matches('/'));
        Ok(Client::with_config(config))
    }
}

// Reasoning models only accept the default temperature.
fn supports_temperature(model: &str) -> bool {
    !(model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3"))
}

fn build_messages(system: &str, messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut out: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(messages.len() + 1);
    out.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()?
            .into(),
    );
    for message in messages {
        let built: ChatCompletionRequestMessage = match message.role {
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.as_str())
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()?
                .into(),
        };
        out.push(built);
    }
    Ok(out)
}

fn describe_error(error: OpenAIError) -> AtlasError {
    let text = error.to_string();
    if text.contains("429") || text.contains("RESOURCE_EXHAUSTED") || text.contains("rate limit") {
        AtlasError::Model("Rate limited. Please wait and try again.".into())
    } else if text.contains("401") || text.contains("403") || text.contains("API key") || text.contains("api key") {
        AtlasError::Model(format!("Invalid API key: {}", text))
    } else {
        error.into()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, model: &str, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let client = self.client_for(model)?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(model)
            .messages(build_messages(system, messages)?)
            .max_completion_tokens(self.models.max_tokens);
        if supports_temperature(model) {
            request.temperature(self.models.temperature);
        }
        let request = request.build()?;

        info!("Requesting completion from {}", model);
        let response = client.chat().create(request).await.map_err(describe_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AtlasError::Model("Empty response from model".into()))?;
        debug!("Received {} chars from {}", content.len(), model);
        Ok(content)
    }
}
