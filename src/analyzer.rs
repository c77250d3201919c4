use std::sync::Arc;
use std::time::Duration;
use log::info;

use crate::config::AtlasConfig;
use crate::diagram::{self, DiagramLimits, DiagramSpec};
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionBackend};
use crate::prompts;
use crate::utils::with_timeout;

/// Turns an assembled context into diagrams, summaries and answers
///
/// Every model call runs under the configured model timeout. The diagram
/// reply is extracted and validated before it is returned.
#[derive(Clone)]
pub struct CodeAnalyzer {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    narration_model: String,
    limits: DiagramLimits,
    history_limit: usize,
    timeout: Duration,
}

impl CodeAnalyzer {
    /// Creates an analyzer using the model selected in `config`
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AtlasConfig) -> Self {
        Self {
            backend,
            model: config.models.default_model.clone(),
            narration_model: config.models.narration_model.clone(),
            limits: DiagramLimits {
                max_nodes: config.processing.max_nodes,
            },
            history_limit: config.models.chat_history_messages,
            timeout: config.timeouts.model(),
        }
    }

    /// Model id used for diagrams, summaries and chat
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, operation: &str, model: &str, system: &str, messages: Vec<ChatMessage>) -> Result<String> {
        info!("{} with {}", operation, model);
        with_timeout(operation, self.timeout, self.backend.complete(model, system, &messages)).await
    }

    /// Asks for an architecture diagram and validates the reply
    pub async fn generate_diagram(&self, context: &str) -> Result<DiagramSpec> {
        let prompt = prompts::fill(prompts::ARCHITECT_USER, &[context]);
        let reply = self
            .ask("diagram generation", &self.model, prompts::ARCHITECT_SYSTEM, vec![ChatMessage::user(prompt)])
            .await?;
        let dot = diagram::extract_dot(&reply);
        Ok(diagram::validate(&dot, &self.limits)?)
    }

    /// Asks for a prose summary of the codebase
    pub async fn generate_summary(&self, context: &str) -> Result<String> {
        let prompt = prompts::fill(prompts::SUMMARY_USER, &[context]);
        self.ask("summary generation", &self.model, prompts::SUMMARY_SYSTEM, vec![ChatMessage::user(prompt)])
            .await
    }

    /// Answers a question about the codebase, replaying the tail of the conversation
    pub async fn chat(&self, question: &str, context: &str, history: &[ChatMessage]) -> Result<String> {
        let skip = history.len().saturating_sub(self.history_limit);
        let mut messages: Vec<ChatMessage> = history[skip..]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .cloned()
            .collect();
        messages.push(ChatMessage::user(prompts::fill(prompts::CHAT_USER, &[context, question])));
        self.ask("chat", &self.model, prompts::CHAT_SYSTEM, messages).await
    }

    /// Writes a short spoken description of a diagram
    pub async fn narration_script(&self, dot: &str) -> Result<String> {
        let prompt = prompts::fill(prompts::NARRATION_USER, &[dot]);
        self.ask(
            "narration script",
            &self.narration_model,
            prompts::NARRATION_SYSTEM,
            vec![ChatMessage::user(prompt)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtlasError;
    use crate::diagram::DiagramError;
    use crate::llm::ChatRole;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: String,
        delay: Duration,
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(&self, model: &str, _system: &str, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push((model.to_string(), messages.to_vec()));
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_diagram_reply_is_validated() {
        let backend = Scripted::new("Sure!\n```dot\ndigraph { A; B; A -> B; }\n```");
        let analyzer = CodeAnalyzer::new(backend, &AtlasConfig::default());
        let spec = analyzer.generate_diagram("ctx").await.unwrap();
        assert_eq!(spec.node_count(), 2);

        let backend = Scripted::new("```dot\ndigraph { A; A -> B; }\n```");
        let analyzer = CodeAnalyzer::new(backend, &AtlasConfig::default());
        let error = analyzer.generate_diagram("ctx").await.unwrap_err();
        assert!(matches!(
            error,
            AtlasError::InvalidDiagram(DiagramError::UndeclaredNode { ref node, .. }) if node == "B"
        ));
    }

    #[tokio::test]
    async fn test_chat_keeps_recent_history() {
        let backend = Scripted::new("answer");
        let analyzer = CodeAnalyzer::new(backend.clone(), &AtlasConfig::default());
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| if i % 2 == 0 { ChatMessage::user(format!("q{}", i)) } else { ChatMessage::assistant(format!("a{}", i)) })
            .collect();

        assert_eq!(analyzer.chat("why?", "ctx", &history).await.unwrap(), "answer");
        let seen = backend.seen.lock().unwrap();
        let messages = &seen[0].1;
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[0].content, "q4");
        assert_eq!(messages[6].role, ChatRole::User);
        assert!(messages[6].content.ends_with("Current question: why?"));
    }

    #[tokio::test]
    async fn test_narration_uses_narration_model() {
        let backend = Scripted::new("A tidy pipeline.");
        let analyzer = CodeAnalyzer::new(backend.clone(), &AtlasConfig::default());
        analyzer.narration_script("digraph { a; }").await.unwrap();
        assert_eq!(backend.seen.lock().unwrap()[0].0, "gemini-2.0-flash");
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout() {
        let backend = Arc::new(Scripted {
            reply: "late".into(),
            delay: Duration::from_secs(600),
            seen: Mutex::new(Vec::new()),
        });
        let analyzer = CodeAnalyzer::new(backend, &AtlasConfig::default());
        let error = analyzer.generate_summary("ctx").await.unwrap_err();
        assert!(matches!(error, AtlasError::Timeout { ref operation, .. } if operation == "summary generation"));
    }
}
