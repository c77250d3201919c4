//! MCP tool server
//!
//! Exposes analysis, summaries, chat and the diagram history as tools for
//! agent clients. Failures come back as tool errors carrying the error kind,
//! never as protocol errors.

use std::sync::Arc;
use log::info;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;

use crate::error::AtlasError;
use crate::loader::RepoRef;
use crate::pipeline::CodeAtlas;

const INSTRUCTIONS: &str = "CodeAtlas reads a code repository (GitHub URL, ZIP archive or local directory) \
and explains it. Use analyze_codebase for a Graphviz architecture diagram with a summary, get_architecture_summary for \
prose, chat_with_codebase for questions and list_recent_analyses for earlier diagrams.";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RepoRequest {
    /// GitHub URL, path to a ZIP archive, or path to a directory
    repo: String,
    /// Model display name or id; the configured default when omitted
    #[serde(default)]
    model: Option<String>,
    /// API key for the model's provider; the configured key when omitted
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ChatRequest {
    /// GitHub URL, path to a ZIP archive, or path to a directory
    repo: String,
    /// Question about the code
    question: String,
    /// Model display name or id; the configured default when omitted
    #[serde(default)]
    model: Option<String>,
    /// API key for the model's provider; the configured key when omitted
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListRecentRequest {
    /// Maximum number of entries, 10 when omitted
    #[serde(default)]
    limit: Option<usize>,
}

fn failure(error: AtlasError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("[{}] {}", error.kind(), error))])
}

fn json_result<T: serde::Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => failure(e.into()),
    }
}

/// Tool server over one shared pipeline
#[derive(Clone)]
pub struct CodeAtlasServer {
    atlas: Arc<CodeAtlas>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CodeAtlasServer {
    /// Creates a server around a configured pipeline
    pub fn new(atlas: CodeAtlas) -> Self {
        Self {
            atlas: Arc::new(atlas),
            tool_router: Self::tool_router(),
        }
    }

    fn scoped(&self, model: Option<&str>, api_key: Option<&str>) -> Result<CodeAtlas, AtlasError> {
        self.atlas.scoped(api_key, model)
    }

    #[tool(
        description = "Generate a validated Graphviz DOT architecture diagram for a repository. Returns JSON with the diagram source, a prose summary, node and edge counts, the files the model saw and a warning when the context budget dropped files."
    )]
    async fn analyze_codebase(&self, Parameters(req): Parameters<RepoRequest>) -> Result<CallToolResult, McpError> {
        info!("analyze_codebase: {}", req.repo);
        let result = async {
            let repo = RepoRef::parse(&req.repo)?;
            self.scoped(req.model.as_deref(), req.api_key.as_deref())?.analyze(&repo).await
        }
        .await;
        Ok(match result {
            Ok(report) => json_result(&serde_json::json!({
                "repo": report.repo_name,
                "model": report.model,
                "dot": report.diagram.raw_text,
                "summary": report.summary,
                "node_count": report.diagram.node_count(),
                "edge_count": report.diagram.edge_count(),
                "files_processed": report.stats.files_processed,
                "included_paths": report.included_paths,
                "budget_warning": report.budget_warning,
                "saved_as": report.saved.map(|r| r.id),
            })),
            Err(e) => failure(e),
        })
    }

    #[tool(description = "Write a prose architecture summary of a repository.")]
    async fn get_architecture_summary(
        &self,
        Parameters(req): Parameters<RepoRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!("get_architecture_summary: {}", req.repo);
        let result = async {
            let repo = RepoRef::parse(&req.repo)?;
            self.scoped(req.model.as_deref(), req.api_key.as_deref())?.summarize(&repo).await
        }
        .await;
        Ok(match result {
            Ok(report) => {
                let mut text = report.summary;
                if let Some(warning) = report.budget_warning {
                    text.push_str(&format!("\n\n_Note: {}_", warning));
                }
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(e) => failure(e),
        })
    }

    #[tool(description = "Answer a question about a repository's code.")]
    async fn chat_with_codebase(&self, Parameters(req): Parameters<ChatRequest>) -> Result<CallToolResult, McpError> {
        info!("chat_with_codebase: {}", req.repo);
        let result = async {
            let repo = RepoRef::parse(&req.repo)?;
            self.scoped(req.model.as_deref(), req.api_key.as_deref())?
                .chat(&repo, &req.question, &[])
                .await
        }
        .await;
        Ok(match result {
            Ok(answer) => CallToolResult::success(vec![Content::text(answer)]),
            Err(e) => failure(e),
        })
    }

    #[tool(description = "List recently generated diagrams, newest first, as JSON metadata.")]
    async fn list_recent_analyses(
        &self,
        Parameters(req): Parameters<ListRecentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let limit = req.limit.unwrap_or(10);
        Ok(match self.atlas.list_recent(limit).await {
            Ok(records) => json_result(&records),
            Err(e) => failure(e),
        })
    }
}

#[tool_handler]
impl ServerHandler for CodeAtlasServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtlasConfig;
    use crate::error::Result;
    use crate::llm::{ChatMessage, CompletionBackend};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(&self, _model: &str, _system: &str, _messages: &[ChatMessage]) -> Result<String> {
            Ok("```dot\ndigraph { app; db; app -> db; }\n```".to_string())
        }
    }

    fn server(data: &TempDir) -> CodeAtlasServer {
        let config = AtlasConfig::new(data.path().to_path_buf());
        CodeAtlasServer::new(CodeAtlas::with_backend(config, Arc::new(Echo)).unwrap())
    }

    #[tokio::test]
    async fn test_analyze_then_list() {
        let data = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::write(repo.path().join("main.py"), "import db\n").unwrap();
        let server = server(&data);

        let result = server
            .analyze_codebase(Parameters(RepoRequest {
                repo: repo.path().to_string_lossy().into_owned(),
                model: None,
                api_key: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));

        let listed = server
            .list_recent_analyses(Parameters(ListRecentRequest { limit: None }))
            .await
            .unwrap();
        assert_eq!(listed.is_error, Some(false));
        assert_eq!(server.atlas.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_input_is_a_tool_error() {
        let data = TempDir::new().unwrap();
        let result = server(&data)
            .get_architecture_summary(Parameters(RepoRequest {
                repo: "https://gitlab.com/a/b".into(),
                model: None,
                api_key: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
