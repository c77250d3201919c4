//! HTTP service
//!
//! JSON routes over [`CodeAtlas`]. Every request carries its own optional API
//! key and model, applied to a scoped copy of the pipeline, so concurrent
//! callers never see each other's settings.

use std::sync::Arc;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::diagram::{LayoutOptions, RenderFormat};
use crate::error::AtlasError;
use crate::history::DiagramRecord;
use crate::llm::ChatMessage;
use crate::loader::RepoRef;
use crate::pipeline::{AnalysisReport, CodeAtlas, Narration, SummaryReport};

const DEFAULT_RECENT: usize = 10;

/// Header carrying the model provider's API key on routes without a JSON body
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request naming a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRequest {
    /// GitHub URL, or a server-side path when local paths are enabled
    pub repo: String,
    /// API key for the selected model's provider
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model display name or id
    #[serde(default)]
    pub model: Option<String>,
}

/// Question about a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// GitHub URL, or a server-side path when local paths are enabled
    pub repo: String,
    /// The question
    pub question: String,
    /// Earlier turns of the conversation, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// API key for the selected model's provider
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model display name or id
    #[serde(default)]
    pub model: Option<String>,
}

/// Answer to a [`ChatRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The model's answer
    pub answer: String,
}

/// Query string of an archive upload
///
/// The API key travels in the [`API_KEY_HEADER`] header so it never appears in request URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadParams {
    /// File name of the archive
    pub name: Option<String>,
    /// Model display name or id
    pub model: Option<String>,
}

/// Query string of the recent-diagrams listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentParams {
    /// Maximum number of entries
    pub limit: Option<usize>,
}

/// Diagram text to render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// DOT source, optionally inside a fenced block
    pub dot: String,
    /// `svg` or `png`; SVG when absent
    #[serde(default)]
    pub format: Option<String>,
    /// Layout overrides
    #[serde(default)]
    pub layout: Option<LayoutOptions>,
}

/// Diagram text to narrate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrateRequest {
    /// DOT source, optionally inside a fenced block
    pub dot: String,
    /// ElevenLabs voice id; the configured voice when absent
    #[serde(default)]
    pub voice_id: Option<String>,
    /// API key for the narration model's provider
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Text to read aloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakRequest {
    /// Usually a summary from `/api/summarize`
    pub text: String,
    /// ElevenLabs voice id; the configured voice when absent
    #[serde(default)]
    pub voice_id: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current status
    pub status: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service uptime in seconds
    pub uptime: u64,
    /// Model used when a request names none
    pub default_model: String,
}

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub kind: String,
    /// Human-readable message
    pub error: String,
}

/// Maps an error to the status code the HTTP service answers with
pub fn error_status(error: &AtlasError) -> StatusCode {
    match error {
        AtlasError::Validation(_) => StatusCode::BAD_REQUEST,
        AtlasError::InvalidDiagram(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AtlasError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AtlasError::Fetch(_) | AtlasError::Model(_) | AtlasError::OpenAI(_) | AtlasError::Synthesis(_) => {
            StatusCode::BAD_GATEWAY
        }
        AtlasError::InvalidSource(_) | AtlasError::Zip(_) | AtlasError::UrlParse(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An [`AtlasError`] on its way to the client
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: AtlasError,
}

impl From<AtlasError> for ApiError {
    fn from(error: AtlasError) -> Self {
        Self {
            status: error_status(&error),
            error,
        }
    }
}

impl ApiError {
    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.error);
        } else {
            info!("Request rejected: {}", self.error);
        }
        let body = ErrorBody {
            kind: self.error.kind().to_string(),
            error: self.error.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    atlas: Arc<CodeAtlas>,
    started: DateTime<Utc>,
}

impl AppState {
    /// Wraps a pipeline for the handlers
    pub fn new(atlas: CodeAtlas) -> Self {
        Self {
            atlas: Arc::new(atlas),
            started: Utc::now(),
        }
    }

    fn repo_ref(&self, input: &str) -> ApiResult<RepoRef> {
        let repo = RepoRef::parse(input)?;
        let local = matches!(repo, RepoRef::Directory(_) | RepoRef::ZipFile(_));
        if local && !self.atlas.config().server.allow_local_paths {
            return Err(AtlasError::Validation(
                "Local paths are disabled on this server; use a GitHub URL or /api/upload".into(),
            )
            .into());
        }
        Ok(repo)
    }
}

/// Builds the router with every route and middleware
pub fn create_app(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.atlas.config().processing.max_archive_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/analyze", post(analyze))
        .route("/api/summarize", post(summarize))
        .route("/api/chat", post(chat))
        .route("/api/upload", post(upload).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/recent", get(recent))
        .route("/api/diagrams/:id", get(diagram_source))
        .route("/api/render", post(render))
        .route("/api/narrate", post(narrate))
        .route("/api/speak", post(speak))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "CodeAtlas".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime: (Utc::now() - state.started).num_seconds().max(0) as u64,
        default_model: state.atlas.config().models.default_model.clone(),
    })
}

async fn analyze(State(state): State<AppState>, Json(request): Json<RepoRequest>) -> ApiResult<Json<AnalysisReport>> {
    info!("Analysis requested for {}", request.repo);
    let repo = state.repo_ref(&request.repo)?;
    let atlas = state.atlas.scoped(request.api_key.as_deref(), request.model.as_deref())?;
    Ok(Json(atlas.analyze(&repo).await?))
}

async fn summarize(State(state): State<AppState>, Json(request): Json<RepoRequest>) -> ApiResult<Json<SummaryReport>> {
    info!("Summary requested for {}", request.repo);
    let repo = state.repo_ref(&request.repo)?;
    let atlas = state.atlas.scoped(request.api_key.as_deref(), request.model.as_deref())?;
    Ok(Json(atlas.summarize(&repo).await?))
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> ApiResult<Json<ChatResponse>> {
    let repo = state.repo_ref(&request.repo)?;
    let atlas = state.atlas.scoped(request.api_key.as_deref(), request.model.as_deref())?;
    let answer = atlas.chat(&repo, &request.question, &request.history).await?;
    Ok(Json(ChatResponse { answer }))
}

/// API key from the [`API_KEY_HEADER`] header, if present and readable
pub fn header_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AnalysisReport>> {
    if body.is_empty() {
        return Err(AtlasError::Validation("Upload a ZIP archive as the request body".into()).into());
    }
    let name = params.name.unwrap_or_else(|| "upload.zip".to_string());
    info!("Analysis requested for uploaded archive {} ({} bytes)", name, body.len());
    let repo = RepoRef::Upload {
        name,
        bytes: body.to_vec(),
    };
    let atlas = state.atlas.scoped(header_api_key(&headers), params.model.as_deref())?;
    Ok(Json(atlas.analyze(&repo).await?))
}

async fn recent(State(state): State<AppState>, Query(params): Query<RecentParams>) -> ApiResult<Json<Vec<DiagramRecord>>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT);
    Ok(Json(state.atlas.list_recent(limit).await?))
}

async fn diagram_source(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let dot = state.atlas.history().load(&id).await.map_err(|e| match e {
        AtlasError::History(_) => ApiError::from(e).with_status(StatusCode::NOT_FOUND),
        other => ApiError::from(other),
    })?;
    Ok(([(header::CONTENT_TYPE, "text/vnd.graphviz; charset=utf-8")], dot).into_response())
}

async fn render(State(state): State<AppState>, Json(request): Json<RenderRequest>) -> ApiResult<Response> {
    let format: RenderFormat = match request.format.as_deref() {
        Some(name) => name.parse()?,
        None => RenderFormat::default(),
    };
    let bytes = state.atlas.render(&request.dot, format, request.layout).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], bytes).into_response())
}

async fn narrate(State(state): State<AppState>, Json(request): Json<NarrateRequest>) -> ApiResult<Json<Narration>> {
    let atlas = state.atlas.scoped(request.api_key.as_deref(), None)?;
    Ok(Json(atlas.narrate(&request.dot, request.voice_id.as_deref()).await?))
}

async fn speak(State(state): State<AppState>, Json(request): Json<SpeakRequest>) -> ApiResult<Json<Narration>> {
    if request.text.trim().is_empty() {
        return Err(AtlasError::Validation("Text to speak is empty".into()).into());
    }
    Ok(Json(state.atlas.speak(&request.text, request.voice_id.as_deref()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::DiagramError;
    use std::time::Duration;

    #[test]
    fn test_header_api_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_api_key(&headers), None);
        headers.insert(API_KEY_HEADER, "  ".parse().unwrap());
        assert_eq!(header_api_key(&headers), None);
        headers.insert(API_KEY_HEADER, "sk-test ".parse().unwrap());
        assert_eq!(header_api_key(&headers), Some("sk-test"));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(error_status(&AtlasError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&AtlasError::InvalidDiagram(DiagramError::NoNodes)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&AtlasError::timeout("diagram generation", Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(error_status(&AtlasError::Fetch("404".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            error_status(&AtlasError::InvalidSource("Unsafe archive entry: ../escape.py".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(error_status(&AtlasError::Render("dot".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_defaults() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"repo":"https://github.com/a/b","question":"why?"}"#).unwrap();
        assert!(request.history.is_empty());
        assert!(request.api_key.is_none());
    }
}
