use codeatlas::{
    api::{create_app, AppState},
    AtlasConfig, CodeAtlas,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = AtlasConfig::load()?;
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port.parse()?;
    }
    config.validate().await?;

    if config.api_keys.gemini.is_none() && config.api_keys.openai.is_none() {
        warn!("No model API key configured; requests must supply api_key");
    }
    if config.api_keys.elevenlabs.is_none() {
        warn!("ELEVENLABS_API_KEY not set; /api/narrate is unavailable");
    }

    let address = format!("{}:{}", config.server.host, config.server.port);
    info!("CodeAtlas server starting");
    info!("Data directory: {}", config.paths.data_dir.display());
    info!("Default model: {}", config.models.default_model);

    let app = create_app(AppState::new(CodeAtlas::new(config)?));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
