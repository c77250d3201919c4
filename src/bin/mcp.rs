use codeatlas::{mcp::CodeAtlasServer, AtlasConfig, CodeAtlas};
use rmcp::ServiceExt;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = AtlasConfig::load()?;
    config.validate().await?;
    info!("Serving CodeAtlas tools over stdio");

    let service = CodeAtlasServer::new(CodeAtlas::new(config)?)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| eprintln!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
