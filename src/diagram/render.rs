use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{DiagramSpec, LayoutOptions};
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::utils::with_timeout;

/// Output image format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    /// Scalable vector graphics
    #[default]
    Svg,
    /// Portable network graphics
    Png,
}

impl RenderFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            RenderFormat::Svg => "svg",
            RenderFormat::Png => "png",
        }
    }

    /// MIME type of the rendered bytes
    pub fn content_type(&self) -> &'static str {
        match self {
            RenderFormat::Svg => "image/svg+xml",
            RenderFormat::Png => "image/png",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "svg" => Ok(RenderFormat::Svg),
            "png" => Ok(RenderFormat::Png),
            other => Err(AtlasError::Validation(format!("Unsupported render format '{}'", other))),
        }
    }
}

/// Renders validated diagrams with the Graphviz `dot` executable
#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    binary: PathBuf,
    layout: LayoutOptions,
    timeout: Duration,
}

impl GraphvizRenderer {
    /// Creates a renderer from explicit settings
    pub fn new(binary: impl Into<PathBuf>, layout: LayoutOptions, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            layout,
            timeout,
        }
    }

    /// Creates a renderer from configuration
    pub fn from_config(config: &AtlasConfig) -> Self {
        Self::new(
            config.render.dot_binary.clone(),
            config.render.layout.clone(),
            config.timeouts.render(),
        )
    }

    /// Returns a copy using different layout options
    pub fn with_layout(mut self, layout: LayoutOptions) -> Self {
        self.layout = layout;
        self
    }

    /// The DOT text actually handed to Graphviz
    pub fn prepare(&self, spec: &DiagramSpec) -> String {
        self.layout.apply(&spec.raw_text)
    }

    /// Renders the diagram to image bytes
    pub async fn render(&self, spec: &DiagramSpec, format: RenderFormat) -> Result<Vec<u8>> {
        let source = self.prepare(spec);
        with_timeout("diagram rendering", self.timeout, self.run_dot(source, format)).await
    }

    async fn run_dot(&self, source: String, format: RenderFormat) -> Result<Vec<u8>> {
        debug!("Running {} -T{}", self.binary.display(), format.extension());
        let mut child = Command::new(&self.binary)
            .arg(format!("-T{}", format.extension()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AtlasError::Render(format!("Cannot start {}: {}", self.binary.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A closed pipe means dot already exited; its status says why.
            match stdin.write_all(source.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(AtlasError::Render(format!("Failed to send diagram to Graphviz: {}", e))),
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AtlasError::Render(format!("Graphviz did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AtlasError::Render(format!(
                "Graphviz exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(AtlasError::Render("Graphviz produced no output".into()));
        }
        info!("Rendered {} bytes of {}", output.stdout.len(), format.extension());
        Ok(output.stdout)
    }
}
