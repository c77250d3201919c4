#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use codeatlas::llm::{ChatMessage, CompletionBackend};
use codeatlas::{AtlasConfig, CodeAtlas, Result};
use tempfile::TempDir;

pub mod test_helpers {
    use super::*;

    /// Model double that answers every call with the same text and records prompts
    pub struct MockBackend {
        reply: String,
        delay: Duration,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn new(reply: &str) -> Arc<Self> {
            Self::delayed(reply, Duration::ZERO)
        }

        pub fn delayed(reply: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                delay,
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionBackend for MockBackend {
        async fn complete(&self, _model: &str, _system: &str, messages: &[ChatMessage]) -> Result<String> {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    /// Model double whose diagram names every `.py` file it was shown
    pub struct EchoPaths;

    #[async_trait]
    impl CompletionBackend for EchoPaths {
        async fn complete(&self, _model: &str, _system: &str, messages: &[ChatMessage]) -> Result<String> {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            let nodes: Vec<String> = prompt
                .split("<file name=\"")
                .skip(1)
                .filter_map(|rest| rest.split('"').next())
                .map(|path| format!("\"{}\";", path))
                .collect();
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(format!("```dot\ndigraph {{ {} }}\n```", nodes.join(" ")))
        }
    }

    pub const DIAGRAM_REPLY: &str = "Here is the diagram:\n```dot\ndigraph Architecture {\n  api [label=\"API\"];\n  store [label=\"Store\"];\n  api -> store;\n}\n```";

    pub fn test_config(data: &TempDir) -> AtlasConfig {
        let mut config = AtlasConfig::new(data.path().to_path_buf());
        config.api_keys.elevenlabs = None;
        config
    }

    pub fn atlas_with(data: &TempDir, backend: Arc<dyn CompletionBackend>) -> CodeAtlas {
        CodeAtlas::with_backend(test_config(data), backend).unwrap()
    }

    /// Writes `(path, content)` pairs under `root`, creating directories
    pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
    }

    /// Builds a ZIP archive in memory, with every entry under `prefix/`
    pub fn zip_bytes(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default();
            for (path, content) in files {
                writer.start_file(format!("{}/{}", prefix, path), options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    pub fn setup_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }
}
