use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tillroll_ocr::ScanConfig;

pub const CONFIG_ENV: &str = "TILLROLL_CONFIG";
pub const BIND_ENV: &str = "TILLROLL_BIND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Bunyan-style JSON lines.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Browser origins allowed to call the API (CORS).
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    pub scan: ScanConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 10 * 1024 * 1024,
            log_format: LogFormat::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid server config")
    }

    /// Read the file named by `TILLROLL_CONFIG` (defaults when unset), then
    /// apply `TILLROLL_BIND`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = match env(CONFIG_ENV) {
            Some(path) => {
                let path = Path::new(&path);
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        if let Some(bind) = env(BIND_ENV) {
            config.bind = bind;
        }
        Ok(config)
    }
}
