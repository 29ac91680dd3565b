use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub reconcile: ReconcileConf,
}

/// Délai avant la première réconciliation, puis backoff exponentiel borné
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConf {
    pub delay_ms: u64,
    pub max_attempts: u32,
    pub backoff_factor: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5079".into(),
            poll_interval_secs: 30,
            request_timeout_secs: 10,
            reconcile: ReconcileConf::default(),
        }
    }
}

impl Default for ReconcileConf {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            max_attempts: 3,
            backoff_factor: 2,
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn parse_config(txt: &str) -> Result<ControllerConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(ControllerConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn read_config(path: impl AsRef<Path>) -> Result<ControllerConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    parse_config(&txt)
}

/// Charge `VCPANEL_CONFIG` (défaut `vcpanel.yaml`), retombe sur les défauts
/// si le fichier manque ou est invalide. `VCPANEL_BASE_URL` écrase l'URL.
pub async fn load_config() -> ControllerConfig {
    let path = std::env::var("VCPANEL_CONFIG").unwrap_or_else(|_| "vcpanel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        match read_config(&path).await {
            Ok(cfg) => {
                info!(%path, "config loaded");
                cfg
            }
            Err(e) => {
                warn!(%path, error = %e, "invalid config, using defaults");
                ControllerConfig::default()
            }
        }
    } else {
        info!(%path, "no config file, using defaults");
        ControllerConfig::default()
    };

    if let Ok(url) = std::env::var("VCPANEL_BASE_URL") {
        if !url.trim().is_empty() {
            cfg.base_url = url;
        }
    }
    cfg
}
