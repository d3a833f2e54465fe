use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use heatpump_core::MAX_COVERAGE_DAYS;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_ENV: &str = "HEATPUMP_CONSOLE_CONFIG";
pub const TOKEN_ENV: &str = "HEATPUMP_TOKEN";
const DEFAULT_PATH: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub listen: String,
    pub static_dir: Option<PathBuf>,
    pub backend: BackendConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub coverage_days: u32,
    pub poll_interval_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            static_dir: None,
            backend: BackendConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            coverage_days: 2,
            poll_interval_secs: 30,
        }
    }
}

impl ConsoleConfig {
    /// Reads the file named by `HEATPUMP_CONSOLE_CONFIG` (or `console.toml`), then
    /// lets `HEATPUMP_TOKEN` override the token.
    pub async fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_PATH.into());
        let mut config = Self::load_from(Path::new(&path)).await?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.backend.token = Some(token);
        }
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no {}, using default configuration", path.display());
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_COVERAGE_DAYS).contains(&self.telemetry.coverage_days) {
            bail!("telemetry.coverage_days must be between 1 and {}", MAX_COVERAGE_DAYS);
        }
        if self.telemetry.poll_interval_secs == 0 {
            bail!("telemetry.poll_interval_secs must be at least 1");
        }
        if self.backend.timeout_secs == 0 {
            bail!("backend.timeout_secs must be at least 1");
        }
        Ok(())
    }
}
