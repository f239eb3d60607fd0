//! Watcher configuration.
//!
//! Loaded from the first file found among:
//! - `linkup.toml`
//! - `/etc/linkup/linkup.toml`
//! - `~/.config/linkup/linkup.toml`
//!
//! `LINKUP_URL` and `LINKUP_TOKEN` override the file.

use anyhow::{Context, Result};
use linkup_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bearer credential for the realtime connection.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Sync layer settings (`[realtime]`, `[throttle]`, `[notifications]`).
    #[serde(flatten)]
    pub sync: SyncConfig,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "linkup.toml",
            "/etc/linkup/linkup.toml",
            "~/.config/linkup/linkup.toml",
        ];

        let mut config = Self::default();
        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                config = Self::from_file(expanded.as_ref())?;
                break;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("LINKUP_URL") {
            self.sync.realtime.url = url;
        }
        if let Ok(token) = std::env::var("LINKUP_TOKEN") {
            self.token = Some(token);
        }
    }

    /// The credential to connect with.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the file nor `LINKUP_TOKEN` provides one.
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("No credential configured: set `token` in linkup.toml or LINKUP_TOKEN")
    }
}
