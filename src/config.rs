//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field has a serde default so a partial file (or none at all)
//! still yields a runnable configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::orchestrator::{OrchestratorConfig, RetryPolicy};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick period override; omit to derive it from the fastest engine.
    pub tick_interval_ms: Option<u64>,
    pub fetch_ttl_ms: u64,
    pub engine_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: None,
            fetch_ttl_ms: 1_000,
            engine_timeout_ms: 5_000,
            retry_attempts: 2,
            retry_base_delay_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Seed for the synthetic random-walk source.
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub outputs_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outputs_file: "macroscope_outputs.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it is absent.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Project the scheduler section onto the orchestrator's config.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            tick_interval_ms: self.scheduler.tick_interval_ms,
            fetch_ttl_ms: self.scheduler.fetch_ttl_ms,
            retry: RetryPolicy {
                timeout_ms: self.scheduler.engine_timeout_ms,
                retry_attempts: self.scheduler.retry_attempts,
                base_delay_ms: self.scheduler.retry_base_delay_ms,
            },
        }
    }
}
