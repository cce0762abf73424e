//! Pipeline configuration (§6, SPEC_FULL.md A.3), mirroring the shape of
//! the teacher's `PipelineConfig`: one struct loaded from TOML with
//! `__`-separated environment overrides, covering both the in-scope site
//! settings and the ambient server/database settings.

use crate::error::{PipelineError, Result};
use crate::models::{AnomalyParams, LogFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "postgres://localhost/logamizer".to_string(), max_connections: 10 }
    }
}

/// Per-site settings (§6): format plus anomaly-detection parameters and the
/// hidden-IP set, the same fields carried on [`crate::models::Site`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_baseline_days")]
    pub anomaly_baseline_days: i64,
    #[serde(default = "default_min_baseline_hours")]
    pub anomaly_min_baseline_hours: usize,
    #[serde(default = "default_z_threshold")]
    pub anomaly_z_threshold: f64,
    #[serde(default = "default_new_path_min_count")]
    pub anomaly_new_path_min_count: u64,
    #[serde(default)]
    pub filtered_ips: Vec<String>,
}

fn default_baseline_days() -> i64 {
    AnomalyParams::default().baseline_days
}
fn default_min_baseline_hours() -> usize {
    AnomalyParams::default().min_baseline_hours
}
fn default_z_threshold() -> f64 {
    AnomalyParams::default().z_threshold
}
fn default_new_path_min_count() -> u64 {
    AnomalyParams::default().new_path_min_count
}

impl Default for SiteConfig {
    fn default() -> Self {
        let defaults = AnomalyParams::default();
        Self {
            log_format: LogFormat::Auto,
            anomaly_baseline_days: defaults.baseline_days,
            anomaly_min_baseline_hours: defaults.min_baseline_hours,
            anomaly_z_threshold: defaults.z_threshold,
            anomaly_new_path_min_count: defaults.new_path_min_count,
            filtered_ips: Vec::new(),
        }
    }
}

impl SiteConfig {
    pub fn anomaly_params(&self) -> AnomalyParams {
        AnomalyParams {
            baseline_days: self.anomaly_baseline_days,
            min_baseline_hours: self.anomaly_min_baseline_hours,
            z_threshold: self.anomaly_z_threshold,
            new_path_min_count: self.anomaly_new_path_min_count,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

impl PipelineConfig {
    /// Load from a TOML file, then apply `LOGAMIZER__`-prefixed,
    /// `__`-separated environment overrides (e.g.
    /// `LOGAMIZER__DATABASE__URL`), matching the teacher's config-loading
    /// convention.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(format!("failed to read {}: {e}", path.display())))?;
        let mut config: PipelineConfig =
            toml::from_str(&contents).map_err(|e| PipelineError::config(format!("invalid config: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LOGAMIZER__DATABASE__URL") {
            self.database.url = url;
        }
        if let Ok(max_conn) = std::env::var("LOGAMIZER__DATABASE__MAX_CONNECTIONS") {
            if let Ok(n) = max_conn.parse() {
                self.database.max_connections = n;
            }
        }
        if let Ok(host) = std::env::var("LOGAMIZER__SERVER__HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LOGAMIZER__SERVER__PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
    }

    /// Validate the loaded configuration, matching `validate-config`'s
    /// contract (SPEC_FULL.md A.4).
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(PipelineError::validation("database.max_connections must be at least 1"));
        }
        for (site_id, site) in &self.sites {
            if site.anomaly_z_threshold <= 0.0 {
                return Err(PipelineError::validation(format!(
                    "site {site_id}: anomaly_z_threshold must be positive"
                )));
            }
            if site.anomaly_baseline_days <= 0 {
                return Err(PipelineError::validation(format!(
                    "site {site_id}: anomaly_baseline_days must be positive"
                )));
            }
        }
        Ok(())
    }
}
