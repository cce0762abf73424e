use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The nominated log format for a site. `Auto` tries each recognizer in a
/// fixed order and takes the first match (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    NginxCombined,
    ApacheCombined,
    Auto,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Auto
    }
}

/// Anomaly-detection parameters (§4.6, configuration options in §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    pub baseline_days: i64,
    pub min_baseline_hours: usize,
    pub z_threshold: f64,
    pub new_path_min_count: u64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            baseline_days: 7,
            min_baseline_hours: 24,
            z_threshold: 3.0,
            new_path_min_count: 10,
        }
    }
}

/// Identity the pipeline operates on (§3 Site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub log_format: LogFormat,
    pub anomaly_params: AnomalyParams,
    pub hidden_ips: HashSet<String>,
}

impl Site {
    pub fn new<S: Into<String>>(id: S, name: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain: None,
            log_format: LogFormat::Auto,
            anomaly_params: AnomalyParams::default(),
            hidden_ips: HashSet::new(),
        }
    }

    pub fn is_hidden(&self, ip: &str) -> bool {
        self.hidden_ips.contains(ip)
    }
}
