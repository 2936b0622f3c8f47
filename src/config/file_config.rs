use crate::jobs::JobParams;
use crate::tenants::Tenant;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Scheduling (can override CLI)
    pub jobs: Option<Vec<String>>,
    pub interval_secs: Option<u64>,
    pub execution_mode: Option<String>,
    pub workers: Option<usize>,
    pub worker_shutdown_grace_secs: Option<u64>,

    // Remote endpoints
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub token_safety_margin_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,

    pub token_cache_path: Option<String>,
    pub metrics_port: Option<u16>,

    pub tenants: Option<Vec<Tenant>>,
    pub job_params: Option<JobParams>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
