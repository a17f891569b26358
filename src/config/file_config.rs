use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub work_dir: Option<String>,
    pub frontend_dir_path: Option<String>,

    // External tools
    pub retrieval_tool: Option<String>,
    pub transcode_tool: Option<String>,

    // Feature configs
    pub acquisition: Option<AcquisitionConfig>,
    pub analysis: Option<AnalysisConfig>,
    pub streaming: Option<StreamingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub timeout_sec: Option<u64>,
    pub probe_timeout_sec: Option<u64>,
    pub max_download_bytes: Option<u64>,
    pub max_source_duration_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_waveform_bytes: Option<u64>,
    pub workers: Option<usize>,
    pub cache_max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StreamingConfig {
    pub first_chunk_timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
