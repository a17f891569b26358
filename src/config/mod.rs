mod file_config;

pub use file_config::{AcquisitionConfig, AnalysisConfig, FileConfig, StreamingConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub work_dir: Option<PathBuf>,
    pub frontend_dir_path: Option<String>,
    pub retrieval_tool: Option<PathBuf>,
    pub transcode_tool: Option<PathBuf>,
    pub acquire_timeout_sec: u64,
    pub first_chunk_timeout_sec: u64,
    pub max_download_bytes: u64,
    pub max_source_duration_sec: u64,
    pub max_waveform_bytes: u64,
    pub analysis_workers: usize,
    pub cache_max_entries: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            logging_level: RequestsLoggingLevel::default(),
            work_dir: None,
            frontend_dir_path: None,
            retrieval_tool: None,
            transcode_tool: None,
            acquire_timeout_sec: 120,
            first_chunk_timeout_sec: 12,
            max_download_bytes: 60 * 1024 * 1024,
            max_source_duration_sec: 480,
            max_waveform_bytes: 45 * 1024 * 1024,
            analysis_workers: 2,
            cache_max_entries: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Scratch area for per-request acquisition directories.
    pub work_dir: PathBuf,
    pub frontend_dir_path: Option<String>,

    // External tools
    pub retrieval_tool: PathBuf,
    pub transcode_tool: PathBuf,

    // Acquisition limits
    pub acquire_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_download_bytes: u64,
    pub max_source_duration_sec: u64,

    // Analysis limits
    pub max_waveform_bytes: u64,
    pub analysis_workers: usize,
    pub cache_max_entries: usize,

    // Streaming
    pub first_chunk_timeout: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let work_dir = file
            .work_dir
            .map(PathBuf::from)
            .or_else(|| cli.work_dir.clone())
            .unwrap_or_else(std::env::temp_dir);
        if work_dir.exists() && !work_dir.is_dir() {
            bail!("work_dir is not a directory: {:?}", work_dir);
        }

        let frontend_dir_path = file.frontend_dir_path.or_else(|| cli.frontend_dir_path.clone());

        let retrieval_tool = file
            .retrieval_tool
            .map(PathBuf::from)
            .or_else(|| cli.retrieval_tool.clone())
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let transcode_tool = file
            .transcode_tool
            .map(PathBuf::from)
            .or_else(|| cli.transcode_tool.clone())
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        let acquisition = file.acquisition.unwrap_or_default();
        let acquire_timeout_sec = acquisition.timeout_sec.unwrap_or(cli.acquire_timeout_sec);
        if acquire_timeout_sec == 0 {
            bail!("acquisition timeout must be positive");
        }
        let probe_timeout_sec = acquisition.probe_timeout_sec.unwrap_or(15);
        let max_download_bytes = acquisition
            .max_download_bytes
            .unwrap_or(cli.max_download_bytes);
        let max_source_duration_sec = acquisition
            .max_source_duration_sec
            .unwrap_or(cli.max_source_duration_sec);

        let analysis = file.analysis.unwrap_or_default();
        let max_waveform_bytes = analysis.max_waveform_bytes.unwrap_or(cli.max_waveform_bytes);
        let analysis_workers = analysis.workers.unwrap_or(cli.analysis_workers).max(1);
        let cache_max_entries = analysis
            .cache_max_entries
            .unwrap_or(cli.cache_max_entries)
            .max(1);

        let streaming = file.streaming.unwrap_or_default();
        let first_chunk_timeout_sec = streaming
            .first_chunk_timeout_sec
            .unwrap_or(cli.first_chunk_timeout_sec);
        if first_chunk_timeout_sec == 0 {
            bail!("first-chunk timeout must be positive");
        }

        Ok(Self {
            port,
            logging_level,
            work_dir,
            frontend_dir_path,
            retrieval_tool,
            transcode_tool,
            acquire_timeout: Duration::from_secs(acquire_timeout_sec),
            probe_timeout: Duration::from_secs(probe_timeout_sec),
            max_download_bytes,
            max_source_duration_sec,
            max_waveform_bytes,
            analysis_workers,
            cache_max_entries,
            first_chunk_timeout: Duration::from_secs(first_chunk_timeout_sec),
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            port: 4001,
            acquire_timeout_sec: 90,
            retrieval_tool: Some(PathBuf::from("/opt/yt-dlp")),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.port, 4001);
        assert_eq!(config.acquire_timeout, Duration::from_secs(90));
        assert_eq!(config.retrieval_tool, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(config.transcode_tool, PathBuf::from("ffmpeg"));
        assert_eq!(config.first_chunk_timeout, Duration::from_secs(12));
        assert_eq!(config.max_waveform_bytes, 45 * 1024 * 1024);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            port: 4000,
            first_chunk_timeout_sec: 12,
            ..Default::default()
        };
        let file = FileConfig {
            port: Some(5000),
            logging_level: Some("headers".to_string()),
            streaming: Some(StreamingConfig {
                first_chunk_timeout_sec: Some(25),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.first_chunk_timeout, Duration::from_secs(25));
        // CLI value used when TOML doesn't specify.
        assert_eq!(config.acquire_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_resolve_rejects_zero_timeouts() {
        let cli = CliConfig {
            acquire_timeout_sec: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());

        let cli = CliConfig {
            first_chunk_timeout_sec: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_clamps_worker_and_cache_minimums() {
        let cli = CliConfig {
            analysis_workers: 0,
            cache_max_entries: 0,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.analysis_workers, 1);
        assert_eq!(config.cache_max_entries, 1);
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }
}
