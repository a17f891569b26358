use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vizbeat_server::analysis::AnalysisBackend;
use vizbeat_server::config::{AppConfig, CliConfig, FileConfig};
use vizbeat_server::server::{run_server, RequestsLoggingLevel};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to an optional TOML config file. Values in it override CLI args.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 4000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Scratch directory for per-request acquisition files.
    /// Defaults to the system temp directory.
    #[clap(long)]
    pub work_dir: Option<PathBuf>,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Path to the external retrieval-and-decode utility.
    #[clap(long)]
    pub retrieval_tool: Option<PathBuf>,

    /// Path to the external transcode utility.
    #[clap(long)]
    pub transcode_tool: Option<PathBuf>,

    /// Wall-clock timeout in seconds for one acquisition.
    #[clap(long, default_value_t = 120)]
    pub acquire_timeout_sec: u64,

    /// Bound in seconds on time-to-first-byte from the streaming pipeline.
    #[clap(long, default_value_t = 12)]
    pub first_chunk_timeout_sec: u64,

    /// Maximum size in bytes of one acquired audio file.
    #[clap(long, default_value_t = 60 * 1024 * 1024)]
    pub max_download_bytes: u64,

    /// Maximum declared source duration in seconds.
    #[clap(long, default_value_t = 480)]
    pub max_source_duration_sec: u64,

    /// Size ceiling in bytes for waveforms admitted to spectral analysis.
    #[clap(long, default_value_t = 45 * 1024 * 1024)]
    pub max_waveform_bytes: u64,

    /// Number of concurrent spectral analysis workers.
    #[clap(long, default_value_t = 2)]
    pub analysis_workers: usize,

    /// Maximum number of cached timelines before LRU eviction.
    #[clap(long, default_value_t = 64)]
    pub cache_max_entries: usize,
}

impl CliArgs {
    fn into_cli_config(self) -> CliConfig {
        CliConfig {
            port: self.port,
            logging_level: self.logging_level,
            work_dir: self.work_dir,
            frontend_dir_path: self.frontend_dir_path,
            retrieval_tool: self.retrieval_tool,
            transcode_tool: self.transcode_tool,
            acquire_timeout_sec: self.acquire_timeout_sec,
            first_chunk_timeout_sec: self.first_chunk_timeout_sec,
            max_download_bytes: self.max_download_bytes,
            max_source_duration_sec: self.max_source_duration_sec,
            max_waveform_bytes: self.max_waveform_bytes,
            analysis_workers: self.analysis_workers,
            cache_max_entries: self.cache_max_entries,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let config = AppConfig::resolve(&cli_args.into_cli_config(), file_config)?;

    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("Failed to create work dir {:?}", config.work_dir))?;

    info!(
        "Probing retrieval tool at {}...",
        config.retrieval_tool.display()
    );
    let backend = AnalysisBackend::detect(&config.retrieval_tool).await;
    match &backend {
        AnalysisBackend::Available => info!("Analysis backend available"),
        AnalysisBackend::Unavailable(reason) => {
            warn!("Analysis degraded to synthetic timelines: {}", reason)
        }
    }

    run_server(config, backend).await
}
