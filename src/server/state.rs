use axum::extract::FromRef;

use crate::acquire::Acquirer;
use crate::analysis::AnalysisBackend;
use crate::cache::AnalysisCache;
use crate::transcode::TranscodePipeline;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use super::ServerConfig;

pub type GuardedCache = Arc<AnalysisCache>;
pub type GuardedAcquirer = Arc<Acquirer>;
pub type GuardedPipeline = Arc<TranscodePipeline>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub cache: GuardedCache,
    pub acquirer: GuardedAcquirer,
    pub pipeline: GuardedPipeline,
    /// Resolved once at startup; handlers never re-probe availability.
    pub backend: AnalysisBackend,
    /// Bounds concurrent spectral analysis to cap peak memory.
    pub analysis_slots: Arc<Semaphore>,
    pub max_waveform_bytes: u64,
}

impl FromRef<ServerState> for GuardedCache {
    fn from_ref(input: &ServerState) -> Self {
        input.cache.clone()
    }
}

impl FromRef<ServerState> for GuardedAcquirer {
    fn from_ref(input: &ServerState) -> Self {
        input.acquirer.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
