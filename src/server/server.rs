use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::services::ServeDir;

use crate::acquire::{Acquirer, AcquireError, AcquireSettings};
use crate::analysis::{
    analyze_wav_file, synthetic_timeline, AnalysisBackend, AnalysisError, FeatureTimeline,
    DEFAULT_DURATION_SECS,
};
use crate::cache::AnalysisCache;
use crate::config::AppConfig;
use crate::source::{resolve_reference, SourceId};
use crate::transcode::{PipelineError, PipelineSettings, TranscodePipeline};

use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime: String,
}

#[derive(Serialize)]
struct HealthReport {
    pub status: &'static str,
    pub analysis_backend: bool,
    pub cached_timelines: usize,
    pub oldest_cache_entry_secs: Option<u64>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
    };
    Json(stats)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let backend_available = state.backend.is_available();
    let report = HealthReport {
        status: if backend_available { "healthy" } else { "degraded" },
        analysis_backend: backend_available,
        cached_timelines: state.cache.len(),
        oldest_cache_entry_secs: state.cache.oldest_entry_age().map(|age| age.as_secs()),
        timestamp: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    Json(report)
}

/// Everything that can knock the real analysis path over. The handler never
/// surfaces these to the client; they only pick the log line before the
/// synthetic fallback is substituted.
#[derive(Debug, Error)]
enum DegradeCause {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

async fn real_timeline(state: ServerState, id: SourceId) -> Result<FeatureTimeline, DegradeCause> {
    if let AnalysisBackend::Unavailable(reason) = &state.backend {
        return Err(AnalysisError::Unavailable(reason.clone()).into());
    }

    let waveform = state.acquirer.acquire(&id).await?;

    // Spectral analysis is CPU-bound; run it off the request threads and
    // cap how many run at once.
    let _permit = state
        .analysis_slots
        .clone()
        .acquire_owned()
        .await
        .expect("analysis semaphore is never closed");

    let source = id.as_str().to_string();
    let max_bytes = state.max_waveform_bytes;
    let timeline = tokio::task::spawn_blocking(move || {
        // The waveform handle moves into the task so the scratch directory
        // outlives the analysis, and is deleted as soon as it returns.
        analyze_wav_file(waveform.path(), &source, max_bytes)
    })
    .await
    .map_err(|e| AnalysisError::Internal(format!("analysis task failed: {}", e)))??;

    Ok(timeline)
}

/// Compute the timeline for one id, degrading to the synthetic generator on
/// any failure. This is the only place the fallback decision is made.
async fn compute_timeline(state: ServerState, id: SourceId) -> FeatureTimeline {
    match real_timeline(state, id.clone()).await {
        Ok(timeline) => {
            info!(
                "Analyzed {}: tempo={:.1} bpm, {} beats, {:.0}s",
                id,
                timeline.tempo,
                timeline.beats.len(),
                timeline.duration
            );
            timeline
        }
        Err(cause) => {
            warn!("Analysis of {} degraded to synthetic timeline: {}", id, cause);
            synthetic_timeline(id.as_str(), DEFAULT_DURATION_SECS)
        }
    }
}

#[derive(Deserialize, Debug)]
struct AnalysisQuery {
    url: Option<String>,
}

/// `GET /audio_analysis?url=<reference>`
///
/// Always answers 200 with a valid timeline for a resolvable reference;
/// "no real analysis available" is a supported outcome, not a failure.
async fn audio_analysis(
    State(state): State<ServerState>,
    Query(query): Query<AnalysisQuery>,
) -> Response {
    let Some(reference) = query.url else {
        return (StatusCode::BAD_REQUEST, "missing url parameter").into_response();
    };
    let id = match resolve_reference(&reference) {
        Ok(id) => id,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid media reference").into_response(),
    };

    let cache = state.cache.clone();
    let timeline = cache
        .get_or_compute(&id, || compute_timeline(state, id.clone()))
        .await;

    Json(&*timeline).into_response()
}

/// `GET /stream/{reference}?token=...`
///
/// Live pipeline output: no ranges, no caching. The opaque token is for the
/// collaborating auth layer; this core ignores it. Failures surface as real
/// HTTP errors, never as an empty 200.
async fn stream_source(
    State(state): State<ServerState>,
    Path(reference): Path<String>,
) -> Response {
    let id = match resolve_reference(&reference) {
        Ok(id) => id,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid media reference").into_response(),
    };

    match state.pipeline.open(&id).await {
        Ok(stream) => {
            let content_type = stream.content_type();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, "no-store")
                .header(header::ACCEPT_RANGES, "none")
                .body(Body::from_stream(stream.into_byte_stream()))
                .unwrap()
        }
        Err(e @ (PipelineError::Timeout { .. } | PipelineError::Empty { .. })) => {
            error!("Streaming {} produced no output: {}", id, e);
            (StatusCode::BAD_GATEWAY, "stream produced no output").into_response()
        }
        Err(e) => {
            error!("Streaming {} failed: {}", id, e);
            (StatusCode::BAD_GATEWAY, "stream unavailable").into_response()
        }
    }
}

/// Build the shared state from the resolved application config.
pub fn build_state(config: &AppConfig, backend: AnalysisBackend) -> ServerState {
    let acquirer = Acquirer::new(AcquireSettings {
        retrieval_tool: config.retrieval_tool.clone(),
        work_dir: config.work_dir.clone(),
        budget: config.acquire_timeout,
        probe_budget: config.probe_timeout,
        max_bytes: config.max_download_bytes,
        max_duration_secs: config.max_source_duration_sec,
    });

    let pipeline = TranscodePipeline::new(PipelineSettings {
        retrieval_tool: config.retrieval_tool.clone(),
        transcode_tool: config.transcode_tool.clone(),
        first_chunk_timeout: config.first_chunk_timeout,
    });

    ServerState {
        config: ServerConfig {
            port: config.port,
            requests_logging_level: config.logging_level.clone(),
            frontend_dir_path: config.frontend_dir_path.clone(),
        },
        start_time: Instant::now(),
        cache: Arc::new(AnalysisCache::new(config.cache_max_entries)),
        acquirer: Arc::new(acquirer),
        pipeline: Arc::new(pipeline),
        backend,
        analysis_slots: Arc::new(tokio::sync::Semaphore::new(config.analysis_workers)),
        max_waveform_bytes: config.max_waveform_bytes,
    }
}

pub fn make_app(state: ServerState) -> Router {
    let mut app = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/audio_analysis", get(audio_analysis))
        .route("/stream/{reference}", get(stream_source))
        .with_state(state.clone());

    if let Some(frontend_path) = &state.config.frontend_dir_path {
        let static_files_service =
            ServeDir::new(frontend_path).append_index_html_on_directories(true);
        app = app.fallback_service(static_files_service);
    }

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(config: AppConfig, backend: AnalysisBackend) -> Result<()> {
    let port = config.port;
    let state = build_state(&config, backend);
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Ready to serve at port {}!", port);

    Ok(axum::serve(listener, app).await?)
}
