//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port, wired to stub
//! external tools in its own temp directory. Dropping the handle shuts the
//! server down and cleans the temp resources up.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use vizbeat_server::analysis::AnalysisBackend;
use vizbeat_server::config::{AppConfig, CliConfig};
use vizbeat_server::server::{build_state, make_app, RequestsLoggingLevel};

const SERVER_READY_TIMEOUT_MS: u64 = 5000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub struct TestServerOptions {
    pub retrieval_tool: PathBuf,
    pub transcode_tool: PathBuf,
    pub backend: AnalysisBackend,
    pub first_chunk_timeout: Duration,
}

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    // Private fields - keep resources alive until drop
    _work_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port.
    pub async fn spawn(options: TestServerOptions) -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");

        let cli = CliConfig {
            work_dir: Some(work_dir.path().to_path_buf()),
            retrieval_tool: Some(options.retrieval_tool),
            transcode_tool: Some(options.transcode_tool),
            logging_level: RequestsLoggingLevel::None,
            first_chunk_timeout_sec: options.first_chunk_timeout.as_secs().max(1),
            acquire_timeout_sec: 10,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");

        let state = build_state(&config, options.backend);
        let app = make_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            _work_dir: work_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;
        server
    }

    /// Waits for the server to become ready by polling the home endpoint.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(250))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
