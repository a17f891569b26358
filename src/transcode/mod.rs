//! Live transcode pipeline for the streaming path.
//!
//! Two child processes are wired back to back: the retrieval tool writes a
//! best-audio container stream to its stdout, which is handed directly to
//! the transcoder's stdin (the server never buffers the whole stream), and
//! the transcoder emits MP3 on its stdout. That final stdout is what the
//! HTTP layer reads as a body.
//!
//! The output codec is fixed, so the content type is known up front. The
//! first chunk is awaited under a timeout; a source that never produces
//! bytes (private, region-locked, bot-checked) tears down cleanly instead
//! of hanging or answering with an empty success.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::source::SourceId;

/// Content type of every stream this pipeline produces.
pub const STREAM_CONTENT_TYPE: &str = "audio/mpeg";

const READ_CHUNK_SIZE: usize = 16 * 1024;
const STDERR_EXCERPT_BYTES: usize = 2048;
const STDERR_READ_BUDGET: Duration = Duration::from_millis(500);

/// Errors from the streaming pipeline. Unlike the analysis path there is no
/// fallback content; these surface to the client as HTTP failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn pipeline stage: {0}")]
    Spawn(String),

    #[error("no output within {budget:?} (retrieval: {retrieval_stderr}; transcode: {transcode_stderr})")]
    Timeout {
        budget: Duration,
        retrieval_stderr: String,
        transcode_stderr: String,
    },

    #[error("pipeline produced no output (retrieval: {retrieval_stderr}; transcode: {transcode_stderr})")]
    Empty {
        retrieval_stderr: String,
        transcode_stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retrieval_tool: PathBuf,
    pub transcode_tool: PathBuf,
    /// Bound on time-to-first-byte from the final stage.
    pub first_chunk_timeout: Duration,
}

pub struct TranscodePipeline {
    settings: PipelineSettings,
}

/// Keeps both child processes alive for as long as the byte stream is being
/// consumed. Both stages die with this value on every exit path (normal
/// completion, error, client disconnect) via `kill_on_drop` plus an explicit
/// kill here.
struct StageGuard {
    retriever: Child,
    transcoder: Child,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let _ = self.transcoder.start_kill();
        let _ = self.retriever.start_kill();
    }
}

/// An open, flowing pipeline: the first chunk has already arrived.
///
/// Not restartable. Dropping it (or the stream made from it) terminates
/// both child processes.
pub struct AudioStream {
    first_chunk: Bytes,
    stdout: ChildStdout,
    guard: StageGuard,
}

impl AudioStream {
    pub fn content_type(&self) -> &'static str {
        STREAM_CONTENT_TYPE
    }

    /// Turn the open pipeline into a lazy chunk stream: the already-read
    /// first chunk, then the transcoder's stdout until end of stream. No
    /// further timeout applies once bytes are flowing; the source's own
    /// pacing governs reads.
    pub fn into_byte_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let AudioStream {
            first_chunk,
            stdout,
            guard,
        } = self;

        let rest = ReaderStream::with_capacity(stdout, READ_CHUNK_SIZE);
        futures::stream::once(async move { Ok(first_chunk) })
            .chain(rest)
            .map(move |item| {
                // The guard rides along with the stream; when the consumer
                // drops the body, both children are killed and reaped.
                let _ = &guard;
                item
            })
    }
}

impl TranscodePipeline {
    pub fn new(settings: PipelineSettings) -> TranscodePipeline {
        TranscodePipeline { settings }
    }

    /// Spawn both stages for `id` and wait (bounded) for the first chunk.
    pub async fn open(&self, id: &SourceId) -> Result<AudioStream, PipelineError> {
        let url = format!("https://www.youtube.com/watch?v={}", id);

        let mut retriever = Command::new(&self.settings.retrieval_tool)
            .args(["--format", "bestaudio/best"])
            .args(["-o", "-"])
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Spawn(format!("retrieval tool: {}", e)))?;

        let retriever_stdout = retriever
            .stdout
            .take()
            .expect("retriever stdout was requested piped");
        let retriever_stdout: Stdio = retriever_stdout
            .try_into()
            .map_err(PipelineError::Io)?;

        let transcoder = Command::new(&self.settings.transcode_tool)
            .args(["-i", "pipe:0"])
            .arg("-vn")
            .args(["-codec:a", "libmp3lame"])
            .args(["-b:a", "192k"])
            .args(["-f", "mp3"])
            .args(["-loglevel", "error"])
            .arg("pipe:1")
            .stdin(retriever_stdout)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut transcoder = match transcoder {
            Ok(child) => child,
            Err(e) => {
                let _ = retriever.start_kill();
                return Err(PipelineError::Spawn(format!("transcode tool: {}", e)));
            }
        };

        let mut stdout = transcoder
            .stdout
            .take()
            .expect("transcoder stdout was requested piped");

        let mut first = vec![0u8; READ_CHUNK_SIZE];
        let budget = self.settings.first_chunk_timeout;

        match timeout(budget, stdout.read(&mut first)).await {
            Err(_) => {
                warn!("Pipeline for {} produced no bytes within {:?}", id, budget);
                let (retrieval_stderr, transcode_stderr) =
                    teardown(retriever, transcoder).await;
                Err(PipelineError::Timeout {
                    budget,
                    retrieval_stderr,
                    transcode_stderr,
                })
            }
            Ok(Ok(0)) => {
                warn!("Pipeline for {} ended before producing any bytes", id);
                let (retrieval_stderr, transcode_stderr) =
                    teardown(retriever, transcoder).await;
                Err(PipelineError::Empty {
                    retrieval_stderr,
                    transcode_stderr,
                })
            }
            Ok(Err(e)) => {
                let _ = teardown(retriever, transcoder).await;
                Err(PipelineError::Io(e))
            }
            Ok(Ok(n)) => {
                debug!("Pipeline for {} flowing, first chunk {} bytes", id, n);
                first.truncate(n);
                Ok(AudioStream {
                    first_chunk: Bytes::from(first),
                    stdout,
                    guard: StageGuard {
                        retriever,
                        transcoder,
                    },
                })
            }
        }
    }
}

/// Kill both stages, then collect a bounded excerpt of each stage's stderr.
/// Reads are individually time-boxed so a stalled child cannot block
/// diagnostics, and each child is reaped afterwards.
async fn teardown(mut retriever: Child, mut transcoder: Child) -> (String, String) {
    let _ = transcoder.start_kill();
    let _ = retriever.start_kill();

    let retrieval_stderr = stderr_excerpt(&mut retriever).await;
    let transcode_stderr = stderr_excerpt(&mut transcoder).await;

    let _ = timeout(STDERR_READ_BUDGET, retriever.wait()).await;
    let _ = timeout(STDERR_READ_BUDGET, transcoder.wait()).await;

    (retrieval_stderr, transcode_stderr)
}

async fn stderr_excerpt(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return "(no error output)".to_string();
    };

    let mut collected = Vec::new();
    let mut buf = [0u8; 512];
    let _ = timeout(STDERR_READ_BUDGET, async {
        while collected.len() < STDERR_EXCERPT_BYTES {
            match stderr.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await;

    collected.truncate(STDERR_EXCERPT_BYTES);
    let text = String::from_utf8_lossy(&collected);
    let text = text.trim();
    if text.is_empty() {
        "(no error output)".to_string()
    } else {
        text.to_string()
    }
}
