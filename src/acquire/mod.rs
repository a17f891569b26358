//! Waveform acquisition via the external retrieval tool.
//!
//! Obtains a local, decoded, mono 22050 Hz WAV file for a source id by
//! invoking the retrieval-and-decode utility as a child process, under a
//! declared-duration ceiling, a size cap and a wall-clock timeout. The
//! returned handle owns the scratch directory; everything is deleted when
//! the handle goes out of scope, on success and failure alike.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::source::SourceId;

/// Sample rate requested from the retrieval tool. The analyzer never
/// resamples; this is fixed at invocation time.
pub const TARGET_SAMPLE_RATE: u32 = 22050;

const STDERR_EXCERPT_CHARS: usize = 2048;

/// Errors from the acquisition stage.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("declared duration {declared:.0}s exceeds the {limit}s ceiling")]
    TooLong { declared: f64, limit: u64 },

    #[error("acquisition timed out after {0:?}")]
    Timeout(Duration),

    #[error("retrieval tool failed: {0}")]
    Failed(String),

    #[error("acquired file is {size} bytes, over the {limit} byte cap")]
    TooLarge { size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for the acquisition stage, resolved from the application config.
#[derive(Debug, Clone)]
pub struct AcquireSettings {
    /// Path to the retrieval-and-decode utility.
    pub retrieval_tool: PathBuf,
    /// Directory under which per-request scratch directories are created.
    pub work_dir: PathBuf,
    /// Wall-clock budget for the download-and-decode child process.
    pub budget: Duration,
    /// Budget for the metadata-only duration probe.
    pub probe_budget: Duration,
    /// Maximum size of the decoded output file.
    pub max_bytes: u64,
    /// Maximum declared source duration in seconds.
    pub max_duration_secs: u64,
}

/// Owns the acquired waveform file. The scratch directory (and the file in
/// it) is deleted when this is dropped.
pub struct WaveformHandle {
    path: PathBuf,
    size: u64,
    _dir: TempDir,
}

impl WaveformHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

pub struct Acquirer {
    settings: AcquireSettings,
}

impl Acquirer {
    pub fn new(settings: AcquireSettings) -> Acquirer {
        Acquirer { settings }
    }

    /// Fetch the decoded waveform for `id`.
    ///
    /// A metadata-only probe rejects over-long sources before any audio is
    /// transferred; the download child then enforces the same limits itself
    /// via tool flags, and the output size is re-validated afterwards.
    pub async fn acquire(&self, id: &SourceId) -> Result<WaveformHandle, AcquireError> {
        let url = source_url(id);

        if let Some(declared) = self.probe_duration(&url).await {
            if declared > self.settings.max_duration_secs as f64 {
                return Err(AcquireError::TooLong {
                    declared,
                    limit: self.settings.max_duration_secs,
                });
            }
        }

        let request_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("acquire-{}-", request_id))
            .tempdir_in(&self.settings.work_dir)?;
        let output_template = dir.path().join("audio.%(ext)s");

        debug!("Acquiring {} into {}", id, dir.path().display());

        let child = Command::new(&self.settings.retrieval_tool)
            .arg("--extract-audio")
            .args(["--audio-format", "wav"])
            .args(["--postprocessor-args", "ffmpeg:-ar 22050 -ac 1"])
            .arg("--match-filter")
            .arg(format!("duration < {}", self.settings.max_duration_secs))
            .arg("--max-filesize")
            .arg(self.settings.max_bytes.to_string())
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg("-o")
            .arg(&output_template)
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AcquireError::Failed(format!("failed to spawn retrieval tool: {}", e)))?;

        // On expiry the future (and the child with it) is dropped, which
        // kills the process thanks to kill_on_drop.
        let output = match timeout(self.settings.budget, child.wait_with_output()).await {
            Err(_) => {
                warn!("Acquisition of {} timed out", id);
                return Err(AcquireError::Timeout(self.settings.budget));
            }
            Ok(result) => result?,
        };

        if !output.status.success() {
            return Err(AcquireError::Failed(excerpt(&output.stderr)));
        }

        let path = find_audio_file(dir.path())?;
        let size = std::fs::metadata(&path)?.len();
        if size > self.settings.max_bytes {
            return Err(AcquireError::TooLarge {
                size,
                limit: self.settings.max_bytes,
            });
        }

        Ok(WaveformHandle {
            path,
            size,
            _dir: dir,
        })
    }

    /// Ask the retrieval tool for the declared duration without downloading.
    /// Returns `None` when the probe fails or reports nothing parseable; the
    /// download child still enforces the duration filter itself.
    async fn probe_duration(&self, url: &str) -> Option<f64> {
        let probe = Command::new(&self.settings.retrieval_tool)
            .args(["--print", "duration"])
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match timeout(self.settings.probe_budget, probe).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().parse().ok()
            }
            Ok(_) => None,
            Err(_) => {
                debug!("Duration probe timed out for {}", url);
                None
            }
        }
    }
}

fn source_url(id: &SourceId) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// The retrieval tool normally produces `audio.wav`; fall back to any
/// `audio.*` file it left behind.
fn find_audio_file(dir: &Path) -> Result<PathBuf, AcquireError> {
    let wav = dir.join("audio.wav");
    if wav.exists() {
        return Ok(wav);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with("audio.")
        {
            return Ok(entry.path());
        }
    }
    Err(AcquireError::Failed("no audio file produced".to_string()))
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "(no error output)".to_string();
    }
    text.chars().take(STDERR_EXCERPT_CHARS).collect()
}
