//! Audio feature extraction: real spectral analysis and its synthetic
//! fallback, plus the timeline data model they share.

pub mod analyzer;
pub mod fallback;
mod mel;
mod tempo;
pub mod timeline;

pub use analyzer::{analyze_samples, analyze_wav_file, AnalysisError};
pub use fallback::{synthetic_timeline, DEFAULT_DURATION_SECS};
pub use timeline::FeatureTimeline;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

/// Capability descriptor for the real analysis path, resolved once at
/// startup and injected into the request handlers. Analysis itself is
/// in-process, but it is useless without the external retrieval tool that
/// produces decodable audio.
#[derive(Debug, Clone)]
pub enum AnalysisBackend {
    Available,
    Unavailable(String),
}

impl AnalysisBackend {
    /// Probe the retrieval tool (`<tool> --version`) under a short timeout.
    pub async fn detect(retrieval_tool: &Path) -> AnalysisBackend {
        let probe = Command::new(retrieval_tool)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(Duration::from_secs(10), probe).await {
            Ok(Ok(status)) if status.success() => AnalysisBackend::Available,
            Ok(Ok(status)) => {
                warn!("Retrieval tool probe exited with {}", status);
                AnalysisBackend::Unavailable(format!("retrieval tool exited with {}", status))
            }
            Ok(Err(e)) => {
                warn!(
                    "Retrieval tool {} not runnable: {}",
                    retrieval_tool.display(),
                    e
                );
                AnalysisBackend::Unavailable(format!("retrieval tool not runnable: {}", e))
            }
            Err(_) => {
                warn!("Retrieval tool probe timed out");
                AnalysisBackend::Unavailable("retrieval tool probe timed out".to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AnalysisBackend::Available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let backend = AnalysisBackend::detect(Path::new("/nonexistent/tool-xyz")).await;
        assert!(!backend.is_available());
    }

    #[tokio::test]
    async fn working_tool_is_available() {
        // `true` ignores --version and exits 0.
        let backend = AnalysisBackend::detect(Path::new("/bin/true")).await;
        assert!(backend.is_available());
    }
}
