//! Vizbeat Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod acquire;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod server;
pub mod source;
pub mod transcode;

// Re-export commonly used types for convenience
pub use analysis::{AnalysisBackend, FeatureTimeline};
pub use cache::AnalysisCache;
pub use config::{AppConfig, CliConfig};
pub use server::{build_state, make_app, run_server, RequestsLoggingLevel};
pub use source::{resolve_reference, SourceId};
