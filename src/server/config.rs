use super::RequestsLoggingLevel;

/// Server-level settings carried into the request handlers.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub port: u16,
    pub requests_logging_level: RequestsLoggingLevel,
    /// Optional frontend directory to be statically served.
    pub frontend_dir_path: Option<String>,
}
