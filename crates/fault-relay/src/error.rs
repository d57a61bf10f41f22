//! Error types for the reporting pipeline

use thiserror::Error;

/// Errors returned by a crash-reporting client
///
/// The reporter never propagates these; they are demoted to local
/// diagnostics so the pipeline cannot cause further failures.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Client was used before `init`
    #[error("Reporting client not initialized")]
    NotInitialized,

    /// Client rejected or failed to deliver the report
    #[error("Report delivery failed: {0}")]
    Delivery(String),

    /// Envelope could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Create a delivery error with a message
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}
