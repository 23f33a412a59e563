//! Error types for nova-servertester

use thiserror::Error;

/// Main error type for nova-servertester operations
#[derive(Error, Debug)]
pub enum TesterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {reference}")]
    NotFound { kind: String, reference: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Server {server_id} reported error (exit code: {})", .exit_code.as_deref().unwrap_or("unknown"))]
    RemoteReported {
        server_id: String,
        exit_code: Option<String>,
    },

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Template error: {0}")]
    Template(String),
}

impl TesterError {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            reference: reference.into(),
        }
    }

    /// Create an error for a server that reported a failed test run
    pub fn remote_reported(server_id: impl Into<String>, exit_code: Option<String>) -> Self {
        Self::RemoteReported {
            server_id: server_id.into(),
            exit_code,
        }
    }

    /// Whether this error came from an interrupt signal
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}
