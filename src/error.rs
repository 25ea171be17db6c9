use axum::http::StatusCode;
use thiserror::Error;

/// Failures that are not the user's query being wrong.
///
/// Guard rejections and engine errors are outcomes, not errors; they travel
/// through [`crate::gateway::SandboxOutcome`]. Anything here is either a
/// misconfiguration, an unusable request, or the sandbox being unavailable.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("config: {message}")]
    Config { message: String },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("privilege: {message}")]
    Privilege { message: String },

    #[error("query: {message}")]
    Query { message: String },

    #[error("request: {message}")]
    InvalidRequest { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("solution: {message}")]
    Solution { message: String },

    #[error("format: {message}")]
    Format { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// HTTP status used when this error reaches the HTTP layer.
    pub fn status(&self) -> StatusCode {
        match self {
            SandboxError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SandboxError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            SandboxError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short caller-facing text. Never includes engine internals or secrets.
    pub fn public_message(&self) -> String {
        match self {
            SandboxError::Connection { .. } => "Sandbox database is unavailable".to_string(),
            SandboxError::InvalidRequest { message } | SandboxError::NotFound { message } => {
                message.clone()
            }
            SandboxError::Solution { .. } => "Stored solution could not be evaluated".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Classify a driver error that happened outside of statement execution.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => SandboxError::Connection {
                message: format!("{context}: timed out waiting for a sandbox connection"),
            },
            sqlx::Error::PoolClosed => SandboxError::Connection {
                message: format!("{context}: sandbox pool is closed"),
            },
            sqlx::Error::Io(e) => SandboxError::Connection {
                message: format!("{context}: {e}"),
            },
            sqlx::Error::Tls(e) => SandboxError::Connection {
                message: format!("{context}: tls: {e}"),
            },
            sqlx::Error::Configuration(e) => SandboxError::Config {
                message: format!("{context}: {e}"),
            },
            other => SandboxError::Query {
                message: format!("{context}: {other}"),
            },
        }
    }
}
