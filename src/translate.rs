//! Engine error translation.
//!
//! [`EngineError`] is the internal record of a failed statement and is
//! safe to log. [`PublicError`] is the only thing that crosses to callers.

use axum::http::StatusCode;
use serde::Serialize;

/// SQLSTATE `query_canceled`, raised when `statement_timeout` fires.
pub const QUERY_CANCELED: &str = "57014";
pub const SYNTAX_ERROR: &str = "42601";
pub const UNDEFINED_TABLE: &str = "42P01";
pub const UNDEFINED_COLUMN: &str = "42703";
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE `read_only_sql_transaction`.
pub const READ_ONLY_TRANSACTION: &str = "25006";

/// A failed execution as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Engine-native code (SQLSTATE).
    pub code: String,
    /// The engine's primary message line.
    pub engine_message: String,
    /// Full diagnostic including detail and hint. Logs only.
    pub raw_message: String,
    pub user_message: String,
}

impl EngineError {
    pub fn new(code: impl Into<String>, engine_message: impl Into<String>) -> Self {
        let engine_message = engine_message.into();
        Self::with_diagnostics(code, engine_message.clone(), engine_message)
    }

    pub fn with_diagnostics(
        code: impl Into<String>,
        engine_message: impl Into<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let engine_message = engine_message.into();
        let user_message = ErrorCategory::from_code(&code)
            .user_message()
            .map(str::to_string)
            .unwrap_or_else(|| engine_message.clone());
        Self {
            code,
            engine_message,
            raw_message: raw_message.into(),
            user_message,
        }
    }

    /// The error reported when the client-side guard gives up on a statement.
    pub fn timed_out(limit_ms: u64) -> Self {
        Self::new(
            QUERY_CANCELED,
            format!("query exceeded the {limit_ms} ms time limit"),
        )
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(&self.code)
    }
}

/// User-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Syntax,
    UndefinedTable,
    UndefinedColumn,
    PermissionDenied,
    Other,
}

impl ErrorCategory {
    pub fn from_code(code: &str) -> Self {
        match code {
            QUERY_CANCELED => ErrorCategory::Timeout,
            SYNTAX_ERROR => ErrorCategory::Syntax,
            UNDEFINED_TABLE => ErrorCategory::UndefinedTable,
            UNDEFINED_COLUMN => ErrorCategory::UndefinedColumn,
            INSUFFICIENT_PRIVILEGE | READ_ONLY_TRANSACTION => ErrorCategory::PermissionDenied,
            _ => ErrorCategory::Other,
        }
    }

    /// Fixed message for mapped categories; `None` means pass the engine
    /// message through.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            ErrorCategory::Timeout => {
                Some("Query took too long to execute. Please optimize your query.")
            }
            ErrorCategory::Syntax => Some("There is a syntax error in your SQL query."),
            ErrorCategory::UndefinedTable => Some("Table does not exist. Check the table name."),
            ErrorCategory::UndefinedColumn => Some("Column does not exist. Check column names."),
            ErrorCategory::PermissionDenied => {
                Some("Permission denied. Only read-only queries are allowed.")
            }
            ErrorCategory::Other => None,
        }
    }
}

/// The caller-visible projection of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicError {
    pub status: StatusCode,
    pub category: ErrorCategory,
    pub code: String,
    pub error: String,
    pub user_message: String,
}

/// Map an engine error onto its public form.
///
/// Permission errors should be impossible under the read-only role; seeing
/// one means a statement got past the guard and was stopped by the
/// database, so it is logged as an alarm.
pub fn translate(err: &EngineError) -> PublicError {
    let category = err.category();
    if category == ErrorCategory::PermissionDenied {
        tracing::error!(
            code = %err.code,
            raw = %err.raw_message,
            "privilege separation alarm: sandbox statement hit a permission error"
        );
    }
    PublicError {
        status: StatusCode::BAD_REQUEST,
        category,
        code: err.code.clone(),
        error: err.engine_message.clone(),
        user_message: err.user_message.clone(),
    }
}
