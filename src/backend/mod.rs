pub mod postgres;

use crate::error::SandboxError;
use crate::translate::EngineError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Default cap on returned rows.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Default per-statement time budget in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Execution budget applied to every sandboxed statement.
///
/// Comes from configuration only. Request payloads never carry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_rows: usize,
    pub timeout_ms: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ExecutionLimits {
    pub fn new(max_rows: usize, timeout_ms: u64) -> Result<Self, SandboxError> {
        if max_rows == 0 {
            return Err(SandboxError::Config {
                message: "max rows must be at least 1".to_string(),
            });
        }
        if timeout_ms == 0 {
            return Err(SandboxError::Config {
                message: "query timeout must be at least 1ms".to_string(),
            });
        }
        Ok(Self {
            max_rows,
            timeout_ms,
        })
    }
}

/// Metadata for a single result column as the engine reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Engine type identifier (a PostgreSQL type OID).
    pub type_id: u32,
    pub type_name: String,
}

/// A single cell value from a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    /// JSON form used on the wire. Timestamps render as RFC 3339 with
    /// millisecond precision; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Boolean(b) => serde_json::Value::Bool(*b),
            CellValue::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Engine output before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<CellValue>>,
    pub elapsed_ms: u64,
}

/// What happened when a statement reached the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(RawResult),
    Failure(EngineError),
    TimedOut { limit_ms: u64 },
}

/// Trait for sandbox execution engines.
///
/// Implementations run statements that already passed the guard. They
/// report engine-side failures as [`ExecutionOutcome::Failure`] and keep
/// `Err` for the engine being unreachable.
pub trait Backend {
    fn execute(
        &self,
        sql: &str,
        limits: ExecutionLimits,
    ) -> impl std::future::Future<Output = Result<ExecutionOutcome, SandboxError>> + Send;

    /// Cheap liveness check for readiness reporting.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), SandboxError>> + Send;
}

/// Wrap a statement in a derived table so the row cap applies no matter
/// what the statement itself asks for.
///
/// Trailing whitespace and semicolons are dropped first; anything else
/// that does not fit inside parentheses surfaces as a syntax error. The
/// closing parenthesis goes on its own line so a trailing line comment
/// cannot swallow it.
pub fn bound_query(sql: &str, max_rows: usize) -> String {
    format!("SELECT * FROM ({}\n) AS bounded LIMIT {max_rows}", statement_body(sql))
}

/// Like [`bound_query`], but renders the columns flagged in `as_text` with
/// the engine's own text output.
///
/// Output columns are renamed positionally (`c1`, `c2`, ...) so repeated
/// or unnamed columns can still be addressed.
pub fn bound_query_as_text(sql: &str, as_text: &[bool], max_rows: usize) -> String {
    let names: Vec<String> = (1..=as_text.len()).map(|i| format!("c{i}")).collect();
    let projection = names
        .iter()
        .zip(as_text)
        .map(|(name, text)| if *text { format!("{name}::text") } else { name.clone() })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {projection} FROM ({}\n) AS bounded({}) LIMIT {max_rows}",
        statement_body(sql),
        names.join(", ")
    )
}

fn statement_body(sql: &str) -> &str {
    sql.trim_end()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
