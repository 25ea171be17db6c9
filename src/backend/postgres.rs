use crate::backend::{
    Backend, CellValue, ColumnMeta, ExecutionLimits, ExecutionOutcome, RawResult, bound_query,
    bound_query_as_text,
};
use crate::error::SandboxError;
use crate::pool::ReadOnlyPool;
use crate::translate::{EngineError, QUERY_CANCELED};
use crate::verbose::Timer;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgColumn, PgDatabaseError, PgRow};
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, Executor, Row, Statement, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

/// Slack given to the server-side timeout before the client gives up too.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_millis(1000);

/// Bounded executor over the read-only PostgreSQL pool.
pub struct PgBackend {
    pool: ReadOnlyPool,
}

impl PgBackend {
    pub fn new(pool: ReadOnlyPool) -> Self {
        Self { pool }
    }

    async fn run_bounded(
        &self,
        sql: &str,
        limits: ExecutionLimits,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let bounded = bound_query(sql, limits.max_rows);
        let timer = Timer::start();

        // Dropping the transaction on any exit path rolls it back and
        // returns the connection to the pool.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| SandboxError::from_sqlx("start read-only transaction", e))?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", limits.timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| SandboxError::from_sqlx("set statement timeout", e))?;

        let statement = match (&mut *tx).prepare(bounded.as_str()).await {
            Ok(statement) => statement,
            Err(e) => return engine_outcome(e, limits),
        };
        let columns: Vec<ColumnMeta> = statement.columns().iter().map(column_meta).collect();

        // Columns without a native scalar are re-selected as text so the
        // driver never has to interpret their binary form.
        let as_text: Vec<bool> = columns
            .iter()
            .map(|c| !decodes_natively(&c.type_name))
            .collect();
        let fetched = if as_text.iter().any(|t| *t) {
            let projected = bound_query_as_text(sql, &as_text, limits.max_rows);
            sqlx::query(&projected).fetch_all(&mut *tx).await
        } else {
            statement.query().fetch_all(&mut *tx).await
        };
        let rows = match fetched {
            Ok(rows) => rows,
            Err(e) => return engine_outcome(e, limits),
        };

        let decoded = rows.iter().map(decode_row).collect::<Vec<_>>();
        let elapsed_ms = timer.elapsed_ms() as u64;

        if let Err(e) = tx.rollback().await {
            debug!(error = %e, "rollback of sandbox transaction failed");
        }

        Ok(ExecutionOutcome::Success(RawResult {
            columns,
            rows: decoded,
            elapsed_ms,
        }))
    }
}

impl Backend for PgBackend {
    async fn execute(
        &self,
        sql: &str,
        limits: ExecutionLimits,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let budget = Duration::from_millis(limits.timeout_ms) + CLIENT_TIMEOUT_GRACE;
        match tokio::time::timeout(budget, self.run_bounded(sql, limits)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    timeout_ms = limits.timeout_ms,
                    "client-side timeout fired before the server cancelled the statement"
                );
                Ok(ExecutionOutcome::TimedOut {
                    limit_ms: limits.timeout_ms,
                })
            }
        }
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        self.pool.ping().await
    }
}

/// Sort a driver error into an engine outcome or an infrastructure error.
fn engine_outcome(
    err: sqlx::Error,
    limits: ExecutionLimits,
) -> Result<ExecutionOutcome, SandboxError> {
    let sqlx::Error::Database(db) = err else {
        return Err(SandboxError::from_sqlx("execute sandbox statement", err));
    };

    let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
    if code == QUERY_CANCELED {
        return Ok(ExecutionOutcome::TimedOut {
            limit_ms: limits.timeout_ms,
        });
    }

    let message = db.message().to_string();
    let mut raw = message.clone();
    if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg.detail() {
            raw.push_str("\nDETAIL: ");
            raw.push_str(detail);
        }
        if let Some(hint) = pg.hint() {
            raw.push_str("\nHINT: ");
            raw.push_str(hint);
        }
    }

    Ok(ExecutionOutcome::Failure(EngineError::with_diagnostics(
        code, message, raw,
    )))
}

fn column_meta(col: &PgColumn) -> ColumnMeta {
    let info = col.type_info();
    ColumnMeta {
        name: col.name().to_string(),
        type_id: info.oid().map(|oid| oid.0).unwrap_or(0),
        type_name: info.name().to_string(),
    }
}

fn decode_row(row: &PgRow) -> Vec<CellValue> {
    (0..row.len()).map(|i| decode_cell(row, i)).collect()
}

/// Engine types with a dedicated decoder below. Everything else, NUMERIC
/// included, reaches [`decode_cell`] already cast to text.
fn decodes_natively(type_name: &str) -> bool {
    matches!(
        type_name,
        "BOOL"
            | "INT2"
            | "INT4"
            | "INT8"
            | "OID"
            | "FLOAT4"
            | "FLOAT8"
            | "TIMESTAMPTZ"
            | "TIMESTAMP"
            | "DATE"
            | "TIME"
            | "UUID"
            | "JSON"
            | "JSONB"
            | "TEXT"
            | "VARCHAR"
            | "BPCHAR"
            | "NAME"
    )
}

/// Decode one cell according to the column's engine type.
///
/// Decoding is always type-checked; a cell that fails becomes `Null`.
fn decode_cell(row: &PgRow, idx: usize) -> CellValue {
    let type_name = row.column(idx).type_info().name().to_string();
    let decoded = match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map(|v| v.map(CellValue::Boolean)),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| v.map(|n| CellValue::Integer(n.into()))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| v.map(|n| CellValue::Integer(n.into()))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map(|v| v.map(CellValue::Integer)),
        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(idx)
            .map(|v| v.map(|oid| CellValue::Integer(oid.0.into()))),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| v.map(|n| CellValue::Float(n.into()))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map(|v| v.map(CellValue::Float)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map(|v| v.map(CellValue::Timestamp)),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map(|v| v.map(|ts| CellValue::Timestamp(ts.and_utc()))),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx).map(|v| {
            v.map(|d| CellValue::Timestamp(d.and_time(NaiveTime::MIN).and_utc()))
        }),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .map(|v| v.map(|t| CellValue::Text(t.to_string()))),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)
            .map(|v| v.map(|u| CellValue::Text(u.to_string()))),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(idx)
            .map(|v| v.map(|j| CellValue::Text(j.to_string()))),
        // TEXT and friends, plus columns already cast with `::text`.
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map(CellValue::Text)),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => CellValue::Null,
        Err(e) => {
            debug!(column = idx, type_name = %type_name, error = %e, "cell decode failed");
            CellValue::Null
        }
    }
}
