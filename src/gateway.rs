//! The single entry point into the sandbox.
//!
//! Sequences guard, executor and normalizer. Guard rejections and engine
//! failures come back as [`SandboxOutcome`]s; only infrastructure trouble
//! is an `Err`. Nothing is retried.

use crate::backend::{Backend, ExecutionLimits, ExecutionOutcome};
use crate::error::SandboxError;
use crate::guard::{self, ForbiddenReason, GuardVerdict};
use crate::normalize::{self, RowSet};
use crate::translate::EngineError;
use tracing::{Instrument, info, info_span, warn};

/// An untrusted statement plus the metadata that travels with it.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    /// Content record the query belongs to. Never interpolated into SQL.
    pub context_id: Option<String>,
    /// Identity attached by upstream authentication, for logs only.
    pub caller: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_caller(mut self, caller: Option<String>) -> Self {
        self.caller = caller;
        self
    }
}

/// Terminal result of one sandboxed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxOutcome {
    Success(RowSet),
    Rejected(ForbiddenReason),
    Failed(EngineError),
}

pub struct SandboxGateway<B> {
    backend: B,
    limits: ExecutionLimits,
}

impl<B: Backend> SandboxGateway<B> {
    pub fn new(backend: B, limits: ExecutionLimits) -> Self {
        Self { backend, limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Guard, execute and normalize one statement.
    pub async fn run(&self, request: &QueryRequest) -> Result<SandboxOutcome, SandboxError> {
        self.run_limited(request, self.limits).await
    }

    /// Like [`SandboxGateway::run`] but with explicit limits. Callers inside
    /// the crate use this to look one row past the configured cap.
    pub(crate) async fn run_limited(
        &self,
        request: &QueryRequest,
        limits: ExecutionLimits,
    ) -> Result<SandboxOutcome, SandboxError> {
        let span = info_span!(
            "sandbox_query",
            context_id = request.context_id.as_deref().unwrap_or("-"),
            caller = request.caller.as_deref().unwrap_or("-"),
        );
        self.run_text(&request.text, limits).instrument(span).await
    }

    pub(crate) async fn run_text(
        &self,
        text: &str,
        limits: ExecutionLimits,
    ) -> Result<SandboxOutcome, SandboxError> {
        if let GuardVerdict::Rejected(reason) = guard::check(text) {
            info!(reason = reason.code(), "query rejected by guard");
            return Ok(SandboxOutcome::Rejected(reason));
        }

        let outcome = self.backend.execute(text, limits).await.inspect_err(|e| {
            warn!(error = %e, "sandbox infrastructure failure");
        })?;

        match outcome {
            ExecutionOutcome::Success(raw) => {
                let elapsed_ms = raw.elapsed_ms;
                let rows = normalize::normalize(raw, elapsed_ms, limits.max_rows);
                info!(
                    rows = rows.row_count,
                    truncated = rows.truncated,
                    elapsed_ms,
                    "query complete"
                );
                Ok(SandboxOutcome::Success(rows))
            }
            ExecutionOutcome::Failure(err) => {
                info!(code = %err.code, raw = %err.raw_message, "query failed in engine");
                Ok(SandboxOutcome::Failed(err))
            }
            ExecutionOutcome::TimedOut { limit_ms } => {
                info!(limit_ms, "query timed out");
                Ok(SandboxOutcome::Failed(EngineError::timed_out(limit_ms)))
            }
        }
    }
}
