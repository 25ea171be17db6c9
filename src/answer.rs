//! Answer checking against stored reference solutions.
//!
//! The user's query and the reference solution both go through the same
//! [`SandboxGateway`], so a solution is held to the same limits as the
//! student's attempt.

use crate::backend::{Backend, ExecutionLimits};
use crate::error::SandboxError;
use crate::gateway::{QueryRequest, SandboxGateway, SandboxOutcome};
use crate::guard::ForbiddenReason;
use crate::normalize::RowSet;
use crate::translate::EngineError;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{error, info};

/// Source of canonical solutions, keyed by assignment id.
pub trait SolutionStore {
    fn solution(
        &self,
        context_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, SandboxError>> + Send;
}

/// Solutions held in memory, usually loaded from the `[solutions]` table
/// of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticSolutions {
    solutions: HashMap<String, String>,
}

impl StaticSolutions {
    pub fn new(solutions: HashMap<String, String>) -> Self {
        Self { solutions }
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

impl SolutionStore for StaticSolutions {
    async fn solution(&self, context_id: &str) -> Result<Option<String>, SandboxError> {
        Ok(self.solutions.get(context_id).cloned())
    }
}

/// Where two result sets first disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    ColumnCount { expected: usize, actual: usize },
    RowCount { expected: usize, actual: usize },
    /// First differing row, by position after any reordering.
    Row { index: usize },
    /// The attempt returned more rows than the cap, so it cannot match.
    TooManyRows { max_rows: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerVerdict {
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<Mismatch>,
}

/// Result of checking an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Checked { verdict: AnswerVerdict, result: RowSet },
    Rejected(ForbiddenReason),
    Failed(EngineError),
}

static ORDER_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\border\s+by\b").unwrap_or_else(|e| panic!("invalid ORDER BY pattern: {e}"))
});

/// Whether row order is part of the expected answer.
pub fn solution_is_ordered(solution: &str) -> bool {
    ORDER_BY.is_match(solution)
}

/// Compare an attempt with the expected rows.
///
/// Columns are matched by position and names are ignored, so aliases do
/// not matter. Row order only counts when `ordered` is set.
pub fn compare(expected: &RowSet, actual: &RowSet, ordered: bool) -> AnswerVerdict {
    let mismatch = if expected.columns.len() != actual.columns.len() {
        Some(Mismatch::ColumnCount {
            expected: expected.columns.len(),
            actual: actual.columns.len(),
        })
    } else if expected.rows.len() != actual.rows.len() {
        Some(Mismatch::RowCount {
            expected: expected.rows.len(),
            actual: actual.rows.len(),
        })
    } else {
        let mut want = row_keys(expected);
        let mut got = row_keys(actual);
        if !ordered {
            want.sort();
            got.sort();
        }
        want.iter()
            .zip(got.iter())
            .position(|(w, g)| w != g)
            .map(|index| Mismatch::Row { index })
    };

    AnswerVerdict {
        correct: mismatch.is_none(),
        mismatch,
    }
}

/// Canonical per-row keys: the JSON rendering of each row.
fn row_keys(rows: &RowSet) -> Vec<String> {
    rows.rows
        .iter()
        .map(|row| {
            let values: Vec<serde_json::Value> = row.iter().map(|c| c.to_json()).collect();
            serde_json::Value::Array(values).to_string()
        })
        .collect()
}

/// Run an attempt and its reference solution, then compare them.
pub async fn check_answer<B, S>(
    gateway: &SandboxGateway<B>,
    store: &S,
    request: &QueryRequest,
) -> Result<AnswerOutcome, SandboxError>
where
    B: Backend,
    S: SolutionStore,
{
    let context_id = request
        .context_id
        .as_deref()
        .ok_or_else(|| SandboxError::InvalidRequest {
            message: "contextId is required to check an answer".to_string(),
        })?;

    let solution = store
        .solution(context_id)
        .await?
        .ok_or_else(|| SandboxError::NotFound {
            message: format!("no solution stored for assignment '{context_id}'"),
        })?;

    // Both sides fetch one row past the cap. A set that still reaches it is
    // larger than the cap and cannot be compared row by row.
    let limits = gateway.limits();
    let lookahead = ExecutionLimits {
        max_rows: limits.max_rows.saturating_add(1),
        ..limits
    };

    let actual = match gateway.run_limited(request, lookahead).await? {
        SandboxOutcome::Success(rows) => rows,
        SandboxOutcome::Rejected(reason) => return Ok(AnswerOutcome::Rejected(reason)),
        SandboxOutcome::Failed(err) => return Ok(AnswerOutcome::Failed(err)),
    };

    let expected = match gateway.run_text(&solution, lookahead).await? {
        SandboxOutcome::Success(rows) if rows.truncated => {
            error!(context_id, max_rows = limits.max_rows, "stored solution exceeds the row cap");
            return Err(SandboxError::Solution {
                message: format!(
                    "solution for '{context_id}' returns more than {} rows",
                    limits.max_rows
                ),
            });
        }
        SandboxOutcome::Success(rows) => rows,
        SandboxOutcome::Rejected(reason) => {
            error!(context_id, reason = reason.code(), "stored solution rejected by guard");
            return Err(SandboxError::Solution {
                message: format!("solution for '{context_id}' was rejected: {reason}"),
            });
        }
        SandboxOutcome::Failed(err) => {
            error!(context_id, code = %err.code, raw = %err.raw_message, "stored solution failed");
            return Err(SandboxError::Solution {
                message: format!("solution for '{context_id}' failed: {}", err.engine_message),
            });
        }
    };

    let verdict = if actual.truncated {
        AnswerVerdict {
            correct: false,
            mismatch: Some(Mismatch::TooManyRows {
                max_rows: limits.max_rows,
            }),
        }
    } else {
        compare(&expected, &actual, solution_is_ordered(&solution))
    };
    info!(context_id, correct = verdict.correct, "answer checked");

    Ok(AnswerOutcome::Checked {
        verdict,
        result: actual.capped(limits.max_rows),
    })
}
