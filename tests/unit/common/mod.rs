//! Shared fixtures for tests that need a backend without a database.
#![allow(dead_code)]

use sqlsandbox::backend::{
    Backend, CellValue, ColumnMeta, ExecutionLimits, ExecutionOutcome, RawResult,
};
use sqlsandbox::error::SandboxError;
use sqlsandbox::translate::EngineError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply from the fake engine.
pub enum Reply {
    Outcome(ExecutionOutcome),
    Unavailable,
}

/// Backend that replays scripted outcomes in order and records what it ran.
///
/// When the script runs dry it answers with an empty result.
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<String>>,
    pub down: bool,
}

impl FakeBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Backend for FakeBackend {
    async fn execute(
        &self,
        sql: &str,
        _limits: ExecutionLimits,
    ) -> Result<ExecutionOutcome, SandboxError> {
        self.calls.lock().unwrap().push(sql.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Outcome(outcome)) => Ok(outcome),
            Some(Reply::Unavailable) => Err(SandboxError::Connection {
                message: "fake engine is down".to_string(),
            }),
            None => Ok(ExecutionOutcome::Success(RawResult::default())),
        }
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        if self.down {
            Err(SandboxError::Connection {
                message: "fake engine is down".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

pub fn column(name: &str, type_name: &str, type_id: u32) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_id,
        type_name: type_name.to_string(),
    }
}

/// A successful reply with INT4 columns and the given integer rows.
pub fn int_rows(names: &[&str], rows: &[&[i64]]) -> Reply {
    Reply::Outcome(ExecutionOutcome::Success(RawResult {
        columns: names.iter().map(|n| column(n, "INT4", 23)).collect(),
        rows: rows
            .iter()
            .map(|r| r.iter().map(|v| CellValue::Integer(*v)).collect())
            .collect(),
        elapsed_ms: 3,
    }))
}

pub fn engine_failure(code: &str, message: &str) -> Reply {
    Reply::Outcome(ExecutionOutcome::Failure(EngineError::new(code, message)))
}

pub fn limits(max_rows: usize) -> ExecutionLimits {
    ExecutionLimits::new(max_rows, 5000).unwrap()
}
