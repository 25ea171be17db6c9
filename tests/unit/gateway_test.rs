mod common;

use common::{FakeBackend, Reply, engine_failure, int_rows, limits};
use sqlsandbox::backend::ExecutionOutcome;
use sqlsandbox::error::SandboxError;
use sqlsandbox::gateway::{QueryRequest, SandboxGateway, SandboxOutcome};
use sqlsandbox::guard::ForbiddenReason;
use sqlsandbox::translate::ErrorCategory;

#[tokio::test]
async fn test_success_is_normalized() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![int_rows(&["a"], &[&[1]])]),
        limits(1000),
    );
    let outcome = gateway.run(&QueryRequest::new("SELECT 1 AS a")).await.unwrap();
    let SandboxOutcome::Success(rows) = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(rows.row_count, 1);
    assert_eq!(rows.columns[0].name, "a");
    assert_eq!(rows.execution_time_ms, 3);
    assert!(!rows.truncated);
}

#[tokio::test]
async fn test_rejected_statement_never_reaches_backend() {
    let gateway = SandboxGateway::new(FakeBackend::default(), limits(1000));
    let outcome = gateway
        .run(&QueryRequest::new("SELECT 1; DROP TABLE users"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SandboxOutcome::Rejected(ForbiddenReason::ContainsMultiStatementMarker)
    );
    assert!(gateway.backend().calls().is_empty());
}

#[tokio::test]
async fn test_delete_rejected_as_not_select() {
    let gateway = SandboxGateway::new(FakeBackend::default(), limits(1000));
    let outcome = gateway
        .run(&QueryRequest::new("DELETE FROM users"))
        .await
        .unwrap();
    assert_eq!(outcome, SandboxOutcome::Rejected(ForbiddenReason::NotASelect));
    assert!(gateway.backend().calls().is_empty());
}

#[tokio::test]
async fn test_backend_receives_original_text() {
    let gateway = SandboxGateway::new(FakeBackend::default(), limits(1000));
    gateway
        .run(&QueryRequest::new("SELECT * FROM employees").with_context("a-1"))
        .await
        .unwrap();
    assert_eq!(gateway.backend().calls(), vec!["SELECT * FROM employees"]);
}

#[tokio::test]
async fn test_truncated_when_backend_hits_cap() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![int_rows(&["n"], &[&[1], &[2], &[3]])]),
        limits(3),
    );
    let outcome = gateway
        .run(&QueryRequest::new("SELECT n FROM big"))
        .await
        .unwrap();
    let SandboxOutcome::Success(rows) = outcome else {
        panic!("expected success");
    };
    assert!(rows.truncated);
    assert_eq!(rows.row_count, 3);
}

#[tokio::test]
async fn test_engine_failure_is_an_outcome() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![engine_failure(
            "42P01",
            "relation \"nonexistent_table\" does not exist",
        )]),
        limits(1000),
    );
    let outcome = gateway
        .run(&QueryRequest::new("SELECT * FROM nonexistent_table"))
        .await
        .unwrap();
    let SandboxOutcome::Failed(err) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(err.category(), ErrorCategory::UndefinedTable);
}

#[tokio::test]
async fn test_timeout_becomes_timeout_failure() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![Reply::Outcome(ExecutionOutcome::TimedOut {
            limit_ms: 5000,
        })]),
        limits(1000),
    );
    let outcome = gateway
        .run(&QueryRequest::new("SELECT pg_sleep(10)"))
        .await
        .unwrap();
    let SandboxOutcome::Failed(err) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(err.code, "57014");
    assert_eq!(err.category(), ErrorCategory::Timeout);
}

#[tokio::test]
async fn test_unavailable_backend_is_an_error() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![Reply::Unavailable]),
        limits(1000),
    );
    let err = gateway
        .run(&QueryRequest::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Connection { .. }));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let gateway = SandboxGateway::new(
        FakeBackend::new(vec![int_rows(&["a"], &[&[1]]), int_rows(&["a"], &[&[1]])]),
        limits(1000),
    );
    let request = QueryRequest::new("SELECT 1 AS a");
    let first = gateway.run(&request).await.unwrap();
    let second = gateway.run(&request).await.unwrap();
    assert_eq!(first, second);
}
