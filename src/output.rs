use crate::answer::AnswerVerdict;
use crate::error::SandboxError;
use crate::guard::ForbiddenReason;
use crate::translate::PublicError;

/// Print a rendered result to stdout.
pub fn print_result(rendered: &str) {
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &SandboxError) {
    eprintln!("error: {}", err);
}

/// Print a guard rejection to stderr.
pub fn print_rejection(reason: ForbiddenReason) {
    eprintln!("{}", rejection_message(reason));
}

/// Print a translated engine failure to stderr.
pub fn print_engine_failure(err: &PublicError) {
    eprintln!("{}", engine_failure_message(err));
}

/// Print a truncation warning to stderr for interactive visibility.
pub fn print_truncation_warning(max_rows: usize) {
    eprintln!("warning: {}", truncation_message(max_rows));
}

pub fn rejection_message(reason: ForbiddenReason) -> String {
    format!("rejected: {} ({})", reason.public_message(), reason.detail())
}

pub fn engine_failure_message(err: &PublicError) -> String {
    if err.user_message == err.error {
        format!("query failed [{}]: {}", err.code, err.user_message)
    } else {
        format!(
            "query failed [{}]: {}\n  engine: {}",
            err.code, err.user_message, err.error
        )
    }
}

pub fn truncation_message(max_rows: usize) -> String {
    format!("result capped at {max_rows} rows; add a WHERE clause or LIMIT to narrow it")
}

pub fn verdict_message(verdict: &AnswerVerdict) -> String {
    if verdict.correct {
        return "correct: result matches the expected rows".to_string();
    }
    match &verdict.mismatch {
        Some(crate::answer::Mismatch::ColumnCount { expected, actual }) => {
            format!("incorrect: expected {expected} columns, got {actual}")
        }
        Some(crate::answer::Mismatch::RowCount { expected, actual }) => {
            format!("incorrect: expected {expected} rows, got {actual}")
        }
        Some(crate::answer::Mismatch::Row { index }) => {
            format!("incorrect: row {} differs from the expected result", index + 1)
        }
        Some(crate::answer::Mismatch::TooManyRows { max_rows }) => {
            format!("incorrect: more than {max_rows} rows returned")
        }
        None => "incorrect".to_string(),
    }
}
