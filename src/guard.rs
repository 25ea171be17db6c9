//! Pattern-based statement guard.
//!
//! A fast pre-filter in front of the read-only database role. It is not a
//! grammar: anything that slips through still runs under a session that
//! cannot write. Comment markers are refused everywhere, including inside
//! string literals.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::LazyLock;

/// Why a statement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    NotASelect,
    ContainsMutatingKeyword,
    ContainsMultiStatementMarker,
    ContainsCommentInjection,
    ContainsPrivilegeKeyword,
}

impl ForbiddenReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ForbiddenReason::NotASelect => "not_a_select",
            ForbiddenReason::ContainsMutatingKeyword => "mutating_keyword",
            ForbiddenReason::ContainsMultiStatementMarker => "multi_statement",
            ForbiddenReason::ContainsCommentInjection => "comment_marker",
            ForbiddenReason::ContainsPrivilegeKeyword => "privilege_keyword",
        }
    }

    pub fn detail(&self) -> &'static str {
        match self {
            ForbiddenReason::NotASelect => "query must start with SELECT",
            ForbiddenReason::ContainsMutatingKeyword => "query would modify state",
            ForbiddenReason::ContainsMultiStatementMarker => {
                "query contains more than one statement"
            }
            ForbiddenReason::ContainsCommentInjection => "SQL comments are not allowed",
            ForbiddenReason::ContainsPrivilegeKeyword => "GRANT and REVOKE are not allowed",
        }
    }

    /// Caller-facing message, matching what the HTTP layer has always returned.
    pub fn public_message(&self) -> &'static str {
        match self {
            ForbiddenReason::NotASelect => "Only SELECT queries are allowed for security reasons.",
            _ => "Query contains forbidden operations. Only SELECT queries are allowed.",
        }
    }
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.detail())
    }
}

/// Outcome of checking a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Allowed,
    Rejected(ForbiddenReason),
}

impl GuardVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allowed)
    }
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid guard pattern {pattern:?}: {e}"))
}

/// Object kinds that DDL verbs are refused on.
const DDL_OBJECTS: &str = concat!(
    r"(?:table|view|materialized\s+view|schema|database|index|sequence",
    r"|function|procedure|trigger|role|user|extension)",
);

/// Optional modifiers between `create` and the object kind.
const CREATE_MODIFIERS: &str =
    r"(?:or\s+replace\s+)?(?:temp(?:orary)?\s+|unlogged\s+|unique\s+)?";

/// Statement keywords that may not follow a `;` inside one submission.
const STATEMENT_KEYWORDS: &[&str] = &[
    "select", "with", "insert", "update", "delete", "drop", "create", "alter", "truncate",
    "grant", "revoke", "copy", "merge", "set", "reset", "do", "call", "execute", "prepare",
    "deallocate", "begin", "start", "commit", "rollback", "savepoint", "release", "vacuum",
    "analyze", "lock", "listen", "notify", "comment", "refresh", "reindex", "cluster",
    "discard", "declare", "fetch", "move", "load", "security", "show", "explain", "values",
    "table", "import",
];

static MUTATING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        ci(&format!(r"\bdrop\s+{DDL_OBJECTS}\b")),
        ci(r"\btruncate\s+(?:table\b|\w)"),
        ci(r"\bdelete\s+from\b"),
        ci(r"\bupdate\s+.+?\s+set\b"),
        ci(r"\binsert\s+into\b"),
        ci(&format!(r"\bcreate\s+{CREATE_MODIFIERS}{DDL_OBJECTS}\b")),
        ci(&format!(r"\balter\s+{DDL_OBJECTS}\b")),
        ci(r"\bmerge\s+into\b"),
    ]
});

static PRIVILEGE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![ci(r"\bgrant\s"), ci(r"\brevoke\s")]);

static STATEMENT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    ci(&format!(r";\s*(?:{})\b", STATEMENT_KEYWORDS.join("|")))
});

static COMMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| ci(r"--|/\*"));

/// Check that `text` is a single read-only SELECT.
///
/// Checks run in a fixed order and the first failing one decides the
/// reason. The separator check comes first so a smuggled second statement
/// is reported as such, whatever that statement does.
pub fn check(text: &str) -> GuardVerdict {
    if !starts_with_select(text) {
        return GuardVerdict::Rejected(ForbiddenReason::NotASelect);
    }

    if STATEMENT_SEPARATOR.is_match(text) {
        return GuardVerdict::Rejected(ForbiddenReason::ContainsMultiStatementMarker);
    }

    if PRIVILEGE_PATTERNS.iter().any(|p| p.is_match(text)) {
        return GuardVerdict::Rejected(ForbiddenReason::ContainsPrivilegeKeyword);
    }

    if MUTATING_PATTERNS.iter().any(|p| p.is_match(text)) {
        return GuardVerdict::Rejected(ForbiddenReason::ContainsMutatingKeyword);
    }

    if COMMENT_MARKER.is_match(text) {
        return GuardVerdict::Rejected(ForbiddenReason::ContainsCommentInjection);
    }

    GuardVerdict::Allowed
}

fn starts_with_select(text: &str) -> bool {
    let body = strip_leading_trivia(text);
    let Some(head) = body.get(..6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("select") {
        return false;
    }
    // `SELECTED_ROWS` is an identifier, not the keyword.
    !body[6..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// Skip whitespace and comments ahead of the first token.
///
/// An unterminated block comment swallows the rest of the text.
pub fn strip_leading_trivia(text: &str) -> &str {
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(idx) => &after[idx + 1..],
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(idx) => &after[idx + 2..],
                None => "",
            };
        } else {
            return rest;
        }
    }
}
