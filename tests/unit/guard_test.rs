use sqlsandbox::guard::{ForbiddenReason, GuardVerdict, check, strip_leading_trivia};

fn assert_allowed(sql: &str) {
    match check(sql) {
        GuardVerdict::Allowed => {}
        GuardVerdict::Rejected(reason) => {
            panic!("Expected Allowed for '{}', got Rejected({:?})", sql, reason);
        }
    }
}

fn assert_rejected(sql: &str, expected: ForbiddenReason) {
    match check(sql) {
        GuardVerdict::Allowed => panic!("Expected Rejected for '{}', got Allowed", sql),
        GuardVerdict::Rejected(reason) => assert_eq!(
            reason, expected,
            "Wrong reason for '{}': got {:?}, expected {:?}",
            sql, reason, expected
        ),
    }
}

// --- SELECT (allowed) ---

#[test]
fn test_select_literal_allowed() {
    assert_allowed("SELECT 1");
}

#[test]
fn test_select_with_where_allowed() {
    assert_allowed("SELECT name, salary FROM employees WHERE salary > 50000");
}

#[test]
fn test_lowercase_select_allowed() {
    assert_allowed("select * from employees");
}

#[test]
fn test_leading_whitespace_allowed() {
    assert_allowed("  \n\tSELECT id FROM orders");
}

#[test]
fn test_join_and_subquery_allowed() {
    assert_allowed(
        "SELECT e.name, d.name FROM employees e JOIN departments d ON e.dept_id = d.id \
         WHERE e.id IN (SELECT employee_id FROM awards)",
    );
}

#[test]
fn test_trailing_semicolon_allowed() {
    assert_allowed("SELECT 1;");
    assert_allowed("SELECT 1;   \n");
}

#[test]
fn test_identifiers_containing_keywords_allowed() {
    assert_allowed("SELECT updated_at, created_by, deleted FROM audit_log");
    assert_allowed("SELECT last_update FROM films");
}

#[test]
fn test_keyword_inside_string_literal_allowed() {
    assert_allowed("SELECT * FROM products WHERE name = 'drop zone'");
}

#[test]
fn test_multiline_select_allowed() {
    assert_allowed("SELECT\n  id,\n  name\nFROM\n  users\nORDER BY id");
}

#[test]
fn test_is_allowed_helper() {
    assert!(check("SELECT 1").is_allowed());
    assert!(!check("DELETE FROM users").is_allowed());
}

// --- Not a SELECT ---

#[test]
fn test_empty_rejected() {
    assert_rejected("", ForbiddenReason::NotASelect);
    assert_rejected("   \n ", ForbiddenReason::NotASelect);
}

#[test]
fn test_insert_rejected_as_not_select() {
    assert_rejected("INSERT INTO users VALUES (1)", ForbiddenReason::NotASelect);
}

#[test]
fn test_with_cte_rejected_as_not_select() {
    assert_rejected(
        "WITH t AS (SELECT 1) SELECT * FROM t",
        ForbiddenReason::NotASelect,
    );
}

#[test]
fn test_select_prefix_of_identifier_rejected() {
    assert_rejected("SELECTED_ROWS", ForbiddenReason::NotASelect);
}

#[test]
fn test_explain_rejected() {
    assert_rejected("EXPLAIN SELECT 1", ForbiddenReason::NotASelect);
}

#[test]
fn test_leading_comment_then_delete_rejected() {
    assert_rejected("-- hi\nDELETE FROM users", ForbiddenReason::NotASelect);
}

// --- Multi-statement ---

#[test]
fn test_select_then_drop_rejected_as_multi_statement() {
    assert_rejected(
        "SELECT 1; DROP TABLE users",
        ForbiddenReason::ContainsMultiStatementMarker,
    );
}

#[test]
fn test_select_then_select_rejected() {
    assert_rejected(
        "SELECT 1;SELECT 2",
        ForbiddenReason::ContainsMultiStatementMarker,
    );
}

#[test]
fn test_select_then_set_rejected() {
    assert_rejected(
        "SELECT 1; set statement_timeout = 0",
        ForbiddenReason::ContainsMultiStatementMarker,
    );
}

#[test]
fn test_separator_keyword_list_covers_first_and_last_entries() {
    for sql in ["SELECT 1; select 2", "SELECT 1;\n IMPORT FOREIGN SCHEMA s FROM SERVER x INTO y"] {
        assert_rejected(sql, ForbiddenReason::ContainsMultiStatementMarker);
    }
}

// --- Mutating keywords ---

#[test]
fn test_ddl_object_kinds_across_pattern_pieces_rejected() {
    for sql in [
        "SELECT 1 FROM t WHERE create unlogged table x",
        "SELECT 1 FROM t WHERE create or replace function f",
        "SELECT 1 FROM t WHERE drop materialized view v",
        "SELECT 1 FROM t WHERE alter extension e",
    ] {
        assert_rejected(sql, ForbiddenReason::ContainsMutatingKeyword);
    }
}

#[test]
fn test_embedded_delete_rejected() {
    assert_rejected(
        "SELECT * FROM users WHERE id IN (DELETE FROM users RETURNING id)",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_embedded_update_rejected() {
    assert_rejected(
        "SELECT 1 FROM (UPDATE users SET name = 'x' RETURNING 1) t",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_embedded_insert_rejected() {
    assert_rejected(
        "SELECT * FROM (INSERT INTO logs VALUES (1) RETURNING *) t",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_create_table_as_rejected() {
    assert_rejected(
        "SELECT 1 WHERE EXISTS (CREATE TABLE evil AS SELECT 1)",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_drop_in_select_rejected() {
    assert_rejected(
        "SELECT drop table users",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_truncate_rejected() {
    assert_rejected(
        "SELECT 1 FROM t WHERE truncate table t",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

#[test]
fn test_mixed_case_mutation_rejected() {
    assert_rejected(
        "SELECT * FROM (DeLeTe FrOm users) x",
        ForbiddenReason::ContainsMutatingKeyword,
    );
}

// --- Privilege keywords ---

#[test]
fn test_grant_rejected() {
    assert_rejected(
        "SELECT 1 WHERE grant all on users to public",
        ForbiddenReason::ContainsPrivilegeKeyword,
    );
}

#[test]
fn test_revoke_rejected() {
    assert_rejected(
        "SELECT 1 WHERE REVOKE select ON users FROM bob",
        ForbiddenReason::ContainsPrivilegeKeyword,
    );
}

// --- Comment markers ---

#[test]
fn test_trailing_line_comment_rejected() {
    assert_rejected(
        "SELECT * FROM users -- everything",
        ForbiddenReason::ContainsCommentInjection,
    );
}

#[test]
fn test_block_comment_rejected() {
    assert_rejected(
        "SELECT /* hidden */ 1",
        ForbiddenReason::ContainsCommentInjection,
    );
}

#[test]
fn test_comment_marker_in_string_literal_rejected() {
    assert_rejected(
        "SELECT '--' AS dashes",
        ForbiddenReason::ContainsCommentInjection,
    );
}

#[test]
fn test_leading_comment_before_select_rejected() {
    assert_rejected(
        "-- show users\nSELECT * FROM users",
        ForbiddenReason::ContainsCommentInjection,
    );
}

// --- Determinism and reason metadata ---

#[test]
fn test_check_is_deterministic() {
    for sql in [
        "SELECT 1",
        "SELECT 1; DROP TABLE x",
        "SELECT /* x */ 1",
        "DELETE FROM t",
    ] {
        assert_eq!(check(sql), check(sql), "verdict changed for '{}'", sql);
    }
}

#[test]
fn test_reason_codes_are_stable() {
    assert_eq!(ForbiddenReason::NotASelect.code(), "not_a_select");
    assert_eq!(ForbiddenReason::ContainsMutatingKeyword.code(), "mutating_keyword");
    assert_eq!(ForbiddenReason::ContainsMultiStatementMarker.code(), "multi_statement");
    assert_eq!(ForbiddenReason::ContainsCommentInjection.code(), "comment_marker");
    assert_eq!(ForbiddenReason::ContainsPrivilegeKeyword.code(), "privilege_keyword");
}

#[test]
fn test_public_messages() {
    assert_eq!(
        ForbiddenReason::NotASelect.public_message(),
        "Only SELECT queries are allowed for security reasons."
    );
    assert_eq!(
        ForbiddenReason::ContainsMutatingKeyword.public_message(),
        "Query contains forbidden operations. Only SELECT queries are allowed."
    );
}

// --- strip_leading_trivia ---

#[test]
fn test_strip_leading_trivia_skips_comments() {
    assert_eq!(
        strip_leading_trivia("  -- a\n /* b */ SELECT 1"),
        "SELECT 1"
    );
}

#[test]
fn test_strip_leading_trivia_unterminated_block() {
    assert_eq!(strip_leading_trivia("/* never closed SELECT 1"), "");
}
