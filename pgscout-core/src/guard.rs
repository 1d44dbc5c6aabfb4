//! Read-only safety guard for ad-hoc SQL.
//!
//! The guard splits a SQL batch into top-level statements and classifies
//! each by its leading keyword against a fixed mutating set. It is a
//! deliberate heuristic prefix classifier, not a SQL grammar: a mutating
//! operation nested inside a read-shaped wrapper (e.g. a writable CTE whose
//! outer keyword is `WITH`) evades detection. That blind spot is documented
//! and kept; attempting full parsing here is a non-goal.
//!
//! The split is quote-aware: statement terminators inside single/double
//! quotes, line comments, block comments (nested), and dollar-quoted
//! strings do not delimit statements.

use crate::error::{PgScoutError, Result};

/// Statement-leading keywords classified as mutating.
///
/// Extend this list rather than reaching for a parser; the guard's contract
/// is an explicit, auditable keyword set.
pub const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "ALTER", "DROP", "TRUNCATE", "GRANT",
    "REVOKE", "VACUUM", "ANALYZE", "COPY",
];

/// An ad-hoc SQL execution request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// SQL text; may contain multiple `;`-separated statements
    pub sql: String,
    /// Explicit opt-in to mutating statements
    pub allow_write: bool,
}

/// Outcome of classifying a SQL batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Every statement passed the prefix check (or writes were allowed)
    Allowed,
    /// A statement's leading keyword is in the mutating set
    Blocked {
        /// 1-based index of the offending statement within the batch
        statement: usize,
        /// Uppercased leading keyword that triggered the block
        keyword: String,
    },
}

impl SafetyVerdict {
    /// True if the batch may be sent to the client.
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }
}

/// Classifies a request against the mutating keyword set.
///
/// With `allow_write` set the verdict is `Allowed` unconditionally; the
/// guard exists to stop *accidental* writes, not intentional ones.
pub fn classify(request: &QueryRequest) -> SafetyVerdict {
    if request.allow_write {
        return SafetyVerdict::Allowed;
    }
    for (index, statement) in split_statements(&request.sql).iter().enumerate() {
        if let Some(keyword) = leading_keyword(statement)
            && MUTATING_KEYWORDS.contains(&keyword.as_str())
        {
            return SafetyVerdict::Blocked {
                statement: index + 1,
                keyword,
            };
        }
    }
    SafetyVerdict::Allowed
}

/// Classifies a request and converts a block into an error.
///
/// # Errors
/// Returns [`PgScoutError::SafetyBlocked`] naming the offending statement
/// index and keyword.
pub fn ensure_allowed(request: &QueryRequest) -> Result<()> {
    match classify(request) {
        SafetyVerdict::Allowed => Ok(()),
        SafetyVerdict::Blocked { statement, keyword } => {
            Err(PgScoutError::safety_blocked(statement, keyword))
        }
    }
}

/// Splits SQL text into trimmed, non-empty top-level statements.
///
/// Delimiters inside quoted strings, comments, and dollar-quoted bodies are
/// ignored. Unterminated constructs run to the end of the text.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        // A doubled quote escapes itself inside the literal.
                        if i + 1 < len && bytes[i + 1] == quote {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
                i += 2;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i = skip_block_comment(bytes, i);
            }
            b'$' => {
                i = skip_dollar_quoted(bytes, i).unwrap_or(i + 1);
            }
            b';' => {
                statements.push(&sql[start..i]);
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    statements.push(&sql[start..]);

    statements
        .into_iter()
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Advances past a block comment opening at `open`, honoring nesting.
fn skip_block_comment(bytes: &[u8], open: usize) -> usize {
    let len = bytes.len();
    let mut depth = 1u32;
    let mut i = open + 2;
    while i < len && depth > 0 {
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if i + 1 < len && bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    i
}

/// Advances past a dollar-quoted string opening at `open`, if `open` really
/// starts a `$tag$` opener. A lone `$` (positional parameter, identifier
/// character) returns `None`.
fn skip_dollar_quoted(bytes: &[u8], open: usize) -> Option<usize> {
    let len = bytes.len();
    let mut j = open + 1;
    while j < len && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    if j >= len || bytes[j] != b'$' {
        return None;
    }
    let tag = &bytes[open..=j];
    let mut i = j + 1;
    while i + tag.len() <= len {
        if &bytes[i..i + tag.len()] == tag {
            return Some(i + tag.len());
        }
        i += 1;
    }
    Some(len)
}

/// Extracts a statement's leading keyword, uppercased, after stripping
/// leading whitespace and comments.
fn leading_keyword(statement: &str) -> Option<String> {
    let bytes = statement.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i + 1 < len && bytes[i] == b'-' && bytes[i + 1] == b'-' {
            i += 2;
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            i = skip_block_comment(bytes, i);
            continue;
        }
        break;
    }
    let start = i;
    while i < len && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'_') {
        i += 1;
    }
    if i == start {
        return None;
    }
    Some(statement[start..i].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(sql: &str, allow_write: bool) -> SafetyVerdict {
        classify(&QueryRequest {
            sql: sql.to_string(),
            allow_write,
        })
    }

    #[test]
    fn read_only_batch_is_allowed_regardless_of_override() {
        for allow_write in [false, true] {
            assert!(verdict("SELECT 1", allow_write).is_allowed());
            assert!(verdict("select now(); \n show server_version;", allow_write).is_allowed());
            assert!(verdict("EXPLAIN SELECT * FROM t", allow_write).is_allowed());
        }
    }

    #[test]
    fn mutating_prefix_is_blocked_without_override() {
        for sql in ["INSERT INTO t VALUES (1)", "drop table t", "Truncate t"] {
            assert!(!verdict(sql, false).is_allowed(), "should block: {}", sql);
            assert!(verdict(sql, true).is_allowed(), "override: {}", sql);
        }
    }

    #[test]
    fn second_statement_block_names_position_and_keyword() {
        assert_eq!(
            verdict("SELECT 1; DELETE FROM t;", false),
            SafetyVerdict::Blocked {
                statement: 2,
                keyword: "DELETE".to_string(),
            }
        );
    }

    #[test]
    fn leading_comments_do_not_hide_the_keyword() {
        let sql = "-- cleanup\n/* really */ DROP TABLE t";
        assert_eq!(
            verdict(sql, false),
            SafetyVerdict::Blocked {
                statement: 1,
                keyword: "DROP".to_string(),
            }
        );
    }

    #[test]
    fn delimiters_inside_literals_do_not_split() {
        assert_eq!(split_statements("select ';DELETE FROM t;'"), vec![
            "select ';DELETE FROM t;'"
        ]);
        assert!(verdict("select ';DELETE FROM t;'", false).is_allowed());
        assert!(verdict("select \"weird;column\" from t", false).is_allowed());
    }

    #[test]
    fn escaped_quotes_stay_inside_the_literal() {
        assert_eq!(
            split_statements("select 'it''s; fine'; select 2").len(),
            2
        );
    }

    #[test]
    fn dollar_quoted_bodies_are_opaque() {
        let sql = "select $fn$ delete from t; $fn$";
        assert_eq!(split_statements(sql), vec![sql]);
        assert!(verdict(sql, false).is_allowed());
    }

    #[test]
    fn block_comments_nest() {
        let sql = "/* outer /* inner; */ still */ select 1; select 2";
        assert_eq!(split_statements(sql).len(), 2);
    }

    #[test]
    fn empty_statements_are_not_counted() {
        // Index 2 refers to the second *non-empty* statement.
        assert_eq!(
            verdict("select 1;;  ; update t set x = 1", false),
            SafetyVerdict::Blocked {
                statement: 2,
                keyword: "UPDATE".to_string(),
            }
        );
    }

    #[test]
    fn cte_wrapped_write_passes_the_prefix_check() {
        // Known limitation: the outer keyword WITH is not in the mutating
        // set, so a writable CTE is not caught.
        let sql = "WITH gone AS (DELETE FROM t RETURNING *) SELECT count(*) FROM gone";
        assert!(verdict(sql, false).is_allowed());
    }

    #[test]
    fn ensure_allowed_maps_to_error() {
        let err = ensure_allowed(&QueryRequest {
            sql: "GRANT ALL ON t TO PUBLIC".to_string(),
            allow_write: false,
        })
        .expect_err("blocked");
        assert!(matches!(
            err,
            PgScoutError::SafetyBlocked { statement: 1, ref keyword } if keyword == "GRANT"
        ));
    }
}
