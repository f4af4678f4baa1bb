//! SQL statement tracing, enabled by the CLI's `--verbose` flag.
//!
//! Rather than a full before/after query-hook pipeline, a single
//! debug-level breadcrumb is emitted per statement, on the
//! `pgmigrator.sql` target, so `--verbose` can turn it on without
//! touching the rest of the crate's logging.

use tracing::Level;

/// Truncate `sql` to `max_chars`, appending `...` when truncated, so long
/// payloads don't flood the terminal.
fn truncate(sql: &str, max_chars: usize) -> String {
    if sql.chars().count() <= max_chars {
        return sql.to_string();
    }
    let truncated: String = sql.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// Log a statement about to be submitted, at DEBUG on `pgmigrator.sql`.
/// A no-op unless the caller has configured a subscriber that includes
/// that target at DEBUG (see `pgmigrator-cli`'s `--verbose` handling).
pub fn trace_statement(op: &str, sql: &str) {
    let shown = truncate(sql, 500);
    tracing::event!(target: "pgmigrator.sql", Level::DEBUG, op, sql = %shown);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_sql_untouched() {
        assert_eq!(truncate("select 1", 500), "select 1");
    }

    #[test]
    fn truncate_marks_long_sql() {
        let long = "x".repeat(10);
        assert_eq!(truncate(&long, 4), "xxxx...");
    }
}
