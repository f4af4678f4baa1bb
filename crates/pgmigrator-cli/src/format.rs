//! Human-readable output: `<version>|<status>` for `up`/`down`/`redo`
//! results, and `<version>|<executed_at_rfc3339>|<status>` for `status`.

use pgmigrator::{MigrationResult, VersionRow};

pub fn print_results(results: &[MigrationResult]) {
    for r in results {
        println!("{}", r.line());
        if let Some(err) = &r.err {
            eprintln!("{}: {err}", r.version);
        }
    }
}

pub fn print_status_rows(rows: &[VersionRow]) {
    for row in rows {
        let executed_at = row
            .executed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{}|{}|{}", row.version, executed_at, row.status);
    }
}

#[derive(serde::Serialize)]
struct BuildInfo<'a> {
    release: &'a str,
    build_date: &'a str,
    git_hash: &'a str,
}

/// Build metadata as JSON, sourced from `CARGO_PKG_VERSION` plus two
/// `option_env!` hooks a build script could inject; `"unknown"` when
/// unset.
pub fn print_version_json() -> anyhow::Result<()> {
    let info = BuildInfo {
        release: env!("CARGO_PKG_VERSION"),
        build_date: option_env!("PGMIGRATOR_BUILD_DATE").unwrap_or("unknown"),
        git_hash: option_env!("PGMIGRATOR_GIT_HASH").unwrap_or("unknown"),
    };
    println!("{}", serde_json::to_string(&info)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgmigrator::{Direction, VersionStatus};

    #[test]
    fn status_row_prints_dash_for_processing() {
        let row = VersionRow {
            version: 1,
            status: VersionStatus::Processing,
            executed_at: None,
        };
        // Smoke-test that formatting doesn't panic; exact stdout capture
        // isn't worth the ceremony here.
        print_status_rows(std::slice::from_ref(&row));
    }

    #[test]
    fn result_line_matches_wire_format() {
        let r = MigrationResult::success(Direction::Up, 42, None, "select 1;".to_string());
        assert_eq!(r.line(), "42|Success");
    }
}
