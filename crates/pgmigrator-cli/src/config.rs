//! Configuration loading: built-in default < config file < environment <
//! command-line flag, each layer overriding the last, expressed as plain
//! structs plus `toml`/`serde`.

use crate::cli::MigrateArgs;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_TABLE: &str = "dbmigrator_version";
const ENV_DSN: &str = "GOMIGRATOR_DSN";
const ENV_PATH: &str = "GOMIGRATOR_PATH";
const ENV_TYPE: &str = "GOMIGRATOR_TYPE";
const ENV_TABLE: &str = "GOMIGRATOR_TABLE";

/// Resolved settings for one invocation: `dsn`, `path`, `type` (`sql` or
/// `go`), and the bookkeeping `table` name.
#[derive(Debug, Clone)]
pub struct Config {
    pub dsn: String,
    pub path: String,
    pub kind: String,
    pub table: String,
}

/// `[migrator]`-keyed config file contents; every field is optional since
/// env vars and flags can fill in the rest.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    migrator: ConfigFileInner,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFileInner {
    dsn: Option<String>,
    path: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    table: Option<String>,
}

/// Build a `Config` for one invocation: start from the built-in defaults,
/// layer in the config file (if it exists — a missing file is not an
/// error), then the environment, then CLI flags, each layer overriding
/// the last. Requires `dsn` and `path` to be set.
pub fn load(args: &MigrateArgs) -> anyhow::Result<Config> {
    let cfg = resolve(args)?;
    if cfg.dsn.is_empty() {
        anyhow::bail!("dsn is required: pass --dsn, set {ENV_DSN}, or set migrator.dsn in the config file");
    }
    if cfg.path.is_empty() {
        anyhow::bail!("path is required: pass --path, set {ENV_PATH}, or set migrator.path in the config file");
    }
    Ok(cfg)
}

/// Same layering as [`load`], but for `create`, which needs `path`/`type`
/// and never touches the database — `dsn` is left unvalidated.
pub fn load_for_create(args: &MigrateArgs) -> anyhow::Result<Config> {
    let cfg = resolve(args)?;
    if cfg.path.is_empty() {
        anyhow::bail!("path is required: pass --path, set {ENV_PATH}, or set migrator.path in the config file");
    }
    Ok(cfg)
}

/// Same layering as [`load`], but for `resolve`, which needs `dsn`/`table`
/// and never reads the migration directory — `path` is left unvalidated.
pub fn load_for_resolve(args: &MigrateArgs) -> anyhow::Result<Config> {
    let cfg = resolve(args)?;
    if cfg.dsn.is_empty() {
        anyhow::bail!("dsn is required: pass --dsn, set {ENV_DSN}, or set migrator.dsn in the config file");
    }
    Ok(cfg)
}

fn resolve(args: &MigrateArgs) -> anyhow::Result<Config> {
    let mut dsn = String::new();
    let mut path = String::new();
    let mut kind = "sql".to_string();
    let mut table = DEFAULT_TABLE.to_string();

    if let Some(file) = &args.config {
        if file.exists() {
            let from_file = read_file(file)?;
            if let Some(v) = from_file.migrator.dsn {
                dsn = expand_env_vars(&v)?;
            }
            if let Some(v) = from_file.migrator.path {
                path = v;
            }
            if let Some(v) = from_file.migrator.kind {
                kind = v;
            }
            if let Some(v) = from_file.migrator.table {
                table = v;
            }
        }
    }

    if let Ok(v) = std::env::var(ENV_DSN) {
        if !v.is_empty() {
            dsn = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_PATH) {
        if !v.is_empty() {
            path = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_TYPE) {
        if !v.is_empty() {
            kind = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_TABLE) {
        if !v.is_empty() {
            table = v;
        }
    }

    if let Some(v) = &args.dsn {
        dsn = v.clone();
    }
    if let Some(v) = &args.path {
        path = v.clone();
    }
    if let Some(v) = &args.kind {
        kind = v.clone();
    }
    if let Some(v) = &args.table {
        table = v.clone();
    }

    if kind != "sql" && kind != "go" {
        anyhow::bail!("invalid value of flag --type. expected: sql|go");
    }

    Ok(Config { dsn, path, kind, table })
}

fn read_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

/// Expand `${VAR}` references inside `input`, failing if a referenced
/// variable is unset. Used only for the `dsn` key.
fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut key = String::new();
            let mut closed = false;
            while let Some(&ch) = chars.peek() {
                chars.next();
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }
            if !closed {
                anyhow::bail!("unterminated env var reference: ${{{key}}}");
            }
            if key.is_empty() {
                anyhow::bail!("invalid env var reference: ${{}}");
            }
            let v = std::env::var(&key)
                .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
            out.push_str(&v);
            continue;
        }
        out.push(c);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_everything() {
        let args = MigrateArgs {
            config: None,
            path: Some("/tmp/migrations".to_string()),
            dsn: Some("postgres://flag".to_string()),
            kind: Some("sql".to_string()),
            table: Some("custom_table".to_string()),
            verbose: false,
        };
        let cfg = load(&args).unwrap();
        assert_eq!(cfg.dsn, "postgres://flag");
        assert_eq!(cfg.path, "/tmp/migrations");
        assert_eq!(cfg.table, "custom_table");
    }

    #[test]
    fn missing_dsn_is_an_error() {
        let args = MigrateArgs {
            config: None,
            path: Some("/tmp".to_string()),
            dsn: None,
            kind: None,
            table: None,
            verbose: false,
        };
        // Make sure no stray env leaks into the test.
        // SAFETY: test-only, single-threaded within this test.
        unsafe {
            std::env::remove_var(ENV_DSN);
        }
        assert!(load(&args).is_err());
    }

    #[test]
    fn invalid_type_is_rejected() {
        let args = MigrateArgs {
            config: None,
            path: Some("/tmp".to_string()),
            dsn: Some("postgres://x".to_string()),
            kind: Some("yaml".to_string()),
            table: None,
            verbose: false,
        };
        assert!(load(&args).is_err());
    }

    #[test]
    fn expand_env_vars_substitutes_braces() {
        unsafe {
            std::env::set_var("PGMIGRATOR_TEST_VAR", "secret");
        }
        assert_eq!(
            expand_env_vars("postgres://${PGMIGRATOR_TEST_VAR}@host/db").unwrap(),
            "postgres://secret@host/db"
        );
    }
}
