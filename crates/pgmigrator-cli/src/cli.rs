//! Hand-rolled argument parsing (no `clap`): one `parse_args` entry point
//! producing a `Command`, plus a `print_help` companion keyed off a help
//! topic.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Create,
    Up,
    Down,
    Redo,
    Status,
    Dbversion,
    Resolve,
    Init,
    Version,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Create(CreateArgs),
    Up(MigrateArgs),
    Down(MigrateArgs),
    Redo(MigrateArgs),
    Status(MigrateArgs),
    Dbversion(MigrateArgs),
    Resolve(ResolveArgs),
    Init(InitArgs),
    Version,
}

/// Common flags shared by every command that talks to the database or
/// reads migration files: `--config`/`-c`, `--path`/`-p`, `--dsn`/`-d`,
/// `--type`/`-t`, `--table`, and the persistent `--verbose`/`-v`.
#[derive(Debug, Clone, Default)]
pub struct MigrateArgs {
    pub config: Option<PathBuf>,
    pub path: Option<String>,
    pub dsn: Option<String>,
    pub kind: Option<String>,
    pub table: Option<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub common: MigrateArgs,
    pub words: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: PathBuf,
}

/// Arguments for `resolve <version>`: clears a stuck `Processing` row by
/// hand so a future `up` can re-claim that version.
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub common: MigrateArgs,
    pub version: i64,
}

const DEFAULT_CONFIG_FILE: &str = "./.pgmigrator.toml";

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "create" => parse_create(it.map(|s| s.as_str())),
        "up" => Ok(parse_migrate(it.map(|s| s.as_str()), HelpTopic::Up)?.map_or(
            Command::Help(HelpTopic::Up),
            Command::Up,
        )),
        "down" => Ok(parse_migrate(it.map(|s| s.as_str()), HelpTopic::Down)?.map_or(
            Command::Help(HelpTopic::Down),
            Command::Down,
        )),
        "redo" => Ok(parse_migrate(it.map(|s| s.as_str()), HelpTopic::Redo)?.map_or(
            Command::Help(HelpTopic::Redo),
            Command::Redo,
        )),
        "status" => Ok(parse_migrate(it.map(|s| s.as_str()), HelpTopic::Status)?.map_or(
            Command::Help(HelpTopic::Status),
            Command::Status,
        )),
        "dbversion" => Ok(parse_migrate(it.map(|s| s.as_str()), HelpTopic::Dbversion)?.map_or(
            Command::Help(HelpTopic::Dbversion),
            Command::Dbversion,
        )),
        "resolve" => parse_resolve(it.map(|s| s.as_str())),
        "init" => parse_init(it.map(|s| s.as_str())),
        "version" => Ok(Command::Version),
        other => anyhow::bail!("unknown command: {other}"),
    }
}

/// Parse the flags shared by `up`/`down`/`redo`/`status`/`dbversion`.
/// Returns `Ok(None)` when `-h`/`--help` was seen, so callers can map that
/// straight to their own help topic.
fn parse_migrate<'a>(
    mut it: impl Iterator<Item = &'a str>,
    _topic: HelpTopic,
) -> anyhow::Result<Option<MigrateArgs>> {
    let mut out = MigrateArgs::default();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(None),
            "--config" | "-c" => out.config = Some(PathBuf::from(next_value(&mut it, token)?)),
            _ if token.starts_with("--config=") => {
                out.config = Some(PathBuf::from(token.trim_start_matches("--config=")));
            }
            "--path" | "-p" => out.path = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--path=") => {
                out.path = Some(token.trim_start_matches("--path=").to_string());
            }
            "--dsn" | "-d" => out.dsn = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--dsn=") => {
                out.dsn = Some(token.trim_start_matches("--dsn=").to_string());
            }
            "--type" | "-t" => out.kind = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--type=") => {
                out.kind = Some(token.trim_start_matches("--type=").to_string());
            }
            "--table" => out.table = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--table=") => {
                out.table = Some(token.trim_start_matches("--table=").to_string());
            }
            "--verbose" | "-v" => out.verbose = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Some(out))
}

fn parse_create<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut common = MigrateArgs::default();
    let mut words = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Create)),
            "--config" | "-c" => common.config = Some(PathBuf::from(next_value(&mut it, token)?)),
            _ if token.starts_with("--config=") => {
                common.config = Some(PathBuf::from(token.trim_start_matches("--config=")));
            }
            "--path" | "-p" => common.path = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--path=") => {
                common.path = Some(token.trim_start_matches("--path=").to_string());
            }
            "--type" | "-t" => common.kind = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--type=") => {
                common.kind = Some(token.trim_start_matches("--type=").to_string());
            }
            "--verbose" | "-v" => common.verbose = true,
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => words.push(other.to_string()),
        }
    }

    if words.is_empty() {
        anyhow::bail!("missing migration name: usage `pgmigrator create <words...>`");
    }

    Ok(Command::Create(CreateArgs { common, words }))
}

fn parse_resolve<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut common = MigrateArgs::default();
    let mut version = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Resolve)),
            "--config" | "-c" => common.config = Some(PathBuf::from(next_value(&mut it, token)?)),
            _ if token.starts_with("--config=") => {
                common.config = Some(PathBuf::from(token.trim_start_matches("--config=")));
            }
            "--dsn" | "-d" => common.dsn = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--dsn=") => {
                common.dsn = Some(token.trim_start_matches("--dsn=").to_string());
            }
            "--table" => common.table = Some(next_value(&mut it, token)?.to_string()),
            _ if token.starts_with("--table=") => {
                common.table = Some(token.trim_start_matches("--table=").to_string());
            }
            "--verbose" | "-v" => common.verbose = true,
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other if version.is_none() => {
                version = Some(
                    other
                        .parse::<i64>()
                        .map_err(|_| anyhow::anyhow!("invalid version: {other}"))?,
                );
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    let version = version.ok_or_else(|| anyhow::anyhow!("missing version: usage `pgmigrator resolve <version>`"))?;
    Ok(Command::Resolve(ResolveArgs { common, version }))
}

fn parse_init<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG_FILE);

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Init)),
            "--config" | "-c" => config = PathBuf::from(next_value(&mut it, token)?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Init(InitArgs { config }))
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a str>, flag: &str) -> anyhow::Result<&'a str> {
    it.next()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => println!(
            "\
pgmigrator - transactional PostgreSQL schema migration tool

USAGE:
  pgmigrator <COMMAND> [OPTIONS]

COMMANDS:
  create <words...>     Create a new migration file pair
  up                    Apply all pending migrations
  down                  Revert the most recent migration
  redo                  Revert then reapply the most recent migration
  status                Print per-version migration status
  dbversion             Print the current database version
  resolve <version>     Clear a stuck Processing row by hand
  init                  Write a default configuration file
  version               Print build metadata as JSON

Run `pgmigrator <command> --help` for more."
        ),
        HelpTopic::Create => println!(
            "\
USAGE:
  pgmigrator create <words...> [OPTIONS]

OPTIONS:
  --config, -c <FILE>   Config file path (default: {DEFAULT_CONFIG_FILE})
  --path, -p <DIR>      Migration directory
  --type, -t <sql|go>   Artifact kind (default: sql)
  --verbose, -v         Trace SQL statements
  -h, --help            Print help"
        ),
        HelpTopic::Up => println!("{}", migrate_help("up")),
        HelpTopic::Down => println!("{}", migrate_help("down")),
        HelpTopic::Redo => println!("{}", migrate_help("redo")),
        HelpTopic::Status => println!("{}", migrate_help("status")),
        HelpTopic::Dbversion => println!("{}", migrate_help("dbversion")),
        HelpTopic::Resolve => println!(
            "\
USAGE:
  pgmigrator resolve <version> [OPTIONS]

Deletes a bookkeeping row stuck in Processing (left behind by a crashed
claim) so a future `up` can re-claim that version. Refuses to touch a
row that isn't Processing.

OPTIONS:
  --config, -c <FILE>   Config file path (default: {DEFAULT_CONFIG_FILE})
  --dsn, -d <URL>       PostgreSQL connection URL (overrides config)
  --table <NAME>        Bookkeeping table name (overrides config)
  --verbose, -v         Trace SQL statements
  -h, --help            Print help"
        ),
        HelpTopic::Init => println!(
            "\
USAGE:
  pgmigrator init [OPTIONS]

OPTIONS:
  --config, -c <FILE>   Output config path (default: {DEFAULT_CONFIG_FILE})
  -h, --help            Print help"
        ),
        HelpTopic::Version => println!("pgmigrator version"),
    }
}

fn migrate_help(cmd: &str) -> String {
    format!(
        "\
USAGE:
  pgmigrator {cmd} [OPTIONS]

OPTIONS:
  --config, -c <FILE>   Config file path (default: {DEFAULT_CONFIG_FILE})
  --path, -p <DIR>      Migration directory (overrides config)
  --dsn, -d <URL>       PostgreSQL connection URL (overrides config)
  --type, -t <sql|go>   Artifact kind (overrides config)
  --table <NAME>        Bookkeeping table name (overrides config)
  --verbose, -v         Trace SQL statements
  -h, --help            Print help"
    )
}
