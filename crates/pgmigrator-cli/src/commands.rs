//! Command dispatch: resolves configuration, opens a pool, and drives
//! `pgmigrator::engine` for every subcommand that touches the database.

use crate::cli::{CreateArgs, InitArgs, MigrateArgs, ResolveArgs};
use crate::config;
use crate::format;
use anyhow::Context;
use pgmigrator::Registry;

pub async fn run_up(args: MigrateArgs) -> anyhow::Result<()> {
    let cfg = config::load(&args)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    let registry = Registry::new();
    let results = pgmigrator::engine::up(&pool, &cfg.table, &cfg.path, &registry).await?;
    format::print_results(&results);
    Ok(())
}

pub async fn run_down(args: MigrateArgs) -> anyhow::Result<()> {
    let cfg = config::load(&args)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    let results = pgmigrator::engine::down(&pool, &cfg.table, &cfg.path).await?;
    format::print_results(&results);
    Ok(())
}

pub async fn run_redo(args: MigrateArgs) -> anyhow::Result<()> {
    let cfg = config::load(&args)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    let registry = Registry::new();
    let results = pgmigrator::engine::redo(&pool, &cfg.table, &cfg.path, &registry).await?;
    format::print_results(&results);
    Ok(())
}

pub async fn run_status(args: MigrateArgs) -> anyhow::Result<()> {
    let cfg = config::load(&args)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    let client = pool.get().await.context("failed to check out a connection")?;
    let rows = pgmigrator::engine::status(&client, &cfg.table).await?;
    format::print_status_rows(&rows);
    Ok(())
}

pub async fn run_dbversion(args: MigrateArgs) -> anyhow::Result<()> {
    let cfg = config::load(&args)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    let client = pool.get().await.context("failed to check out a connection")?;
    let version = pgmigrator::engine::current_version(&client, &cfg.table).await?;
    println!("{version}");
    Ok(())
}

pub async fn run_resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let cfg = config::load_for_resolve(&args.common)?;
    let pool = pgmigrator::create_pool(&cfg.dsn).context("failed to build connection pool")?;
    pgmigrator::engine::resolve_orphan(&pool, &cfg.table, args.version).await?;
    println!("cleared version {} (was Processing)", args.version);
    Ok(())
}

pub fn run_create(args: CreateArgs) -> anyhow::Result<()> {
    let cfg = config::load_for_create(&args.common)?;
    let suffix = args.words.join("_");

    if cfg.kind == "go" {
        let (path, _version) = create_go_migration(std::path::Path::new(&cfg.path), &suffix)?;
        println!("Created GO migration: {}", path.display());
        return Ok(());
    }

    let (up, down) = pgmigrator::catalog::create_pair(&cfg.path, &suffix)?;
    println!("Created up sql migration: {}", up.display());
    println!("Created down sql migration: {}", down.display());
    Ok(())
}

/// Generates a compiled-in migration template. There is no runtime
/// `init()` hook to auto-register it, so the generated file shows the
/// `register_migration!` pattern the caller is expected to wire into
/// their own binary.
fn create_go_migration(dir: &std::path::Path, suffix: &str) -> anyhow::Result<(std::path::PathBuf, i64)> {
    std::fs::metadata(dir).map_err(|_| anyhow::anyhow!("is not dir: {}", dir.display()))?;

    let version = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string().parse::<i64>()?;
    let sanitized = pgmigrator::catalog::sanitize(suffix);
    let file_stem = if sanitized.is_empty() {
        version.to_string()
    } else {
        format!("{version}.{sanitized}")
    };
    let path = dir.join(format!("{file_stem}.rs"));

    let contents = format!(
        "// Generated migration template for version {version}.\n\
         // Wire this into your binary with `pgmigrator::register_migration!`.\n\n\
         pgmigrator::register_migration!({version}, up_{version}, down_{version});\n\n\
         async fn up_{version}(_client: &tokio_postgres::Client) -> pgmigrator::OrmResult<String> {{\n\
         \u{20}\u{20}\u{20}\u{20}Ok(String::new())\n\
         }}\n\n\
         async fn down_{version}(_client: &tokio_postgres::Client) -> pgmigrator::OrmResult<String> {{\n\
         \u{20}\u{20}\u{20}\u{20}Ok(String::new())\n\
         }}\n"
    );
    std::fs::write(&path, contents)?;
    Ok((path, version))
}

pub fn run_init(args: InitArgs) -> anyhow::Result<()> {
    crate::init::run(args)
}

pub fn run_version() -> anyhow::Result<()> {
    format::print_version_json()
}
