//! `pgmigrator` command-line front end.
//!
//! The public surface is intentionally small: argument parsing lives in
//! [`cli`], configuration resolution in [`config`], and every subcommand's
//! logic in [`commands`], dispatched from [`run`]. `main.rs` stays a thin
//! shim over [`run`].

mod cli;
mod commands;
mod config;
mod format;
mod init;

/// Runs the `pgmigrator` CLI with an argv-style argument list. Most
/// callers should pass `std::env::args().collect()`.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    init_tracing(verbose_of(&cmd));

    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Create(args) => commands::run_create(args),
        cli::Command::Up(args) => commands::run_up(args).await,
        cli::Command::Down(args) => commands::run_down(args).await,
        cli::Command::Redo(args) => commands::run_redo(args).await,
        cli::Command::Status(args) => commands::run_status(args).await,
        cli::Command::Dbversion(args) => commands::run_dbversion(args).await,
        cli::Command::Resolve(args) => commands::run_resolve(args).await,
        cli::Command::Init(args) => commands::run_init(args),
        cli::Command::Version => commands::run_version(),
    }
}

fn verbose_of(cmd: &cli::Command) -> bool {
    match cmd {
        cli::Command::Create(a) => a.common.verbose,
        cli::Command::Up(a)
        | cli::Command::Down(a)
        | cli::Command::Redo(a)
        | cli::Command::Status(a)
        | cli::Command::Dbversion(a) => a.verbose,
        cli::Command::Resolve(a) => a.common.verbose,
        cli::Command::Help(_) | cli::Command::Init(_) | cli::Command::Version => false,
    }
}

/// Wire a `tracing_subscriber::fmt` subscriber: `DEBUG` (which surfaces
/// `pgmigrator.sql` statement traces) when `--verbose` was passed, `WARN`
/// otherwise so infra warnings still print but per-statement SQL tracing
/// is filtered out.
fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}
