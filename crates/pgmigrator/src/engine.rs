//! Orchestration: the five operations (`up`, `down`, `redo`, `status`,
//! `current_version`) built from [`catalog`](crate::catalog),
//! [`store`](crate::store) and, for compiled-in migrations,
//! [`registry`](crate::registry).
//!
//! Claiming a version and executing its payload must happen on two
//! distinct physical connections: the claim holds an open transaction
//! (and the row lock that transaction implies) for the duration of the
//! payload, while the payload itself must run unwrapped so that
//! non-transactional DDL (`create index concurrently`) still works. A
//! pool is what makes "two distinct connections, same logical operation"
//! cheap, which is why the engine is written against
//! [`deadpool_postgres::Pool`] rather than a single bare client. This
//! module therefore requires the `pool` feature (on by default).

use crate::catalog::{self, MigrationTask};
use crate::client::GenericClient;
use crate::error::{MigratorError, OrmResult};
use crate::monitor;
use crate::registry::Registry;
use crate::result::{Direction, MigrationResult, VersionRow, VersionStatus};
use crate::store;
use deadpool_postgres::Pool;
use std::path::{Path, PathBuf};

/// Source of a migration's SQL payload: a file on disk, or a compiled-in
/// registration.
#[derive(Clone)]
enum Source {
    File(PathBuf),
    Registered,
}

#[derive(Clone)]
struct Task {
    version: i64,
    up: Source,
}

/// Merge the on-disk catalog with an (optionally empty) in-process
/// registry into one ascending task list. A version present in both is
/// resolved in favor of disk — the registry exists for migrations that
/// were never given files, not to override them.
fn merge_tasks(disk: Vec<MigrationTask>, registry: &Registry) -> Vec<Task> {
    let mut by_version = std::collections::BTreeMap::new();
    for reg in registry.entries() {
        by_version.insert(
            reg.version,
            Task {
                version: reg.version,
                up: Source::Registered,
            },
        );
    }
    for d in disk {
        by_version.insert(
            d.version,
            Task {
                version: d.version,
                up: Source::File(d.up_path),
            },
        );
    }
    by_version.into_values().collect()
}

/// Run `up`: claim and execute every unfinished task in ascending
/// version order, stopping at the first failure.
pub async fn up(
    pool: &Pool,
    table: &str,
    dir: impl AsRef<Path>,
    registry: &Registry,
) -> OrmResult<Vec<MigrationResult>> {
    let client = pool.get().await?;
    store::ensure_table(&client, table).await?;

    let unfinished = store::versions_with_status(&client, table, VersionStatus::Error).await?;
    if let Some(first) = unfinished.first() {
        return Err(MigratorError::UnfinishedMigrations(*first));
    }

    let disk = catalog::pair_check(catalog::list(&dir, catalog::UP_SUFFIX)?)?;
    let tasks = merge_tasks(disk, registry);
    run_tasks(pool, table, tasks, None, registry).await
}

/// Run `up` targeted at exactly one version (used by `redo` to reapply
/// the version it just reverted). Fails with `VersionHasNotBeenFound` if
/// the version isn't present in the catalog or registry.
pub async fn run_to(
    pool: &Pool,
    table: &str,
    dir: impl AsRef<Path>,
    registry: &Registry,
    target_version: i64,
) -> OrmResult<Vec<MigrationResult>> {
    let client = pool.get().await?;
    store::ensure_table(&client, table).await?;
    drop(client);

    let disk = catalog::pair_check(catalog::list(&dir, catalog::UP_SUFFIX)?)?;
    let tasks = merge_tasks(disk, registry);
    if !tasks.iter().any(|t| t.version == target_version) {
        return Err(MigratorError::VersionHasNotBeenFound(target_version));
    }
    run_tasks(pool, table, tasks, Some(target_version), registry).await
}

async fn run_tasks(
    pool: &Pool,
    table: &str,
    tasks: Vec<Task>,
    only_version: Option<i64>,
    registry: &Registry,
) -> OrmResult<Vec<MigrationResult>> {
    let tasks = select_runnable(tasks, only_version);
    let candidates: Vec<i64> = tasks.iter().map(|t| t.version).collect();

    let read_client = pool.get().await?;
    let already_resolved = store::find_new(&read_client, table, &candidates).await?;
    drop(read_client);

    let mut results = Vec::new();
    for task in tasks {
        if already_resolved.contains(&task.version) {
            continue;
        }

        let (sql, file) = match &task.up {
            Source::File(path) => {
                let text = std::fs::read_to_string(path)?;
                if text.trim().is_empty() {
                    tracing::info!(version = task.version, "empty migration, skipping");
                    continue;
                }
                (text, Some(path.display().to_string()))
            }
            Source::Registered => {
                let reg = registry
                    .get(task.version)
                    .ok_or(MigratorError::VersionHasNotBeenFound(task.version))?;
                let client = pool.get().await?;
                let sql = (reg.up)(&client).await?;
                (sql, None)
            }
        };

        let mut claim_client = pool.get().await?;
        let claim = store::claim(&mut claim_client, table, task.version).await?;

        if claim.already_resolved() {
            // A concurrent runner committed this version while we were
            // blocked waiting for its lock; nothing left for us to do.
            claim.rollback().await?;
            continue;
        }

        monitor::trace_statement("up", &sql);
        let exec_client = pool.get().await?;
        match store::exec(&exec_client, &sql).await {
            Ok(()) => {
                claim.commit_success().await?;
                results.push(MigrationResult::success(Direction::Up, task.version, file, sql));
            }
            Err(MigratorError::Db(source)) => {
                claim.commit_error().await?;
                let label = file.clone().unwrap_or_else(|| format!("version {}", task.version));
                let err = MigratorError::migration(source, sql.clone(), label);
                results.push(MigrationResult::error(
                    Direction::Up,
                    task.version,
                    file,
                    sql,
                    err.to_string(),
                ));
                return Ok(results);
            }
            Err(e) => {
                claim.rollback().await?;
                return Err(e);
            }
        }
    }
    Ok(results)
}

/// Sort ascending and, if `only_version` is set, keep just that one —
/// pure logic, exercised directly by unit tests without a database.
fn select_runnable(mut tasks: Vec<Task>, only_version: Option<i64>) -> Vec<Task> {
    tasks.sort_by_key(|t| t.version);
    if let Some(v) = only_version {
        tasks.retain(|t| t.version == v);
    }
    tasks
}

/// Run `down`: revert exactly the most recently executed version.
pub async fn down(pool: &Pool, table: &str, dir: impl AsRef<Path>) -> OrmResult<Vec<MigrationResult>> {
    let client = pool.get().await?;
    store::ensure_table(&client, table).await?;

    let version = store::last_version(&client, table).await?;
    if version == 0 {
        return Ok(Vec::new());
    }

    let status = store::status_of(&client, table, version)
        .await?
        .ok_or(MigratorError::VersionHasNotBeenFound(version))?;

    let down_files = catalog::list(&dir, catalog::DOWN_SUFFIX)?;
    let Some((_, path)) = down_files.into_iter().find(|(v, _)| *v == version) else {
        return Err(MigratorError::VersionHasNotBeenFound(version));
    };

    let sql = std::fs::read_to_string(&path)?;
    let file = Some(path.display().to_string());
    let mut result = MigrationResult::success(Direction::Down, version, file, sql.clone());

    if status == VersionStatus::Success {
        monitor::trace_statement("down", &sql);
        if let Err(MigratorError::Db(source)) = store::exec(&client, &sql).await {
            let label = result.file.clone().unwrap_or_else(|| format!("version {version}"));
            let err = MigratorError::migration(source, sql.clone(), label);
            result.status = VersionStatus::Error;
            result.err = Some(err.to_string());
        }
    }
    // status == Error: the forward attempt never completed, nothing to undo.

    store::delete(&client, table, version).await?;
    Ok(vec![result])
}

/// `redo`: one down step, then (if it actually reverted something) an
/// up targeted at the same version.
pub async fn redo(
    pool: &Pool,
    table: &str,
    dir: impl AsRef<Path>,
    registry: &Registry,
) -> OrmResult<Vec<MigrationResult>> {
    let mut results = down(pool, table, dir.as_ref()).await?;
    if let Some(reverted) = results.first() {
        let version = reverted.version;
        let up_results = run_to(pool, table, dir, registry, version).await?;
        results.extend(up_results);
    }
    Ok(results)
}

/// Manually clear a row stuck in `Processing` (left behind by a claim
/// whose connection died before it could commit) so a future `up` can
/// re-claim that version. Refuses to touch a row in any other state —
/// `down` is the right tool for reverting a version that actually ran.
pub async fn resolve_orphan(pool: &Pool, table: &str, version: i64) -> OrmResult<()> {
    let client = pool.get().await?;
    let status = store::status_of(&client, table, version)
        .await?
        .ok_or(MigratorError::VersionHasNotBeenFound(version))?;

    if status != VersionStatus::Processing {
        return Err(MigratorError::Other(format!(
            "version {version} is {status}, not Processing; refusing to delete"
        )));
    }

    store::delete(&client, table, version).await
}

/// All bookkeeping rows, ordered by `executed_at`.
pub async fn status(client: &impl GenericClient, table: &str) -> OrmResult<Vec<VersionRow>> {
    store::list_all(client, table).await
}

/// The most recently executed version, or `0` if none has run.
pub async fn current_version(client: &impl GenericClient, table: &str) -> OrmResult<i64> {
    store::last_version(client, table).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_task(version: i64) -> Task {
        Task {
            version,
            up: Source::File(PathBuf::from(format!("{version}.up.sql"))),
        }
    }

    #[test]
    fn select_runnable_sorts_ascending() {
        let tasks = vec![file_task(30), file_task(10), file_task(20)];
        let sorted = select_runnable(tasks, None);
        let versions: Vec<i64> = sorted.iter().map(|t| t.version).collect();
        assert_eq!(versions, vec![10, 20, 30]);
    }

    #[test]
    fn select_runnable_filters_to_one_version() {
        let tasks = vec![file_task(10), file_task(20), file_task(30)];
        let filtered = select_runnable(tasks, Some(20));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].version, 20);
    }

    #[test]
    fn merge_tasks_prefers_disk_over_registry() {
        let mut registry = Registry::new();
        registry.add(
            10,
            |c| Box::pin(async move { let _ = c; Ok(String::new()) }),
            |c| Box::pin(async move { let _ = c; Ok(String::new()) }),
        );
        let disk = vec![MigrationTask {
            version: 10,
            up_path: PathBuf::from("10.up.sql"),
            down_path: PathBuf::from("10.down.sql"),
        }];
        let merged = merge_tasks(disk, &registry);
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0].up, Source::File(_)));
    }

    #[test]
    fn merge_tasks_keeps_registry_only_versions() {
        let registry = {
            let mut r = Registry::new();
            r.add(
                5,
                |c| Box::pin(async move { let _ = c; Ok(String::new()) }),
                |c| Box::pin(async move { let _ = c; Ok(String::new()) }),
            );
            r
        };
        let merged = merge_tasks(Vec::new(), &registry);
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0].up, Source::Registered));
    }
}
