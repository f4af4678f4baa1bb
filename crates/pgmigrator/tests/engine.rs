//! Integration tests against a live PostgreSQL instance. Skipped (not
//! `#[ignore]`d) when `DATABASE_URL` isn't set.

use pgmigrator::{Registry, create_pool};
use std::path::PathBuf;

fn database_url() -> Option<String> {
    match std::env::var("DATABASE_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping");
            None
        }
    }
}

fn unique_table() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    format!("pgmigrator_test_{}_{}", std::process::id(), nanos)
}

fn temp_migration_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("pgmigrator-itest-{nanos}"));
    std::fs::create_dir_all(&dir).expect("mkdir");
    dir
}

async fn cleanup(pool: &deadpool_postgres::Pool, table: &str) {
    if let Ok(client) = pool.get().await {
        let _ = client
            .batch_execute(&format!("drop table if exists \"{table}\""))
            .await;
    }
}

#[tokio::test]
async fn up_claims_and_commits_success() {
    let Some(url) = database_url() else { return };
    let pool = create_pool(&url).expect("pool");
    let table = unique_table();
    let dir = temp_migration_dir();

    std::fs::write(dir.join("1.up.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("1.down.sql"), "select 1;").unwrap();

    let registry = Registry::new();
    let results = pgmigrator::engine::up(&pool, &table, &dir, &registry)
        .await
        .expect("up");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].version, 1);
    assert_eq!(results[0].status, pgmigrator::VersionStatus::Success);

    let version = pgmigrator::engine::current_version(&pool.get().await.unwrap(), &table)
        .await
        .expect("current_version");
    assert_eq!(version, 1);

    std::fs::remove_dir_all(&dir).unwrap();
    cleanup(&pool, &table).await;
}

#[tokio::test]
async fn up_stops_at_first_failure_and_records_error() {
    let Some(url) = database_url() else { return };
    let pool = create_pool(&url).expect("pool");
    let table = unique_table();
    let dir = temp_migration_dir();

    std::fs::write(dir.join("1.up.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("1.down.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("2.up.sql"), "this is not valid sql;").unwrap();
    std::fs::write(dir.join("2.down.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("3.up.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("3.down.sql"), "select 1;").unwrap();

    let registry = Registry::new();
    let results = pgmigrator::engine::up(&pool, &table, &dir, &registry)
        .await
        .expect("up");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].version, 1);
    assert_eq!(results[0].status, pgmigrator::VersionStatus::Success);
    assert_eq!(results[1].version, 2);
    assert_eq!(results[1].status, pgmigrator::VersionStatus::Error);

    let again = pgmigrator::engine::up(&pool, &table, &dir, &registry).await;
    assert!(matches!(again, Err(pgmigrator::MigratorError::UnfinishedMigrations(2))));

    std::fs::remove_dir_all(&dir).unwrap();
    cleanup(&pool, &table).await;
}

#[tokio::test]
async fn down_then_up_redo_round_trip() {
    let Some(url) = database_url() else { return };
    let pool = create_pool(&url).expect("pool");
    let table = unique_table();
    let dir = temp_migration_dir();

    std::fs::write(dir.join("1.up.sql"), "create table widgets(id int);").unwrap();
    std::fs::write(dir.join("1.down.sql"), "drop table widgets;").unwrap();

    let registry = Registry::new();
    pgmigrator::engine::up(&pool, &table, &dir, &registry).await.unwrap();

    let down_results = pgmigrator::engine::down(&pool, &table, &dir).await.unwrap();
    assert_eq!(down_results.len(), 1);
    assert_eq!(down_results[0].version, 1);

    let version = pgmigrator::engine::current_version(&pool.get().await.unwrap(), &table)
        .await
        .unwrap();
    assert_eq!(version, 0);

    let redo_results = pgmigrator::engine::redo(&pool, &table, &dir, &registry).await;
    assert!(redo_results.is_ok());

    std::fs::remove_dir_all(&dir).unwrap();
    cleanup(&pool, &table).await;
}

#[tokio::test]
async fn resolve_orphan_clears_a_stuck_processing_row_but_not_others() {
    let Some(url) = database_url() else { return };
    let pool = create_pool(&url).expect("pool");
    let table = unique_table();
    let dir = temp_migration_dir();

    std::fs::write(dir.join("1.up.sql"), "select 1;").unwrap();
    std::fs::write(dir.join("1.down.sql"), "select 1;").unwrap();

    let registry = Registry::new();
    pgmigrator::engine::up(&pool, &table, &dir, &registry).await.unwrap();

    // Simulate a claim whose connection died before it could commit.
    let client = pool.get().await.unwrap();
    client
        .batch_execute(&format!(
            "insert into \"{table}\" (version, status) values (2, 1)"
        ))
        .await
        .unwrap();

    let err = pgmigrator::engine::resolve_orphan(&pool, &table, 1).await.unwrap_err();
    assert!(matches!(err, pgmigrator::MigratorError::Other(_)));

    pgmigrator::engine::resolve_orphan(&pool, &table, 2).await.unwrap();
    let status = pgmigrator::store::status_of(&client, &table, 2).await.unwrap();
    assert!(status.is_none());

    std::fs::remove_dir_all(&dir).unwrap();
    cleanup(&pool, &table).await;
}

#[tokio::test]
async fn concurrent_up_runs_claim_each_version_exactly_once() {
    let Some(url) = database_url() else { return };
    let pool = create_pool(&url).expect("pool");
    let table = unique_table();
    let dir = temp_migration_dir();

    for v in 1..=5 {
        std::fs::write(dir.join(format!("{v}.up.sql")), "select pg_sleep(0.05);").unwrap();
        std::fs::write(dir.join(format!("{v}.down.sql")), "select 1;").unwrap();
    }

    let registry = Registry::new();
    let (a, b) = tokio::join!(
        pgmigrator::engine::up(&pool, &table, &dir, &registry),
        pgmigrator::engine::up(&pool, &table, &dir, &registry),
    );

    let a = a.expect("run a");
    let b = b.expect("run b");

    let mut seen = std::collections::HashMap::new();
    for r in a.iter().chain(b.iter()) {
        *seen.entry(r.version).or_insert(0) += 1;
        assert_eq!(r.status, pgmigrator::VersionStatus::Success);
    }
    for v in 1..=5 {
        assert_eq!(
            *seen.get(&v).unwrap_or(&0),
            1,
            "version {v} should appear in exactly one runner's Result stream"
        );
    }

    std::fs::remove_dir_all(&dir).unwrap();
    cleanup(&pool, &table).await;
}
