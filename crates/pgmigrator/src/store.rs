//! The bookkeeping store: all reads and writes against the
//! `dbmigrator_version` table.
//!
//! Every operation here goes through a table name that is validated and
//! quoted once at the boundary (see [`quote_table_name`]), since the
//! table name is user-configurable and must never be interpolated
//! unescaped into SQL text.
//!
//! The [`Claim`] guard is the one piece of this module that does not fit
//! [`GenericClient`]: claiming a version opens a transaction that stays
//! open across the migration payload's execution, so it owns a
//! `tokio_postgres::Transaction` directly rather than being generic over it.

use crate::client::GenericClient;
use crate::error::{MigratorError, OrmResult};
use crate::result::{VersionRow, VersionStatus};

/// Quote a (possibly schema-qualified) table name, rejecting anything
/// that isn't `[A-Za-z0-9_]` per dot-separated part.
pub fn quote_table_name(table_name: &str) -> OrmResult<String> {
    let mut parts = Vec::new();
    for part in table_name.split('.') {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MigratorError::Other(format!(
                "invalid migration table name: {table_name}"
            )));
        }
        parts.push(format!("\"{part}\""));
    }
    Ok(parts.join("."))
}

/// Create the bookkeeping table, its two lookup indexes, and its
/// documentation comments, if they don't already exist.
pub async fn ensure_table(client: &impl crate::client::BatchExec, table: &str) -> OrmResult<()> {
    let table_q = quote_table_name(table)?;
    let create = format!(
        "create table if not exists {table_q} (version bigint not null primary key, status smallint not null, executed_at timestamp with time zone);"
    );
    client.batch_execute(&create).await?;

    let indexes = format!(
        "create index if not exists status_idx on {table_q}(status);\
         create index if not exists executed_at_idx on {table_q}(executed_at);"
    );
    client.batch_execute(&indexes).await?;

    let comments = format!(
        "comment on table {table_q} is 'pgmigrator bookkeeping table';\
         comment on column {table_q}.version is 'migration version, derived from the migration file or registration identity';\
         comment on column {table_q}.status is '1 = processing, 2 = success, 3 = error';\
         comment on column {table_q}.executed_at is 'timestamp of the last status transition';"
    );
    client.batch_execute(&comments).await?;
    Ok(())
}

/// Of `candidates`, return the subset already recorded as anything other
/// than `Processing` — i.e. already claimed and resolved (`Success` or
/// `Error`) by a prior run. The Engine treats these as already handled
/// and skips them, which is what makes a second `up` a no-op; a row still
/// `Processing` is left out on purpose (see the open question in
/// DESIGN.md about long-orphaned `Processing` rows) so it gets re-claimed.
pub async fn find_new(
    client: &impl GenericClient,
    table: &str,
    candidates: &[i64],
) -> OrmResult<std::collections::HashSet<i64>> {
    if candidates.is_empty() {
        return Ok(std::collections::HashSet::new());
    }
    let table_q = quote_table_name(table)?;
    let sql = format!(
        "select version from {table_q} where version = any($1) and status <> $2 for update"
    );
    match client
        .query(&sql, &[&candidates, &VersionStatus::Processing.as_i16()])
        .await
    {
        Ok(rows) => Ok(rows.into_iter().map(|r| r.get::<_, i64>(0)).collect()),
        Err(MigratorError::Db(e)) if MigratorError::is_undefined_table(&e) => {
            Ok(std::collections::HashSet::new())
        }
        Err(e) => Err(e),
    }
}

/// An open claim on a single version: a transaction holding a row lock
/// (`select ... for update`) on `version`'s bookkeeping row, established
/// by inserting it as `Processing` (on-conflict-do-nothing, so a
/// re-claim of an existing row still acquires the lock).
///
/// The migration payload must run *outside* this transaction — some DDL
/// (`create index concurrently`) cannot run inside one at all. Call
/// [`Claim::commit_success`] or [`Claim::commit_error`] once the payload
/// has finished to record the terminal status and release the lock.
///
/// Acquiring the lock only proves exclusivity from this point forward:
/// if another runner's claim on the same version committed while this
/// one was blocked waiting for the lock, the row is already terminal
/// ([`Claim::already_resolved`]) and the payload must not run again.
pub struct Claim<'a> {
    tx: tokio_postgres::Transaction<'a>,
    table_q: String,
    pub version: i64,
    status: VersionStatus,
}

/// Open a claim transaction on `version` against `conn`.
pub async fn claim<'a, C: crate::client::Claimable>(
    conn: &'a mut C,
    table: &str,
    version: i64,
) -> OrmResult<Claim<'a>> {
    let table_q = quote_table_name(table)?;
    let tx = conn.client_mut().transaction().await?;

    let insert = format!(
        "insert into {table_q}(version, status) values($1, $2) on conflict do nothing"
    );
    tx.execute(&insert, &[&version, &VersionStatus::Processing.as_i16()])
        .await?;

    let lock = format!("select status from {table_q} where version = $1 for update");
    let row = tx.query_one(&lock, &[&version]).await?;
    let status_raw: i16 = row.get(0);
    let status = VersionStatus::from_i16(status_raw).unwrap_or(VersionStatus::Processing);

    Ok(Claim { tx, table_q, version, status })
}

impl Claim<'_> {
    /// True if the row was already `Success`/`Error` by the time this
    /// claim acquired its lock — another runner finished it first while
    /// this one waited. The caller must skip the payload and let the
    /// claim be released via [`Claim::rollback`] rather than executing.
    pub fn already_resolved(&self) -> bool {
        self.status != VersionStatus::Processing
    }

    async fn set_status(&self, status: VersionStatus) -> OrmResult<()> {
        let sql = format!(
            "update {} set status = $1, executed_at = current_timestamp where version = $2",
            self.table_q
        );
        self.tx.execute(&sql, &[&status.as_i16(), &self.version]).await?;
        Ok(())
    }

    /// Record `Success` and commit, releasing the row lock.
    pub async fn commit_success(self) -> OrmResult<()> {
        self.set_status(VersionStatus::Success).await?;
        self.tx.commit().await?;
        Ok(())
    }

    /// Record `Error` and commit — an errored version stays recorded so
    /// forward motion past it is blocked until it's addressed.
    pub async fn commit_error(self) -> OrmResult<()> {
        self.set_status(VersionStatus::Error).await?;
        self.tx.commit().await?;
        Ok(())
    }

    /// Abandon the claim without recording any status, releasing the
    /// lock via rollback. Used when the row turned out to be
    /// [`already_resolved`](Self::already_resolved), or when something
    /// downstream of lock acquisition fails before any payload has run.
    pub async fn rollback(self) -> OrmResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// All versions currently recorded with `status`.
pub async fn versions_with_status(
    client: &impl GenericClient,
    table: &str,
    status: VersionStatus,
) -> OrmResult<Vec<i64>> {
    let table_q = quote_table_name(table)?;
    let sql = format!("select version from {table_q} where status = $1 order by version");
    match client.query(&sql, &[&status.as_i16()]).await {
        Ok(rows) => Ok(rows.into_iter().map(|r| r.get::<_, i64>(0)).collect()),
        Err(MigratorError::Db(e)) if MigratorError::is_undefined_table(&e) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// The recorded status of a single version, or `None` if it has no row.
pub async fn status_of(
    client: &impl GenericClient,
    table: &str,
    version: i64,
) -> OrmResult<Option<VersionStatus>> {
    let table_q = quote_table_name(table)?;
    let sql = format!("select status from {table_q} where version = $1");
    let row = match client.query_opt(&sql, &[&version]).await {
        Ok(row) => row,
        Err(MigratorError::Db(e)) if MigratorError::is_undefined_table(&e) => None,
        Err(e) => return Err(e),
    };
    Ok(row.map(|r| {
        let raw: i16 = r.get(0);
        VersionStatus::from_i16(raw).unwrap_or(VersionStatus::Error)
    }))
}

/// The version with the latest `executed_at`, or `0` if the table is
/// empty or absent (no migration has ever run). Ties on `executed_at`
/// are broken by version, highest first (I5); a plain `max(executed_at)`
/// equality join has no such tie-break and errors out on a genuine tie,
/// so the max and the pick are done in one ordered, limited query instead.
pub async fn last_version(client: &impl GenericClient, table: &str) -> OrmResult<i64> {
    let table_q = quote_table_name(table)?;
    let sql = format!(
        "select version from {table_q} where executed_at is not null \
         order by executed_at desc, version desc limit 1"
    );
    let rows = match client.query(&sql, &[]).await {
        Ok(rows) => rows,
        Err(MigratorError::Db(e)) if MigratorError::is_undefined_table(&e) => Vec::new(),
        Err(e) => return Err(e),
    };
    Ok(rows.first().map(|r| r.get::<_, i64>(0)).unwrap_or(0))
}

/// Remove a version's row entirely (used by `down`, once the down
/// payload has executed successfully).
pub async fn delete(client: &impl GenericClient, table: &str, version: i64) -> OrmResult<()> {
    let table_q = quote_table_name(table)?;
    let sql = format!("delete from {table_q} where version = $1");
    client.execute(&sql, &[&version]).await?;
    Ok(())
}

/// Every row in the table, ordered by `executed_at`. `Processing` rows
/// report `executed_at = None` regardless of what's stored, since a
/// migration in flight has no meaningful "last run" timestamp yet.
pub async fn list_all(client: &impl GenericClient, table: &str) -> OrmResult<Vec<VersionRow>> {
    let table_q = quote_table_name(table)?;
    let sql = format!("select version, status, executed_at from {table_q} order by executed_at");
    let rows = match client.query(&sql, &[]).await {
        Ok(rows) => rows,
        Err(MigratorError::Db(e)) if MigratorError::is_undefined_table(&e) => Vec::new(),
        Err(e) => return Err(e),
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let version: i64 = row.get(0);
        let status_raw: i16 = row.get(1);
        let status = VersionStatus::from_i16(status_raw).unwrap_or(VersionStatus::Error);
        let executed_at: Option<chrono::DateTime<chrono::Utc>> = if status == VersionStatus::Processing {
            None
        } else {
            row.get(2)
        };
        out.push(VersionRow { version, status, executed_at });
    }
    Ok(out)
}

/// Run a migration payload verbatim, outside of any claim transaction.
pub async fn exec(client: &impl crate::client::BatchExec, sql: &str) -> OrmResult<()> {
    client.batch_execute(sql).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_table_name_accepts_plain_identifier() {
        assert_eq!(quote_table_name("dbmigrator_version").unwrap(), "\"dbmigrator_version\"");
    }

    #[test]
    fn quote_table_name_accepts_schema_qualified() {
        assert_eq!(
            quote_table_name("app.dbmigrator_version").unwrap(),
            "\"app\".\"dbmigrator_version\""
        );
    }

    #[test]
    fn quote_table_name_rejects_injection_attempt() {
        assert!(quote_table_name("t; drop table users;--").is_err());
        assert!(quote_table_name("").is_err());
        assert!(quote_table_name("a..b").is_err());
    }
}
