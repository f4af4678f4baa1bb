//! Error types for pgmigrator

use thiserror::Error;

/// Result type alias for pgmigrator operations
pub type OrmResult<T> = Result<T, MigratorError>;

/// Error types for the migration engine.
#[derive(Debug, Error)]
pub enum MigratorError {
    /// The configured migration path is not a directory.
    #[error("is not dir: {0}")]
    IsNotDir(String),

    /// An up migration has no matching down migration on disk.
    #[error("down migration is not exist: {0}")]
    DownMigrationIsNotExist(String),

    /// A prior version is recorded as `Error`; forward motion is blocked.
    #[error("there is unfinished migrations: {0}")]
    UnfinishedMigrations(i64),

    /// A targeted version is absent from the catalog or the store.
    #[error("version has not been found: {0}")]
    VersionHasNotBeenFound(i64),

    /// A migration payload failed to execute.
    #[error("migration error in {file}: {source}")]
    Migration {
        file: String,
        sql: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Database connection or query error.
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// Filesystem error reading/writing migration artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection pool error.
    #[cfg(feature = "pool")]
    #[error("pool error: {0}")]
    Pool(String),

    /// Any other condition that doesn't warrant its own variant.
    #[error("{0}")]
    Other(String),
}

impl MigratorError {
    /// Build a [`MigratorError::Migration`] from a failed payload execution.
    pub fn migration(source: tokio_postgres::Error, sql: impl Into<String>, file: impl Into<String>) -> Self {
        Self::Migration {
            file: file.into(),
            sql: sql.into(),
            source,
        }
    }

    /// Parse a `tokio_postgres` error, classifying "relation does not exist"
    /// (SQLSTATE `42P01`) so callers can treat a not-yet-created bookkeeping
    /// table as "no rows" rather than a hard failure.
    pub fn is_undefined_table(err: &tokio_postgres::Error) -> bool {
        err.as_db_error().is_some_and(|db| db.code().code() == "42P01")
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for MigratorError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
