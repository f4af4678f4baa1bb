//! # pgmigrator
//!
//! A transactional PostgreSQL schema migration engine.
//!
//! - **Claim-based concurrency**: at most one runner executes a given
//!   version, enforced by `for update` row locks rather than an
//!   application-level mutex.
//! - **Payload outside the claim transaction**: migration SQL (including
//!   non-transactional DDL like `create index concurrently`) runs
//!   unwrapped; only the bookkeeping row transitions inside a transaction.
//! - **File or compiled-in migrations**: SQL files on disk, or Rust
//!   functions registered with [`register_migration!`].

pub mod catalog;
pub mod client;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod result;
pub mod store;

#[cfg(feature = "pool")]
pub mod engine;

#[cfg(feature = "pool")]
pub mod pool;

pub use client::GenericClient;
pub use error::{MigratorError, OrmResult};
pub use registry::{Registry, RegisteredMigration};
pub use result::{Direction, MigrationResult, VersionRow, VersionStatus};

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};

/// Re-exported so [`register_migration!`] can refer to `$crate::inventory`
/// without requiring downstream crates to depend on `inventory` directly.
pub use inventory;
