//! In-process registry for compiled-in migrations, living alongside
//! file-based ones.
//!
//! Identifying a registration by walking the call stack would tie its
//! identity to wherever the macro happens to be invoked from and has no
//! clean equivalent here; instead, every registration carries its version
//! explicitly, the same way file-derived versions are parsed from a
//! filename.

use crate::error::OrmResult;
use std::future::Future;
use std::pin::Pin;

/// A migration function: given a live connection, produce the SQL text
/// to execute (or fail before ever touching the database).
pub type MigrationFn =
    for<'a> fn(&'a tokio_postgres::Client) -> Pin<Box<dyn Future<Output = OrmResult<String>> + Send + 'a>>;

/// One compiled-in migration: an explicit version plus its up and down
/// callables.
#[derive(Clone, Copy)]
pub struct RegisteredMigration {
    pub version: i64,
    pub up: MigrationFn,
    pub down: MigrationFn,
}

/// An explicit, constructible collection of compiled-in migrations.
///
/// Unlike the Go `Executor`, this type holds no global mutable state of
/// its own — a `Registry` is built by the caller (typically by draining
/// [`inventory`]'s process-wide collection once at startup) and handed
/// to [`engine::up`](crate::engine::up) (and friends) explicitly.
#[derive(Default, Clone)]
pub struct Registry {
    entries: Vec<RegisteredMigration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration under an explicit version. Insertion order
    /// is preserved for iteration, though the Engine always executes in
    /// ascending version order regardless.
    pub fn add(&mut self, version: i64, up: MigrationFn, down: MigrationFn) {
        self.entries.push(RegisteredMigration { version, up, down });
    }

    /// All registered migrations, insertion order.
    pub fn entries(&self) -> &[RegisteredMigration] {
        &self.entries
    }

    /// Find a registration by version.
    pub fn get(&self, version: i64) -> Option<&RegisteredMigration> {
        self.entries.iter().find(|e| e.version == version)
    }

    /// Versions of every registered migration, ascending.
    pub fn versions(&self) -> Vec<i64> {
        let mut v: Vec<i64> = self.entries.iter().map(|e| e.version).collect();
        v.sort_unstable();
        v
    }

    /// Drop every registration. Test hook, mirrors the Go `executor.reset()`.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Build a registry from every migration declared process-wide via
    /// [`register_migration!`].
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();
        for item in inventory::iter::<InventoryMigration> {
            registry.add(item.version, item.up, item.down);
        }
        registry
    }
}

/// A single process-wide declaration collected by [`inventory`]. Built by
/// [`register_migration!`]; not constructed directly.
pub struct InventoryMigration {
    pub version: i64,
    pub up: MigrationFn,
    pub down: MigrationFn,
}

inventory::collect!(InventoryMigration);

/// Declare a compiled-in migration at a fixed version, discovered
/// process-wide at startup via [`Registry::from_inventory`].
///
/// ```ignore
/// register_migration!(20240601, up_20240601, down_20240601);
///
/// async fn up_20240601(_client: &tokio_postgres::Client) -> pgmigrator::error::OrmResult<String> {
///     Ok("alter table widgets add column color text;".to_string())
/// }
/// ```
#[macro_export]
macro_rules! register_migration {
    ($version:expr, $up:path, $down:path) => {
        $crate::inventory::submit! {
            $crate::registry::InventoryMigration {
                version: $version,
                up: |client| ::std::boxed::Box::pin($up(client)),
                down: |client| ::std::boxed::Box::pin($down(client)),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_fn(_client: &tokio_postgres::Client) -> Pin<Box<dyn Future<Output = OrmResult<String>> + Send + '_>> {
        Box::pin(async { Ok(String::new()) })
    }

    #[test]
    fn add_preserves_insertion_order_but_versions_sorts() {
        let mut registry = Registry::new();
        registry.add(30, noop_fn, noop_fn);
        registry.add(10, noop_fn, noop_fn);
        registry.add(20, noop_fn, noop_fn);

        let insertion: Vec<i64> = registry.entries().iter().map(|e| e.version).collect();
        assert_eq!(insertion, vec![30, 10, 20]);
        assert_eq!(registry.versions(), vec![10, 20, 30]);
    }

    #[test]
    fn get_finds_by_version() {
        let mut registry = Registry::new();
        registry.add(42, noop_fn, noop_fn);
        assert!(registry.get(42).is_some());
        assert!(registry.get(7).is_none());
    }

    #[test]
    fn reset_clears_entries() {
        let mut registry = Registry::new();
        registry.add(1, noop_fn, noop_fn);
        registry.reset();
        assert!(registry.entries().is_empty());
    }
}
