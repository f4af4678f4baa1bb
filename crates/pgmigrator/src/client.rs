//! Generic client trait unifying `tokio_postgres::Client`, `Transaction`,
//! and (behind the `pool` feature) a pooled `deadpool_postgres::Client`.
//!
//! The [`Store`](crate::store) module is written against these traits so
//! the same bookkeeping-table operations work whether the caller hands us
//! a bare connection or one checked out of a pool.

use crate::error::OrmResult;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Query/execute operations shared by anything that can run parameterized
/// SQL: a connection, a transaction, or a pooled client.
pub trait GenericClient: Send + Sync {
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<Vec<Row>>> + Send;

    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<Option<Row>>> + Send;

    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;
}

/// Statement execution that doesn't take bound parameters — used for DDL
/// (`ensure_table`) and for running a migration payload verbatim, which
/// may contain any number of semicolon-separated statements.
pub trait BatchExec: Send + Sync {
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<()>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        Ok(tokio_postgres::Client::query(self, sql, params).await?)
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Option<Row>> {
        Ok(tokio_postgres::Client::query_opt(self, sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Client::execute(self, sql, params).await?)
    }
}

impl BatchExec for tokio_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        Ok(tokio_postgres::Client::batch_execute(self, sql).await?)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        Ok(tokio_postgres::Transaction::query(self, sql, params).await?)
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Option<Row>> {
        Ok(tokio_postgres::Transaction::query_opt(self, sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Transaction::execute(self, sql, params).await?)
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        Ok(tokio_postgres::Client::query(self, sql, params).await?)
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Option<Row>> {
        Ok(tokio_postgres::Client::query_opt(self, sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Client::execute(self, sql, params).await?)
    }
}

#[cfg(feature = "pool")]
impl BatchExec for deadpool_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        Ok(tokio_postgres::Client::batch_execute(self, sql).await?)
    }
}

/// Connections that can hand out a `&mut tokio_postgres::Client` to open
/// a claim transaction on. Implemented for a bare client (trivially) and
/// for a pooled client (by dereferencing through `deadpool_postgres`'s
/// wrapper down to the `tokio_postgres::Client` it manages).
pub trait Claimable: GenericClient + BatchExec {
    fn client_mut(&mut self) -> &mut tokio_postgres::Client;
}

impl Claimable for tokio_postgres::Client {
    fn client_mut(&mut self) -> &mut tokio_postgres::Client {
        self
    }
}

#[cfg(feature = "pool")]
impl Claimable for deadpool_postgres::Client {
    fn client_mut(&mut self) -> &mut tokio_postgres::Client {
        use std::ops::DerefMut;
        self.deref_mut().deref_mut()
    }
}
