//! Transactional session provider.
//!
//! Every repository operation runs inside a session handed out here. A
//! session is a PostgreSQL transaction, optionally scoped to a schema via
//! `SET LOCAL search_path`. Closures return an error to roll back; the
//! provider commits on success.

use std::future::Future;
use std::pin::Pin;

use lectern_core::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::schema_validation::validate_schema_name;

/// Boxed future returned by session closures.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Hands out transactional sessions over a connection pool.
///
/// ```rust,ignore
/// let sessions = SessionProvider::new(pool);
/// let count = sessions
///     .run_read_only(|tx| Box::pin(async move {
///         let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM library_element")
///             .fetch_one(&mut **tx)
///             .await?;
///         Ok(row.0)
///     }))
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct SessionProvider {
    pool: PgPool,
    schema: Option<String>,
}

impl SessionProvider {
    /// Sessions on the connection's default search_path.
    pub fn new(pool: PgPool) -> Self {
        Self { pool, schema: None }
    }

    /// Sessions scoped to `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the schema name is unsafe.
    pub fn for_schema(pool: PgPool, schema: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        validate_schema_name(&schema)?;
        Ok(Self {
            pool,
            schema: Some(schema),
        })
    }

    /// Schema every session is scoped to, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` in a read-write transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls it back.
    pub async fn run_in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Transaction<'_, Postgres>) -> SessionFuture<'a, T> + Send,
        T: Send,
    {
        let mut tx = self.begin().await?;
        let result = f(&mut tx).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(result)
    }

    /// Run `f` in a read-only transaction.
    pub async fn run_read_only<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Transaction<'_, Postgres>) -> SessionFuture<'a, T> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        self.apply_schema(&mut tx).await?;

        let result = f(&mut tx).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(result)
    }

    /// Begin a read-write transaction with the schema already applied.
    ///
    /// The caller is responsible for committing or rolling back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.apply_schema(&mut tx).await?;
        Ok(tx)
    }

    async fn apply_schema(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        debug!(
            subsystem = "database",
            component = "session",
            schema = %schema,
            "Scoping session search_path"
        );
        // Not parameterizable; the name was validated on construction.
        let set_search_path = format!("SET LOCAL search_path TO {}, public", schema);
        sqlx::query(&set_search_path)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
