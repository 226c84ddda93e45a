//! # lectern-db
//!
//! PostgreSQL storage layer for the lectern library element store.
//!
//! This crate provides:
//! - Connection pool management
//! - Transactional, optionally schema-scoped sessions
//! - Permission-scoped library element and connection repositories
//! - The folder permission resolver backed by `dashboard` / `dashboard_acl`
//!
//! ## Example
//!
//! ```rust,ignore
//! use lectern_db::{CreateLibraryElementCommand, Database, ElementKind, LibraryElementRepository};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/lectern").await?;
//!
//!     let element = db.library_elements.create(CreateLibraryElementCommand {
//!         folder_id: 0,
//!         name: "CPU".to_string(),
//!         model: json!({"type": "graph"}),
//!         kind: ElementKind::Panel,
//!         uid: None,
//!     }, &user).await?;
//!
//!     println!("Created {} at version {}", element.uid, element.version);
//!     Ok(())
//! }
//! ```
pub mod connections;
pub mod library_elements;
pub mod permissions;
pub mod pool;
pub mod query_builder;
pub mod schema_validation;
pub mod session;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use lectern_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub use connections::{count_connections, has_connections, PgConnectionRepository};
pub use library_elements::PgLibraryElementRepository;
pub use permissions::{
    authorize_folder_move, effective_permission, require_folder_write, FolderPermission,
    FolderPermissions, PgFolderPermissions,
};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use query_builder::{bind_params, LibraryElementQueryBuilder, QueryParam};
pub use schema_validation::validate_schema_name;
pub use session::{SessionFuture, SessionProvider};

use std::sync::Arc;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Session provider shared by the repositories.
    pub sessions: SessionProvider,
    /// Library element CRUD and search.
    pub library_elements: PgLibraryElementRepository,
    /// Dashboard connections to library elements.
    pub connections: PgConnectionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_sessions(SessionProvider::new(pool))
    }

    /// Create a Database whose sessions are scoped to `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema name is invalid or unsafe.
    pub fn for_schema(pool: sqlx::Pool<sqlx::Postgres>, schema: &str) -> Result<Self> {
        Ok(Self::with_sessions(SessionProvider::for_schema(pool, schema)?))
    }

    fn with_sessions(sessions: SessionProvider) -> Self {
        Self {
            pool: sessions.pool().clone(),
            library_elements: PgLibraryElementRepository::new(sessions.clone()),
            connections: PgConnectionRepository::new(sessions.clone()),
            sessions,
        }
    }

    /// Use a custom folder permission resolver for every repository.
    pub fn with_permissions(mut self, permissions: Arc<dyn FolderPermissions>) -> Self {
        self.library_elements = self
            .library_elements
            .with_permissions(Arc::clone(&permissions));
        self.connections = self.connections.with_permissions(permissions);
        self
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
