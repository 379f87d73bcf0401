//! # rewind-db
//!
//! PostgreSQL backend for rewind.
//!
//! This crate provides:
//! - Connection pool management
//! - A JSONB document store implementing `DocumentCollection`
//! - History log and change ledger repositories
//!
//! ## Example
//!
//! ```rust,ignore
//! use rewind_db::{Database, DocumentCollection, Document};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/rewind").await?;
//!     let annotations = db.collection("annotation");
//!     let stored = annotations
//!         .insert_or_replace(&Document::from_json(serde_json::json!({"label": "cell"}))?)
//!         .await?;
//!     println!("Stored annotation: {}", stored.id);
//!     Ok(())
//! }
//! ```
pub mod documents;
pub mod filter;
pub mod history;
pub mod pool;

// Test fixtures for integration tests
pub mod test_fixtures;

// Re-export core types
pub use rewind_core::*;

pub use documents::PgDocumentCollection;
pub use filter::{order_and_page, DocumentFilterQueryBuilder, QueryParam};
pub use history::PgHistoryRepository;
pub use pool::{connect_pool, PoolConfig, PoolStatus};

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// History log and change ledger repository.
    pub history: PgHistoryRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            history: PgHistoryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
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

    /// Document collection handle stored under `name`.
    pub fn collection(&self, name: impl Into<String>) -> PgDocumentCollection {
        PgDocumentCollection::new(self.pool.clone(), name)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Current pool occupancy.
    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus::of(&self.pool)
    }
}
