//! Database connection pool, migrations, and health check.
//!
//! One shared Postgres pool backs the job queue and both stores; the
//! submodules implement the [`JobQueue`](crate::queue::JobQueue),
//! [`RunStore`](crate::store::RunStore), and
//! [`CourseStore`](crate::store::CourseStore) contracts against it.

pub mod courses;
pub mod queue;
pub mod runs;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use tokio::sync::Mutex;

/// Database handle. Owns the connection pool shared across all modules.
pub struct Db {
    pool: PgPool,
    /// Lazily-initialized LISTEN connection for blocking dequeues.
    listener: Mutex<Option<PgListener>>,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            listener: Mutex::new(None),
        })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool (for submodules).
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
