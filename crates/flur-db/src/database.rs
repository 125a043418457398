use flur_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::audit_repository::PgAuditLog;
use crate::config::DatabaseConfig;
use crate::evidence_repository::PgEvidenceStore;
use crate::job_repository::PgJobQueue;
use crate::parcel::PgParcelEngine;
use crate::profile_repository::PgProfileStore;

/// Owns the connection pool, runs migrations and vends repositories.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to connect to {}: {e}",
                    config.redacted_url()
                ))
            })?;

        tracing::debug!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Database pool ready"
        );
        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Health check failed: {e}")))?;
        Ok(())
    }

    pub fn job_queue(&self) -> PgJobQueue {
        PgJobQueue::new(self.pool.clone())
    }

    pub fn profiles(&self) -> PgProfileStore {
        PgProfileStore::new(self.pool.clone())
    }

    pub fn evidence(&self) -> PgEvidenceStore {
        PgEvidenceStore::new(self.pool.clone())
    }

    pub fn audit_log(&self) -> PgAuditLog {
        PgAuditLog::new(self.pool.clone())
    }

    /// Probe for the parcel function. Call once at startup.
    pub async fn parcel_engine(&self) -> Result<PgParcelEngine, AppError> {
        PgParcelEngine::detect(&self.pool).await
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
