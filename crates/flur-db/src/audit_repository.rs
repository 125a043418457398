use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use flur_core::error::AppError;
use flur_core::models::AuditEvent;
use flur_core::traits::AuditLog;

/// Writer for the append-only `audit_logs` table.
///
/// The `audit_logs_chain` trigger links each row to its predecessor; this
/// type only inserts. Every failure is an [`AppError::AuditError`].
#[derive(Clone)]
pub struct PgAuditLog {
    pool: Pool<Postgres>,
}

/// A stored audit row including its chain hashes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    pub action: String,
    pub resource: String,
    pub actor_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub curr_hash: String,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rows for a resource, oldest first.
    pub async fn for_resource(&self, resource: &str) -> Result<Vec<AuditRecord>, AppError> {
        sqlx::query_as::<_, AuditRecord>(
            r#"SELECT * FROM audit_logs WHERE resource = $1 ORDER BY id ASC"#,
        )
        .bind(resource)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::AuditError(e.to_string()))
    }

    /// Check that every row's `prev_hash` equals the previous row's
    /// `curr_hash`. Returns the id of the first broken link.
    pub async fn verify_chain(&self) -> Result<Option<i64>, AppError> {
        let broken: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM (
                SELECT id, prev_hash::text AS prev_hash,
                       LAG(curr_hash::text, 1, repeat('0', 64)) OVER (ORDER BY id) AS expected
                FROM audit_logs
            ) chain
            WHERE prev_hash <> expected
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::AuditError(e.to_string()))?;

        Ok(broken)
    }
}

impl AuditLog for PgAuditLog {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (action, resource, actor_id, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&event.action)
        .bind(&event.resource)
        .bind(&event.actor_id)
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::AuditError(e.to_string()))?;

        tracing::debug!(action = %event.action, resource = %event.resource, "Audit event recorded");
        Ok(())
    }
}
