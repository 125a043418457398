use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use flur_core::error::AppError;
use flur_core::models::Profile;
use flur_core::traits::ProfileStore;

/// `scout_profiles` access.
///
/// Rows are read as JSON so that columns this crate does not model still
/// travel in [`Profile::extra`] and end up in the `crawl_profile` payload.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: Pool<Postgres>,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a profile and return the stored record.
    pub async fn create(
        &self,
        name: &str,
        url: Option<&str>,
        oparl_url: Option<&str>,
    ) -> Result<Profile, AppError> {
        let record: serde_json::Value = sqlx::query_scalar(
            r#"
            WITH inserted AS (
                INSERT INTO scout_profiles (name, url, oparl_url)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT to_jsonb(inserted) FROM inserted
            "#,
        )
        .bind(name)
        .bind(url)
        .bind(oparl_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(serde_json::from_value(record)?)
    }

    pub async fn get(&self, profile_id: Uuid) -> Result<Option<Profile>, AppError> {
        let record: Option<serde_json::Value> =
            sqlx::query_scalar(r#"SELECT to_jsonb(p) FROM scout_profiles p WHERE p.id = $1"#)
                .bind(profile_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        record
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub async fn set_active(&self, profile_id: Uuid, active: bool) -> Result<(), AppError> {
        sqlx::query(r#"UPDATE scout_profiles SET active = $2 WHERE id = $1"#)
            .bind(profile_id)
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

impl ProfileStore for PgProfileStore {
    async fn active_profiles(&self) -> Result<Vec<Profile>, AppError> {
        let records: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT to_jsonb(p) FROM scout_profiles p
            WHERE p.active
            ORDER BY p.last_scout_at NULLS FIRST, p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let mut profiles = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Profile>(record) {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed profile row"),
            }
        }
        Ok(profiles)
    }

    async fn mark_scouted(&self, profile_id: Uuid) -> Result<(), AppError> {
        sqlx::query(r#"UPDATE scout_profiles SET last_scout_at = NOW() WHERE id = $1"#)
            .bind(profile_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
