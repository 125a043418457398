use sqlx::{PgPool, Pool, Postgres};

use flur_core::error::AppError;
use flur_core::models::NewEvidence;
use flur_core::traits::EvidenceStore;

/// `evidence_docs` access. `external_id` is the upsert key; `content_hash`
/// is used to skip binaries that were already stored under another id.
#[derive(Clone)]
pub struct PgEvidenceStore {
    pool: Pool<Postgres>,
}

impl PgEvidenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count_for_region(&self, region_id: uuid::Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM evidence_docs WHERE region_id = $1"#)
                .bind(region_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}

impl EvidenceStore for PgEvidenceStore {
    async fn content_hash_exists(&self, content_hash: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM evidence_docs WHERE content_hash = $1)"#,
        )
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    async fn upsert(&self, evidence: &NewEvidence) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO evidence_docs (
                external_id, title, doc_type, published_date, url,
                region_id, relevant, risk_score, summary, content_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title,
                doc_type = EXCLUDED.doc_type,
                published_date = EXCLUDED.published_date,
                url = EXCLUDED.url,
                region_id = EXCLUDED.region_id,
                relevant = EXCLUDED.relevant,
                risk_score = EXCLUDED.risk_score,
                summary = EXCLUDED.summary,
                content_hash = COALESCE(EXCLUDED.content_hash, evidence_docs.content_hash),
                updated_at = NOW()
            "#,
        )
        .bind(&evidence.external_id)
        .bind(&evidence.title)
        .bind(&evidence.doc_type)
        .bind(&evidence.published_date)
        .bind(&evidence.url)
        .bind(evidence.region_id)
        .bind(evidence.relevant)
        .bind(evidence.risk_score)
        .bind(&evidence.summary)
        .bind(&evidence.content_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
