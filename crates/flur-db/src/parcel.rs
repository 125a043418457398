use sqlx::PgPool;

use flur_core::error::AppError;
use flur_core::traits::ParcelEngine;

/// Name of the optional store function computing virtual parcels.
pub const PARCEL_FUNCTION: &str = "calculate_virtual_parcel";

/// Virtual-parcel calculation backed by the database, resolved once at
/// startup.
///
/// Deployments without the geometry function get [`PgParcelEngine::Unavailable`]
/// and every parcel job fails with a configuration error (and is retried).
#[derive(Clone)]
pub enum PgParcelEngine {
    Rpc(PgPool),
    Unavailable,
}

impl PgParcelEngine {
    pub async fn detect(pool: &PgPool) -> Result<Self, AppError> {
        let available: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = $1)"#)
                .bind(PARCEL_FUNCTION)
                .fetch_one(pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if available {
            tracing::info!(function = PARCEL_FUNCTION, "Parcel engine: database RPC");
            Ok(Self::Rpc(pool.clone()))
        } else {
            tracing::warn!(
                function = PARCEL_FUNCTION,
                "Parcel engine unavailable, calculate_parcel jobs will fail"
            );
            Ok(Self::Unavailable)
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl ParcelEngine for PgParcelEngine {
    async fn compute_virtual_parcel(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<serde_json::Value, AppError> {
        let pool = match self {
            Self::Rpc(pool) => pool,
            Self::Unavailable => {
                return Err(AppError::ConfigError(format!(
                    "{PARCEL_FUNCTION} is not installed in this database"
                )));
            }
        };

        let value: Option<serde_json::Value> = sqlx::query_scalar(
            r#"SELECT to_jsonb(calculate_virtual_parcel($1::float8, $2::float8))"#,
        )
        .bind(lat)
        .bind(lon)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(value.unwrap_or(serde_json::Value::Null))
    }
}
