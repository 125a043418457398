pub mod audit_repository;
pub mod config;
pub mod database;
pub mod evidence_repository;
pub mod job_repository;
pub mod parcel;
pub mod profile_repository;

pub use audit_repository::PgAuditLog;
pub use config::DatabaseConfig;
pub use database::Database;
pub use evidence_repository::PgEvidenceStore;
pub use job_repository::PgJobQueue;
pub use parcel::PgParcelEngine;
pub use profile_repository::PgProfileStore;
