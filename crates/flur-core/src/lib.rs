pub mod circuit_breaker;
pub mod crawl;
pub mod document;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod models;
pub mod pacing;
pub mod privacy;
pub mod producer;
pub mod source;
pub mod traits;
pub mod util;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::AppError;
pub use models::{AuditEvent, Document, NewEvidence, Profile, compute_hash};
pub use traits::{Connector, ConnectorSelector, EntityRecognizer, Fetcher};
