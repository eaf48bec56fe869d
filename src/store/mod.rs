//! Result store for imported job records
//!
//! Uniqueness is enforced on [`JobRecord::identity_key`] by the store itself,
//! so concurrent imports never race on a check-then-insert.

mod memory;

pub use memory::MemoryResultStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::JobRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Storage(String),
    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Counts returned by a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub inserted: usize,
    pub skipped: usize,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert records whose identity key is new, skip the rest
    async fn import(&self, records: Vec<JobRecord>) -> Result<ImportResult, StoreError>;

    /// Records ordered by `scraped_at` then `id`, optionally for one company
    async fn list(&self, company_key: Option<&str>) -> Result<Vec<JobRecord>, StoreError>;

    /// Delete every record, or only one company's; returns rows removed
    async fn clear(&self, company_key: Option<&str>) -> Result<u64, StoreError>;

    /// Delete one record by id; `false` if it did not exist
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete several records by id; returns rows removed
    async fn delete_many(&self, ids: &[String]) -> Result<u64, StoreError>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<(), StoreError>;
}
