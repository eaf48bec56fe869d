//! Scrape run registry
//!
//! Tracks at most one run per company. `start` is a compare-and-swap on the
//! run status: it only succeeds when no unexpired `Active` run exists.

mod memory;

pub use memory::MemoryRunRegistry;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{RunOutcome, ScrapeRun};

/// Registry-level errors
///
/// Losing a start race is not an error; see [`StartOutcome::AlreadyActive`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry storage error: {0}")]
    Storage(String),
    #[error("corrupt run record for {company}: {reason}")]
    Corrupt { company: String, reason: String },
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was recorded; the caller owns it and must spawn the worker
    Started(ScrapeRun),
    /// An unexpired run is already in flight for this company
    AlreadyActive(ScrapeRun),
}

impl StartOutcome {
    pub fn run(&self) -> &ScrapeRun {
        match self {
            StartOutcome::Started(run) | StartOutcome::AlreadyActive(run) => run,
        }
    }
}

#[async_trait]
pub trait RunRegistry: Send + Sync {
    /// Atomically mark a run `Active` unless one already is
    async fn start(&self, company_key: &str, source_url: &str)
        -> Result<StartOutcome, RegistryError>;

    /// Current run as observed now; abandoned runs read as `Failed`
    async fn status(&self, company_key: &str) -> Result<ScrapeRun, RegistryError>;

    /// Record a worker outcome for `run_id`
    ///
    /// Returns `false` when the run was cleared or replaced in the meantime.
    async fn complete(
        &self,
        company_key: &str,
        run_id: Uuid,
        outcome: RunOutcome,
    ) -> Result<bool, RegistryError>;

    /// Reset the company's run to `Idle`
    async fn clear(&self, company_key: &str) -> Result<(), RegistryError>;
}
