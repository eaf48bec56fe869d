use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::JobRecord;

/// Storage key of the in-progress marker for a company
pub fn state_key(company_key: &str) -> String {
    format!("scrape_state:{}", company_key)
}

/// Storage key of the cached completed result for a company
pub fn result_key(company_key: &str) -> String {
    format!("scrape_result:{}", company_key)
}

/// Durable "a run is in progress" marker that survives client restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRunState {
    pub is_active: bool,
    pub timestamp: DateTime<Utc>,
    pub company_key: String,
    pub source_url: String,
}

impl ClientRunState {
    pub fn active(
        company_key: impl Into<String>,
        source_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_active: true,
            timestamp: now,
            company_key: company_key.into(),
            source_url: source_url.into(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.timestamp > window
    }
}

/// Records observed when a run finished, cached per company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub company_key: String,
    pub records: Vec<JobRecord>,
    pub completed_at: DateTime<Utc>,
}
