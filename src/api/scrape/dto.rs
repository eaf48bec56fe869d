use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{JobRecord, RunStatus, ScrapeRun};

/// Body of `POST /scrape`
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StartScrapeRequest {
    #[validate(url(message = "source_url must be an absolute URL"))]
    pub source_url: String,

    /// Explicit company key; derived from `source_url` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "Company must be between 1 and 100 characters"))]
    pub company: Option<String>,
}

/// Query string of `POST /scrape`
#[derive(Debug, Default, Deserialize)]
pub struct StartScrapeParams {
    /// Legacy synchronous mode: run the worker inline and return its records
    #[serde(default)]
    pub wait: bool,
}

/// Response of `POST /scrape`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartScrapeResponse {
    Started {
        company_key: String,
        run_id: Option<Uuid>,
        started_at: Option<DateTime<Utc>>,
    },
    AlreadyActive {
        company_key: String,
        run_id: Option<Uuid>,
        started_at: Option<DateTime<Utc>>,
    },
    Completed {
        company_key: String,
        inserted: u64,
        skipped: u64,
        records: Vec<JobRecord>,
    },
}

/// `?company=` query used by the status, summary and clear endpoints
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CompanyQuery {
    #[validate(length(min = 1, max = 100, message = "Company must be between 1 and 100 characters"))]
    pub company: String,
}

/// Response of `GET /scrape-status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusResponse {
    pub company_key: String,
    pub is_active: bool,
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub source_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub error: Option<String>,
    pub inserted: u64,
    pub skipped: u64,
}

impl RunStatusResponse {
    pub fn from_run(run: ScrapeRun, now: DateTime<Utc>) -> Self {
        Self {
            is_active: run.status == RunStatus::Active,
            duration_secs: run.duration_secs(now),
            company_key: run.company_key,
            status: run.status,
            run_id: run.run_id,
            source_url: run.source_url,
            started_at: run.started_at,
            finished_at: run.finished_at,
            error: run.error,
            inserted: run.inserted,
            skipped: run.skipped,
        }
    }
}

/// Response of `GET /summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub company_key: String,
    pub record_count: usize,
    pub records: Vec<JobRecord>,
}

/// Response of `DELETE /scrape-status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
    pub company_key: String,
}
