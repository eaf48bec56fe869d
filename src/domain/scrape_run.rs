use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error recorded on a run that outlived the maximum active duration
pub const ABANDONED_RUN_ERROR: &str = "run exceeded max active duration";

/// Scrape run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Active,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Active => "active",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunStatus::Idle),
            "active" => Ok(RunStatus::Active),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// How a worker finished a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { inserted: u64, skipped: u64 },
    Failed { error: String },
}

/// One scrape run per company, owned by the run registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub company_key: String,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub source_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub inserted: u64,
    pub skipped: u64,
}

impl ScrapeRun {
    pub fn idle(company_key: impl Into<String>) -> Self {
        Self {
            company_key: company_key.into(),
            run_id: None,
            status: RunStatus::Idle,
            source_url: None,
            started_at: None,
            finished_at: None,
            error: None,
            inserted: 0,
            skipped: 0,
        }
    }

    /// A fresh `Active` run with a new run id
    pub fn activate(
        company_key: impl Into<String>,
        source_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Some(Uuid::new_v4()),
            status: RunStatus::Active,
            source_url: Some(source_url.into()),
            started_at: Some(now),
            ..Self::idle(company_key)
        }
    }

    /// `Active` and started more than `max_age` ago
    pub fn is_abandoned(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (self.status, self.started_at) {
            (RunStatus::Active, Some(started)) => now - started >= max_age,
            (RunStatus::Active, None) => true,
            _ => false,
        }
    }

    /// `Active` and still within `max_age`
    pub fn is_active(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.status == RunStatus::Active && !self.is_abandoned(now, max_age)
    }

    /// The run as callers should see it at `now`
    ///
    /// An abandoned run is reported as `Failed` without touching stored state.
    pub fn effective(mut self, now: DateTime<Utc>, max_age: Duration) -> Self {
        if self.is_abandoned(now, max_age) {
            self.status = RunStatus::Failed;
            self.error = Some(ABANDONED_RUN_ERROR.to_string());
        }
        self
    }

    /// Apply a worker outcome
    pub fn finish(&mut self, outcome: RunOutcome, now: DateTime<Utc>) {
        self.finished_at = Some(now);
        match outcome {
            RunOutcome::Completed { inserted, skipped } => {
                self.status = RunStatus::Completed;
                self.inserted = inserted;
                self.skipped = skipped;
                self.error = None;
            }
            RunOutcome::Failed { error } => {
                self.status = RunStatus::Failed;
                self.error = Some(error);
            }
        }
    }

    /// Coarse run duration in whole seconds; open runs are measured up to `now`
    pub fn duration_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now);
        Some((end - started).num_seconds().max(0))
    }
}
