use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{JobRecord, RunStatus, ScrapeRun};
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Database representation of a scrape run
#[derive(Debug, FromRow)]
pub struct ScrapeRunRow {
    pub company_key: String,
    pub run_id: Option<Uuid>,
    pub status: String,
    pub source_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub inserted: i64,
    pub skipped: i64,
}

impl TryFrom<ScrapeRunRow> for ScrapeRun {
    type Error = RegistryError;

    fn try_from(row: ScrapeRunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row.status.parse().map_err(|reason| RegistryError::Corrupt {
            company: row.company_key.clone(),
            reason,
        })?;

        Ok(ScrapeRun {
            company_key: row.company_key,
            run_id: row.run_id,
            status,
            source_url: row.source_url,
            started_at: row.started_at,
            finished_at: row.finished_at,
            error: row.error,
            inserted: row.inserted.max(0) as u64,
            skipped: row.skipped.max(0) as u64,
        })
    }
}

/// Database representation of an imported job record
#[derive(Debug, FromRow)]
pub struct JobRecordRow {
    pub id: String,
    pub company: String,
    pub title: String,
    pub location: String,
    pub department: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub skills: Vec<String>,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl TryFrom<JobRecordRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRecordRow) -> Result<Self, Self::Error> {
        if row.title.trim().is_empty() {
            return Err(StoreError::Corrupt {
                id: row.id,
                reason: "empty title".to_string(),
            });
        }

        Ok(JobRecord {
            id: row.id,
            company: row.company,
            title: row.title,
            location: row.location,
            department: row.department,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            skills: row.skills.into_iter().collect::<BTreeSet<_>>(),
            source_url: row.source_url,
            scraped_at: row.scraped_at,
        })
    }
}
