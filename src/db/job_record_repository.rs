use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::db::models::JobRecordRow;
use crate::domain::{normalize_company, JobRecord};
use crate::store::{ImportResult, ResultStore, StoreError};

/// Rows per INSERT statement; 12 binds per row stays well under the 65535 limit
const IMPORT_CHUNK_SIZE: usize = 1000;

const RECORD_COLUMNS: &str = "id, company, title, location, department, salary_min, salary_max, \
                              skills, source_url, scraped_at";

/// Repository for job record database operations
pub struct JobRecordRepository {
    pool: Pool<Postgres>,
}

impl JobRecordRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for JobRecordRepository {
    /// Bulk insert in a single transaction
    ///
    /// Duplicates are rejected by the unique identity key constraint, so
    /// `inserted` is the affected row count and everything else was skipped.
    async fn import(&self, records: Vec<JobRecord>) -> Result<ImportResult, StoreError> {
        if records.is_empty() {
            debug!("Import called with empty record list");
            return Ok(ImportResult::default());
        }

        debug!("Starting bulk import of {} records", records.len());

        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for chunk in records.chunks(IMPORT_CHUNK_SIZE) {
            // Build dynamic SQL for bulk insert
            let mut query = String::from(
                "INSERT INTO job_records (id, identity_key, company_key, company, title, location, \
                 department, salary_min, salary_max, skills, source_url, scraped_at) VALUES ",
            );

            for i in 0..chunk.len() {
                if i > 0 {
                    query.push_str(", ");
                }
                let base = i * 12;
                let placeholders: Vec<String> =
                    (1..=12).map(|n| format!("${}", base + n)).collect();
                query.push('(');
                query.push_str(&placeholders.join(", "));
                query.push(')');
            }
            query.push_str(" ON CONFLICT DO NOTHING");

            let mut query_builder = sqlx::query(&query);
            for record in chunk {
                query_builder = query_builder
                    .bind(&record.id)
                    .bind(record.identity_key())
                    .bind(record.company_key())
                    .bind(&record.company)
                    .bind(&record.title)
                    .bind(&record.location)
                    .bind(&record.department)
                    .bind(record.salary_min)
                    .bind(record.salary_max)
                    .bind(record.skills.iter().cloned().collect::<Vec<String>>())
                    .bind(&record.source_url)
                    .bind(record.scraped_at);
            }

            let result = query_builder.execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        let inserted = inserted as usize;
        let skipped = records.len().saturating_sub(inserted);
        debug!("Bulk import completed: {} inserted, {} skipped", inserted, skipped);

        Ok(ImportResult { inserted, skipped })
    }

    async fn list(&self, company_key: Option<&str>) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query_as::<_, JobRecordRow>(&format!(
            "SELECT {} FROM job_records \
             WHERE ($1::text IS NULL OR company_key = $1) \
             ORDER BY scraped_at, id",
            RECORD_COLUMNS
        ))
        .bind(company_key.map(normalize_company))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn clear(&self, company_key: Option<&str>) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM job_records WHERE ($1::text IS NULL OR company_key = $1)")
                .bind(company_key.map(normalize_company))
                .execute(&self.pool)
                .await?;
        debug!("Cleared {} job records", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM job_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM job_records WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
