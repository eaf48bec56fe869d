use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Pool, Postgres};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::ScrapeRunRow;
use crate::domain::{RunOutcome, ScrapeRun};
use crate::registry::{RegistryError, RunRegistry, StartOutcome};

const RUN_COLUMNS: &str =
    "company_key, run_id, status, source_url, started_at, finished_at, error, inserted, skipped";

/// Postgres-backed run registry
///
/// `start` is a single upsert whose `WHERE` clause only lets it overwrite a
/// run that is not active or has outlived the max age, so two concurrent
/// starts for one company cannot both win.
pub struct ScrapeRunRepository {
    pool: Pool<Postgres>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl ScrapeRunRepository {
    pub fn new(pool: Pool<Postgres>, clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            pool,
            clock,
            max_age,
        }
    }

    async fn fetch(&self, company_key: &str) -> Result<Option<ScrapeRun>, RegistryError> {
        let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
            "SELECT {} FROM scrape_runs WHERE company_key = $1",
            RUN_COLUMNS
        ))
        .bind(company_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ScrapeRun::try_from).transpose()
    }
}

#[async_trait]
impl RunRegistry for ScrapeRunRepository {
    async fn start(
        &self,
        company_key: &str,
        source_url: &str,
    ) -> Result<StartOutcome, RegistryError> {
        let now = self.clock.now();
        let candidate = ScrapeRun::activate(company_key, source_url, now);
        let cutoff = now - self.max_age;

        debug!(company = %company_key, "Attempting to mark run active");

        let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
            r#"
            INSERT INTO scrape_runs ({cols})
            VALUES ($1, $2, 'active', $3, $4, NULL, NULL, 0, 0)
            ON CONFLICT (company_key) DO UPDATE
            SET run_id = EXCLUDED.run_id,
                status = 'active',
                source_url = EXCLUDED.source_url,
                started_at = EXCLUDED.started_at,
                finished_at = NULL,
                error = NULL,
                inserted = 0,
                skipped = 0
            WHERE scrape_runs.status <> 'active'
               OR scrape_runs.started_at IS NULL
               OR scrape_runs.started_at <= $5
            RETURNING {cols}
            "#,
            cols = RUN_COLUMNS
        ))
        .bind(company_key)
        .bind(candidate.run_id)
        .bind(source_url)
        .bind(now)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let run = ScrapeRun::try_from(row)?;
                info!(company = %company_key, run_id = ?run.run_id, "Run marked active");
                Ok(StartOutcome::Started(run))
            }
            None => {
                let existing = self
                    .fetch(company_key)
                    .await?
                    .unwrap_or_else(|| ScrapeRun::idle(company_key));
                debug!(company = %company_key, "Start rejected: run already active");
                Ok(StartOutcome::AlreadyActive(existing))
            }
        }
    }

    async fn status(&self, company_key: &str) -> Result<ScrapeRun, RegistryError> {
        let now = self.clock.now();
        Ok(self
            .fetch(company_key)
            .await?
            .map(|run| run.effective(now, self.max_age))
            .unwrap_or_else(|| ScrapeRun::idle(company_key)))
    }

    async fn complete(
        &self,
        company_key: &str,
        run_id: Uuid,
        outcome: RunOutcome,
    ) -> Result<bool, RegistryError> {
        let mut finished = ScrapeRun::idle(company_key);
        finished.finish(outcome, self.clock.now());

        let result = sqlx::query(
            r#"
            UPDATE scrape_runs
            SET status = $3, finished_at = $4, error = $5, inserted = $6, skipped = $7
            WHERE company_key = $1 AND run_id = $2
            "#,
        )
        .bind(company_key)
        .bind(run_id)
        .bind(finished.status.as_str())
        .bind(finished.finished_at)
        .bind(finished.error.as_deref())
        .bind(finished.inserted as i64)
        .bind(finished.skipped as i64)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            info!(company = %company_key, %run_id, status = %finished.status, "Run finished");
        } else {
            warn!(company = %company_key, %run_id, "Ignoring completion for superseded run");
        }
        Ok(applied)
    }

    async fn clear(&self, company_key: &str) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM scrape_runs WHERE company_key = $1")
            .bind(company_key)
            .execute(&self.pool)
            .await?;
        info!(company = %company_key, "Run cleared");
        Ok(())
    }
}
