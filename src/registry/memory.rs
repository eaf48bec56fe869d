use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RegistryError, RunRegistry, StartOutcome};
use crate::clock::Clock;
use crate::domain::{RunOutcome, ScrapeRun};

/// Process-local registry; a single lock serializes every transition
pub struct MemoryRunRegistry {
    runs: Mutex<HashMap<String, ScrapeRun>>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl MemoryRunRegistry {
    pub fn new(clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            clock,
            max_age,
        }
    }
}

#[async_trait]
impl RunRegistry for MemoryRunRegistry {
    async fn start(
        &self,
        company_key: &str,
        source_url: &str,
    ) -> Result<StartOutcome, RegistryError> {
        let now = self.clock.now();
        let mut runs = self.runs.lock().await;

        if let Some(existing) = runs.get(company_key) {
            if existing.is_active(now, self.max_age) {
                debug!(company = %company_key, "Start rejected: run already active");
                return Ok(StartOutcome::AlreadyActive(existing.clone()));
            }
            if existing.is_abandoned(now, self.max_age) {
                warn!(company = %company_key, "Replacing abandoned run");
            }
        }

        let run = ScrapeRun::activate(company_key, source_url, now);
        runs.insert(company_key.to_string(), run.clone());
        info!(company = %company_key, run_id = ?run.run_id, "Run marked active");
        Ok(StartOutcome::Started(run))
    }

    async fn status(&self, company_key: &str) -> Result<ScrapeRun, RegistryError> {
        let now = self.clock.now();
        let runs = self.runs.lock().await;
        Ok(runs
            .get(company_key)
            .cloned()
            .map(|run| run.effective(now, self.max_age))
            .unwrap_or_else(|| ScrapeRun::idle(company_key)))
    }

    async fn complete(
        &self,
        company_key: &str,
        run_id: Uuid,
        outcome: RunOutcome,
    ) -> Result<bool, RegistryError> {
        let now = self.clock.now();
        let mut runs = self.runs.lock().await;

        match runs.get_mut(company_key) {
            Some(run) if run.run_id == Some(run_id) => {
                run.finish(outcome, now);
                info!(company = %company_key, %run_id, status = %run.status, "Run finished");
                Ok(true)
            }
            _ => {
                warn!(company = %company_key, %run_id, "Ignoring completion for superseded run");
                Ok(false)
            }
        }
    }

    async fn clear(&self, company_key: &str) -> Result<(), RegistryError> {
        self.runs.lock().await.remove(company_key);
        info!(company = %company_key, "Run cleared");
        Ok(())
    }
}
