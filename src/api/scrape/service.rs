use std::sync::Arc;

use tracing::{info, warn};

use super::dto::{
    ClearResponse, RunStatusResponse, StartScrapeRequest, StartScrapeResponse, SummaryResponse,
};
use crate::api::error::ServiceError;
use crate::clock::Clock;
use crate::domain::{company_key_from_url, normalize_company, RunOutcome};
use crate::registry::{RunRegistry, StartOutcome};
use crate::store::ResultStore;
use crate::worker::WorkerPool;

/// Scrape lifecycle service: start, observe and reset runs
pub struct ScrapeService {
    registry: Arc<dyn RunRegistry>,
    store: Arc<dyn ResultStore>,
    workers: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl ScrapeService {
    pub fn new(
        registry: Arc<dyn RunRegistry>,
        store: Arc<dyn ResultStore>,
        workers: Arc<WorkerPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            workers,
            clock,
        }
    }

    /// Company key from the explicit field, else derived from the URL
    pub fn resolve_company(request: &StartScrapeRequest) -> Result<String, ServiceError> {
        let explicit = request
            .company
            .as_deref()
            .map(normalize_company)
            .filter(|key| !key.is_empty());

        explicit
            .or_else(|| company_key_from_url(&request.source_url))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "could not derive a company from {}",
                    request.source_url
                ))
            })
    }

    /// Start a run unless one is already active for the company
    ///
    /// # Business Logic
    /// - Registers the run through the registry's atomic start
    /// - Hands a newly registered run to the worker pool and returns at once
    /// - With `wait`, awaits the pooled run and returns the company's records
    pub async fn start(
        &self,
        request: &StartScrapeRequest,
        wait: bool,
    ) -> Result<StartScrapeResponse, ServiceError> {
        let company_key = Self::resolve_company(request)?;

        match self.registry.start(&company_key, &request.source_url).await? {
            StartOutcome::AlreadyActive(run) => {
                info!(company = %company_key, "Scrape already active");
                Ok(StartScrapeResponse::AlreadyActive {
                    company_key,
                    run_id: run.run_id,
                    started_at: run.started_at,
                })
            }
            StartOutcome::Started(run) if wait => {
                info!(company = %company_key, "Running scrape synchronously");
                // The pool task keeps running if this request goes away
                let outcome = self.workers.spawn(run).await.map_err(|e| {
                    warn!(company = %company_key, error = %e, "Scrape task did not finish");
                    ServiceError::WorkerFailure(format!("scrape task failed: {}", e))
                })?;
                match outcome {
                    RunOutcome::Completed { inserted, skipped } => {
                        let records = self.store.list(Some(&company_key)).await?;
                        Ok(StartScrapeResponse::Completed {
                            company_key,
                            inserted,
                            skipped,
                            records,
                        })
                    }
                    RunOutcome::Failed { error } => Err(ServiceError::WorkerFailure(error)),
                }
            }
            StartOutcome::Started(run) => {
                info!(company = %company_key, run_id = ?run.run_id, "Scrape run accepted");
                let response = StartScrapeResponse::Started {
                    company_key,
                    run_id: run.run_id,
                    started_at: run.started_at,
                };
                self.workers.spawn(run);
                Ok(response)
            }
        }
    }

    pub async fn status(&self, company: &str) -> Result<RunStatusResponse, ServiceError> {
        let company_key = normalize_company(company);
        let run = self.registry.status(&company_key).await?;
        Ok(RunStatusResponse::from_run(run, self.clock.now()))
    }

    /// Reset the company's run to idle; an in-flight worker still imports
    pub async fn clear(&self, company: &str) -> Result<ClearResponse, ServiceError> {
        let company_key = normalize_company(company);
        self.registry.clear(&company_key).await?;
        warn!(company = %company_key, "Scrape state cleared");

        Ok(ClearResponse {
            message: "Scrape state cleared".to_string(),
            company_key,
        })
    }

    /// Stored records for the company
    pub async fn summary(&self, company: &str) -> Result<SummaryResponse, ServiceError> {
        let company_key = normalize_company(company);
        let records = self.store.list(Some(&company_key)).await?;

        Ok(SummaryResponse {
            company_key,
            record_count: records.len(),
            records,
        })
    }
}
