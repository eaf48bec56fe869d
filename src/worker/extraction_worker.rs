use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use super::enricher::Enricher;
use super::extractor::extract_postings;
use super::fallback::fallback_records;
use super::fetcher::PageFetcher;
use super::ExtractError;
use crate::clock::Clock;
use crate::domain::{JobRecord, RunOutcome, ScrapeRun};
use crate::registry::RunRegistry;
use crate::store::ResultStore;

/// What a single extraction produced
///
/// `records` is never empty when `used_fallback` is set; `error` carries the
/// fetch or parse failure that triggered the fallback.
#[derive(Debug)]
pub struct Extraction {
    pub records: Vec<JobRecord>,
    pub error: Option<ExtractError>,
    pub used_fallback: bool,
}

/// Fetches a careers page, extracts postings and imports them
pub struct ExtractionWorker {
    fetcher: Arc<dyn PageFetcher>,
    enricher: Option<Arc<dyn Enricher>>,
    registry: Arc<dyn RunRegistry>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    enrich_timeout: Duration,
}

impl ExtractionWorker {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        registry: Arc<dyn RunRegistry>,
        store: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            enricher: None,
            registry,
            store,
            clock,
            timeout,
            enrich_timeout: timeout / 2,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Budget for the whole enrichment pass, capped by the worker timeout
    pub fn with_enrich_timeout(mut self, enrich_timeout: Duration) -> Self {
        self.enrich_timeout = enrich_timeout;
        self
    }

    /// URL to records; fetch and parse failures fall back to placeholder data
    pub async fn extract(&self, company_key: &str, source_url: &str) -> Extraction {
        let deadline = Instant::now() + self.timeout;
        let extraction = self.scrape(company_key, source_url).await;
        let records = self.enrich(extraction.records, deadline).await;
        Extraction {
            records,
            ..extraction
        }
    }

    async fn scrape(&self, company_key: &str, source_url: &str) -> Extraction {
        let now = self.clock.now();

        let scraped = match self.fetcher.fetch(source_url).await {
            Ok(html) => {
                let records = extract_postings(&html, company_key, source_url, now);
                if records.is_empty() {
                    Err(ExtractError::NoPostings(source_url.to_string()))
                } else {
                    Ok(records)
                }
            }
            Err(e) => Err(e),
        };

        match scraped {
            Ok(records) => {
                info!(count = records.len(), "Extracted job postings");
                Extraction {
                    records,
                    error: None,
                    used_fallback: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed, using fallback records");
                Extraction {
                    records: fallback_records(company_key, source_url, now),
                    error: Some(e),
                    used_fallback: true,
                }
            }
        }
    }

    /// Fill missing salary and skills until the enrichment budget or `deadline` runs out
    ///
    /// Records not reached in time are returned as scraped.
    async fn enrich(&self, records: Vec<JobRecord>, deadline: Instant) -> Vec<JobRecord> {
        let Some(enricher) = &self.enricher else {
            return records;
        };

        let mut enriched = Vec::with_capacity(records.len());
        let fill = async {
            for record in &records {
                if record.has_salary() && !record.skills.is_empty() {
                    enriched.push(record.clone());
                    continue;
                }
                match enricher.enrich(record).await {
                    Ok(enrichment) => enriched.push(enrichment.apply(record.clone())),
                    Err(e) => {
                        warn!(title = %record.title, error = %e, "Enrichment failed, keeping record as scraped");
                        enriched.push(record.clone());
                    }
                }
            }
        };

        let cutoff = deadline.min(Instant::now() + self.enrich_timeout);
        if tokio::time::timeout_at(cutoff, fill).await.is_err() {
            warn!(
                enriched = enriched.len(),
                total = records.len(),
                "Enrichment ran out of time, importing remaining records as scraped"
            );
        }

        let done = enriched.len();
        enriched.extend(records.into_iter().skip(done));
        enriched
    }

    /// Extract and import
    ///
    /// Fetching and parsing must finish within the worker timeout. Enrichment
    /// stops at its own budget or the worker deadline, whichever comes first.
    /// The import gets a fresh worker-timeout window so scraped records are
    /// never dropped for slow enrichment.
    pub async fn execute(&self, company_key: &str, source_url: &str) -> RunOutcome {
        let deadline = Instant::now() + self.timeout;

        let scraping = self.scrape(company_key, source_url);
        let extraction = match tokio::time::timeout_at(deadline, scraping).await {
            Ok(extraction) => extraction,
            Err(_) => return self.timed_out("extraction"),
        };
        let records = self.enrich(extraction.records, deadline).await;
        if records.is_empty() {
            return RunOutcome::Failed {
                error: "extraction produced no usable records".to_string(),
            };
        }

        match tokio::time::timeout(self.timeout, self.store.import(records)).await {
            Ok(Ok(result)) => RunOutcome::Completed {
                inserted: result.inserted as u64,
                skipped: result.skipped as u64,
            },
            Ok(Err(e)) => {
                error!(error = %e, "Import failed");
                RunOutcome::Failed {
                    error: format!("import failed: {}", e),
                }
            }
            Err(_) => self.timed_out("import"),
        }
    }

    fn timed_out(&self, phase: &str) -> RunOutcome {
        error!(phase, timeout_secs = self.timeout.as_secs(), "Worker timed out");
        RunOutcome::Failed {
            error: format!("worker timed out after {}s", self.timeout.as_secs()),
        }
    }

    /// Execute a registered run and report its outcome to the registry
    pub async fn run(&self, run: &ScrapeRun) -> RunOutcome {
        let Some(run_id) = run.run_id else {
            warn!(company = %run.company_key, "Refusing to execute a run without id");
            return RunOutcome::Failed {
                error: "run has no id".to_string(),
            };
        };
        let source_url = run.source_url.clone().unwrap_or_default();

        let span = info_span!("scrape_run", company = %run.company_key, %run_id, url = %source_url);
        async {
            info!("Scrape run started");
            let outcome = self.execute(&run.company_key, &source_url).await;
            self.report(&run.company_key, run_id, outcome.clone()).await;
            outcome
        }
        .instrument(span)
        .await
    }

    /// Record an outcome, logging instead of propagating registry failures
    pub async fn report(&self, company_key: &str, run_id: uuid::Uuid, outcome: RunOutcome) {
        if let Err(e) = self.registry.complete(company_key, run_id, outcome).await {
            error!(company = %company_key, %run_id, error = %e, "Failed to record run outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::RunStatus;
    use crate::registry::{MemoryRunRegistry, StartOutcome};
    use crate::store::MemoryResultStore;
    use crate::worker::enricher::Enrichment;
    use async_trait::async_trait;

    struct StaticFetcher(Result<&'static str, u16>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String, ExtractError> {
            match self.0 {
                Ok(html) => Ok(html.to_string()),
                Err(status) => Err(ExtractError::Status {
                    status,
                    url: url.to_string(),
                }),
            }
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, ExtractError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct FixedEnricher;

    #[async_trait]
    impl Enricher for FixedEnricher {
        async fn enrich(&self, _record: &JobRecord) -> Result<Enrichment, ExtractError> {
            Ok(Enrichment {
                salary_min: Some(200),
                salary_max: Some(300),
                skills: vec!["Rust".to_string()],
            })
        }
    }

    /// Enriches each record after `delay`
    struct SlowEnricher {
        delay: Duration,
    }

    #[async_trait]
    impl Enricher for SlowEnricher {
        async fn enrich(&self, record: &JobRecord) -> Result<Enrichment, ExtractError> {
            tokio::time::sleep(self.delay).await;
            FixedEnricher.enrich(record).await
        }
    }

    const PAGE: &str = r#"<html><body>
        <a href="/careers/platform-engineer">Platform Engineer</a>
        <a href="/careers/data-scientist">Data Scientist</a>
    </body></html>"#;

    fn worker(
        fetcher: Arc<dyn PageFetcher>,
    ) -> (ExtractionWorker, Arc<dyn RunRegistry>, Arc<MemoryResultStore>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry: Arc<dyn RunRegistry> =
            Arc::new(MemoryRunRegistry::new(clock.clone(), chrono::Duration::minutes(15)));
        let store = Arc::new(MemoryResultStore::new());
        let worker = ExtractionWorker::new(
            fetcher,
            registry.clone(),
            store.clone(),
            clock,
            Duration::from_secs(5),
        );
        (worker, registry, store)
    }

    #[tokio::test]
    async fn test_fetch_error_still_completes_with_fallback() {
        let (worker, registry, store) = worker(Arc::new(StaticFetcher(Err(503))));

        let StartOutcome::Started(run) = registry
            .start("openai", "https://openai.com/careers")
            .await
            .unwrap()
        else {
            panic!("expected a new run");
        };

        let outcome = worker.run(&run).await;

        assert!(matches!(outcome, RunOutcome::Completed { inserted, .. } if inserted > 0));
        assert_eq!(
            registry.status("openai").await.unwrap().status,
            RunStatus::Completed
        );
        assert!(!store.list(Some("openai")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extracts_page_postings() {
        let (worker, _, _) = worker(Arc::new(StaticFetcher(Ok(PAGE))));

        let extraction = worker.extract("acme", "https://acme.com/careers").await;

        assert!(!extraction.used_fallback);
        assert!(extraction.error.is_none());
        assert_eq!(extraction.records.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_uses_fallback() {
        let (worker, _, _) = worker(Arc::new(StaticFetcher(Ok("<html></html>"))));

        let extraction = worker.extract("acme", "https://acme.com/careers").await;

        assert!(extraction.used_fallback);
        assert!(matches!(extraction.error, Some(ExtractError::NoPostings(_))));
        assert!(!extraction.records.is_empty());
    }

    #[tokio::test]
    async fn test_enricher_fills_gaps() {
        let (worker, _, _) = worker(Arc::new(StaticFetcher(Ok(PAGE))));
        let worker = worker.with_enricher(Arc::new(FixedEnricher));

        let extraction = worker.extract("acme", "https://acme.com/careers").await;

        assert!(extraction
            .records
            .iter()
            .all(|r| r.salary_min == Some(200) && r.skills.contains("Rust")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_run_failed() {
        let (worker, registry, _) = worker(Arc::new(SlowFetcher));
        let started = registry.start("acme", "https://acme.com/careers").await.unwrap();

        let outcome = worker.run(started.run()).await;

        assert!(matches!(outcome, RunOutcome::Failed { ref error } if error.contains("timed out")));
        let run = registry.status("acme").await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_records() {
        let (worker, _, _) = worker(Arc::new(StaticFetcher(Ok(PAGE))));

        let first = worker.execute("acme", "https://acme.com/careers").await;
        let second = worker.execute("acme", "https://acme.com/careers").await;

        assert_eq!(first, RunOutcome::Completed { inserted: 2, skipped: 0 });
        assert_eq!(second, RunOutcome::Completed { inserted: 0, skipped: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_enrichment_still_imports_records() {
        let (worker, registry, store) = worker(Arc::new(StaticFetcher(Ok(PAGE))));
        let worker = worker.with_enricher(Arc::new(SlowEnricher {
            delay: Duration::from_secs(3),
        }));
        let started = registry.start("acme", "https://acme.com/careers").await.unwrap();

        let outcome = worker.run(started.run()).await;

        assert_eq!(outcome, RunOutcome::Completed { inserted: 2, skipped: 0 });
        assert_eq!(
            registry.status("acme").await.unwrap().status,
            RunStatus::Completed
        );
        let records = store.list(Some("acme")).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.skills.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_budget_keeps_records_enriched_in_time() {
        let (worker, _, _) = worker(Arc::new(StaticFetcher(Ok(PAGE))));
        let worker = worker
            .with_enricher(Arc::new(SlowEnricher {
                delay: Duration::from_secs(3),
            }))
            .with_enrich_timeout(Duration::from_secs(4));

        let extraction = worker.extract("acme", "https://acme.com/careers").await;

        assert_eq!(extraction.records.len(), 2);
        assert!(extraction.records[0].skills.contains("Rust"));
        assert!(extraction.records[1].skills.is_empty());
    }
}
