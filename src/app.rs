//! Wiring of backends, workers and HTTP services

use std::sync::Arc;

use actix_web::web::{Data, ServiceConfig};
use sqlx::{Pool, Postgres};

use crate::api::{self, jobs::JobService, scrape::ScrapeService, validation};
use crate::clock::Clock;
use crate::db::{JobRecordRepository, ScrapeRunRepository};
use crate::registry::{MemoryRunRegistry, RunRegistry};
use crate::store::{MemoryResultStore, ResultStore};
use crate::worker::{ExtractionWorker, WorkerPool};

/// Run registry and result store, plus the pool backing them if any
#[derive(Clone)]
pub struct Backend {
    pub registry: Arc<dyn RunRegistry>,
    pub store: Arc<dyn ResultStore>,
    pub pool: Option<Pool<Postgres>>,
}

impl Backend {
    /// Process-local backend; state is lost on restart
    pub fn in_memory(clock: Arc<dyn Clock>, run_max_age: chrono::Duration) -> Self {
        Self {
            registry: Arc::new(MemoryRunRegistry::new(clock, run_max_age)),
            store: Arc::new(MemoryResultStore::new()),
            pool: None,
        }
    }

    pub fn postgres(
        pool: Pool<Postgres>,
        clock: Arc<dyn Clock>,
        run_max_age: chrono::Duration,
    ) -> Self {
        Self {
            registry: Arc::new(ScrapeRunRepository::new(pool.clone(), clock, run_max_age)),
            store: Arc::new(JobRecordRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }
}

/// Services shared by every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub scrape: Data<ScrapeService>,
    pub jobs: Data<JobService>,
    pub workers: Arc<WorkerPool>,
}

impl AppState {
    /// Must be called from within a tokio runtime
    pub fn new(
        backend: &Backend,
        worker: ExtractionWorker,
        max_concurrent_scrapes: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let workers = Arc::new(WorkerPool::new(Arc::new(worker), max_concurrent_scrapes));

        Self {
            scrape: Data::new(ScrapeService::new(
                backend.registry.clone(),
                backend.store.clone(),
                workers.clone(),
                clock.clone(),
            )),
            jobs: Data::new(JobService::new(backend.store.clone(), clock)),
            workers,
        }
    }

    /// Register services, extractor configs and routes
    pub fn configure(&self, config: &mut ServiceConfig) {
        config
            .app_data(self.scrape.clone())
            .app_data(self.jobs.clone())
            .app_data(validation::json_config())
            .app_data(validation::query_config())
            .configure(api::configure);
    }
}
