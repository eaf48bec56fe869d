use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ExtractionWorker;
use crate::domain::{RunOutcome, ScrapeRun};

/// Error recorded on runs that were registered while the pool was shutting down
pub const SHUTDOWN_ERROR: &str = "server shutting down";

/// Spawns extraction runs with semaphore-bounded concurrency
///
/// # Concurrency Model
/// - Each accepted run is spawned as its own task on the runtime captured at construction
/// - The task acquires a semaphore permit before doing any work
/// - At most `capacity` runs extract concurrently; the rest queue on the semaphore
/// - `drain` waits for every permit, then closes the semaphore so queued and
///   future runs are marked failed instead of executed
pub struct WorkerPool {
    worker: Arc<ExtractionWorker>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    runtime: Handle,
}

impl WorkerPool {
    /// Must be called from within a tokio runtime
    pub fn new(worker: Arc<ExtractionWorker>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            worker,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            runtime: Handle::current(),
        }
    }

    /// Execute a run that was just marked active on its own task
    ///
    /// The task is detached from the caller: dropping the handle does not
    /// cancel the run, so awaiting it is optional.
    pub fn spawn(&self, run: ScrapeRun) -> JoinHandle<RunOutcome> {
        let worker = self.worker.clone();
        let semaphore = self.semaphore.clone();

        self.runtime.spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(permit) => {
                    info!(company = %run.company_key, "Got worker permit");
                    let outcome = worker.run(&run).await;
                    drop(permit);
                    outcome
                }
                Err(_) => {
                    warn!(company = %run.company_key, "Worker pool closed, failing run");
                    let outcome = RunOutcome::Failed {
                        error: SHUTDOWN_ERROR.to_string(),
                    };
                    if let Some(run_id) = run.run_id {
                        worker.report(&run.company_key, run_id, outcome.clone()).await;
                    }
                    outcome
                }
            }
        })
    }

    /// Runs currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for in-flight runs to finish, then refuse new ones
    pub async fn drain(&self) {
        info!("Waiting for {} in-flight scrape runs to complete...", self.in_flight());
        match self.semaphore.acquire_many(self.capacity as u32).await {
            Ok(permits) => {
                self.semaphore.close();
                drop(permits);
                info!("All scrape runs finished");
            }
            Err(_) => warn!("Worker pool already closed"),
        }
    }
}
