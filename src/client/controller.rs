use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::api::{ScrapeApi, StartReply};
use super::state::{result_key, state_key, ClientRunState, RunResult};
use super::storage::ClientStorage;
use super::ClientError;
use crate::clock::{Clock, Sleeper};
use crate::domain::{JobRecord, RunStatus};

/// Polling and staleness knobs
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub staleness_window: chrono::Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_polls: 200,
            staleness_window: chrono::Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Starting,
    Polling { polls: u32 },
    Done(RunResult),
    Failed(ClientError),
}

impl ControllerState {
    pub fn is_busy(&self) -> bool {
        matches!(self, ControllerState::Starting | ControllerState::Polling { .. })
    }
}

/// What `start` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDisposition {
    /// A start or poll is already in progress; nothing was sent
    Ignored,
    /// The run is in flight; call `poll`
    Polling,
    /// The server answered synchronously with results
    Done,
}

/// What `initialize` found in durable storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing stored
    Fresh,
    /// A recent in-progress marker; the controller is polling again
    Resumed,
    /// A stale or unreadable marker was dropped
    Discarded,
    /// A cached result from an earlier run was restored
    Restored,
}

/// Client-side state machine for one company's scrape run
///
/// `Idle → Starting → Polling → Done | Failed`. The in-progress marker is
/// written before the start request goes out, so a restarted client can
/// resume polling without triggering a second scrape.
pub struct ClientRunController {
    company_key: String,
    api: Arc<dyn ScrapeApi>,
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    settings: ControllerSettings,
    state: Mutex<ControllerState>,
    // Bumped by reset(); loops started under an older epoch stop
    epoch: AtomicU64,
}

impl ClientRunController {
    pub fn new(
        company_key: impl Into<String>,
        api: Arc<dyn ScrapeApi>,
        storage: Arc<dyn ClientStorage>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            company_key: company_key.into(),
            api,
            storage,
            clock,
            sleeper,
            settings,
            state: Mutex::new(ControllerState::Idle),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn company_key(&self) -> &str {
        &self.company_key
    }

    pub fn state(&self) -> ControllerState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, epoch: u64, next: ControllerState) -> bool {
        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *state = next;
        true
    }

    /// Reconcile with durable storage after a (re)start of the client
    pub fn initialize(&self) -> Reconciliation {
        let stored = match self.storage.get(&state_key(&self.company_key)) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(company = %self.company_key, error = %e, "Could not read run state");
                None
            }
        };

        if let Some(raw) = stored {
            let now = self.clock.now();
            match serde_json::from_str::<ClientRunState>(&raw) {
                Ok(run_state)
                    if run_state.is_active
                        && !run_state.is_stale(now, self.settings.staleness_window) =>
                {
                    info!(company = %self.company_key, since = %run_state.timestamp, "Resuming in-progress scrape");
                    *self.lock_state() = ControllerState::Polling { polls: 0 };
                    return Reconciliation::Resumed;
                }
                _ => {
                    info!(company = %self.company_key, "Discarding stale run state");
                    self.discard_run_state();
                    *self.lock_state() = ControllerState::Idle;
                    return Reconciliation::Discarded;
                }
            }
        }

        match self.cached_result() {
            Some(result) => {
                *self.lock_state() = ControllerState::Done(result);
                Reconciliation::Restored
            }
            None => {
                *self.lock_state() = ControllerState::Idle;
                Reconciliation::Fresh
            }
        }
    }

    /// Result cached by the last completed run, if any
    pub fn cached_result(&self) -> Option<RunResult> {
        let raw = self.storage.get(&result_key(&self.company_key)).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Kick off a scrape run
    ///
    /// Re-entrant calls while starting or polling are ignored. An
    /// already-active run on the server counts as success.
    pub async fn start(&self, source_url: &str) -> Result<StartDisposition, ClientError> {
        let epoch = {
            let mut state = self.lock_state();
            if state.is_busy() {
                debug!(company = %self.company_key, "Start ignored: run already in progress");
                return Ok(StartDisposition::Ignored);
            }
            *state = ControllerState::Starting;
            self.epoch.load(Ordering::SeqCst)
        };

        let marker = ClientRunState::active(&self.company_key, source_url, self.clock.now());
        if let Err(e) = self.persist_run_state(&marker) {
            self.set_state(epoch, ControllerState::Failed(e.clone()));
            return Err(e);
        }

        match self.api.start(&self.company_key, source_url).await {
            Ok(StartReply::Started) => {
                info!(company = %self.company_key, "Scrape started");
                self.set_state(epoch, ControllerState::Polling { polls: 0 });
                Ok(StartDisposition::Polling)
            }
            Ok(StartReply::AlreadyActive) => {
                info!(company = %self.company_key, "Scrape already running elsewhere, polling");
                self.set_state(epoch, ControllerState::Polling { polls: 0 });
                Ok(StartDisposition::Polling)
            }
            Ok(StartReply::Completed(records)) => {
                self.finish_done(epoch, records);
                Ok(StartDisposition::Done)
            }
            Err(e) => {
                warn!(company = %self.company_key, error = %e, "Scrape start failed");
                self.discard_run_state();
                self.set_state(epoch, ControllerState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Poll until the run finishes, fails, times out or is reset
    ///
    /// Returns immediately with the current state if not polling.
    pub async fn poll(&self) -> ControllerState {
        let epoch = self.epoch.load(Ordering::SeqCst);

        for polls in 1..=self.settings.max_polls {
            if !matches!(self.state(), ControllerState::Polling { .. }) {
                return self.state();
            }

            self.sleeper.sleep(self.settings.poll_interval).await;

            if !self.set_state(epoch, ControllerState::Polling { polls }) {
                debug!(company = %self.company_key, "Polling cancelled by reset");
                return self.state();
            }

            match self.check_once().await {
                Ok(Some(terminal)) => {
                    if let ControllerState::Done(result) = terminal {
                        self.finish_done(epoch, result.records);
                    } else {
                        self.discard_run_state();
                        self.set_state(epoch, terminal);
                    }
                    return self.state();
                }
                Ok(None) => debug!(company = %self.company_key, polls, "Run still active"),
                Err(e) => warn!(company = %self.company_key, polls, error = %e, "Status check failed, retrying"),
            }
        }

        if self.epoch.load(Ordering::SeqCst) != epoch
            || !matches!(self.state(), ControllerState::Polling { .. })
        {
            return self.state();
        }

        warn!(company = %self.company_key, polls = self.settings.max_polls, "Polling limit reached");
        self.discard_run_state();
        self.set_state(
            epoch,
            ControllerState::Failed(ClientError::Timeout {
                polls: self.settings.max_polls,
            }),
        );
        self.state()
    }

    /// Start and poll to completion
    pub async fn run(&self, source_url: &str) -> Result<ControllerState, ClientError> {
        match self.start(source_url).await? {
            StartDisposition::Ignored | StartDisposition::Polling => Ok(self.poll().await),
            StartDisposition::Done => Ok(self.state()),
        }
    }

    /// Drop local interest in the run and clear it on the server
    ///
    /// The controller is `Idle` when this returns, even if the server call
    /// fails; a worker already in flight still finishes and imports.
    pub async fn reset(&self) -> Result<(), ClientError> {
        {
            let mut state = self.lock_state();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *state = ControllerState::Idle;
        }
        self.discard_run_state();
        if let Err(e) = self.storage.remove(&result_key(&self.company_key)) {
            warn!(company = %self.company_key, error = %e, "Could not drop cached result");
        }

        info!(company = %self.company_key, "Run reset");
        self.api.clear(&self.company_key).await
    }

    /// One status check: `None` while still running
    async fn check_once(&self) -> Result<Option<ControllerState>, ClientError> {
        let status = self.api.status(&self.company_key).await?;
        if status.is_active {
            return Ok(None);
        }

        let summary = self.api.summary(&self.company_key).await?;
        if !summary.records.is_empty() {
            return Ok(Some(ControllerState::Done(RunResult {
                company_key: self.company_key.clone(),
                records: summary.records,
                completed_at: self.clock.now(),
            })));
        }

        if status.status == RunStatus::Failed {
            let reason = status
                .error
                .unwrap_or_else(|| "scrape failed without records".to_string());
            return Ok(Some(ControllerState::Failed(ClientError::WorkerFailure(reason))));
        }

        Ok(None)
    }

    fn finish_done(&self, epoch: u64, records: Vec<JobRecord>) {
        let result = RunResult {
            company_key: self.company_key.clone(),
            records,
            completed_at: self.clock.now(),
        };

        match serde_json::to_string(&result) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(&result_key(&self.company_key), &raw) {
                    warn!(company = %self.company_key, error = %e, "Could not cache result");
                }
            }
            Err(e) => warn!(company = %self.company_key, error = %e, "Could not encode result"),
        }
        self.discard_run_state();

        info!(company = %self.company_key, records = result.records.len(), "Scrape finished");
        self.set_state(epoch, ControllerState::Done(result));
    }

    fn persist_run_state(&self, marker: &ClientRunState) -> Result<(), ClientError> {
        let raw = serde_json::to_string(marker).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.storage.set(&state_key(&self.company_key), &raw)
    }

    fn discard_run_state(&self) {
        if let Err(e) = self.storage.remove(&state_key(&self.company_key)) {
            warn!(company = %self.company_key, error = %e, "Could not drop run state");
        }
    }
}
