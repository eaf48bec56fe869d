//! Client run controller
//!
//! Drives one company's scrape from the client side: persists an in-progress
//! marker, starts the run, polls the server until it completes, and
//! reconciles after a client restart.

pub mod api;
pub mod controller;
pub mod state;
pub mod storage;

pub use api::{HttpScrapeApi, ScrapeApi, StartReply};
pub use controller::{
    ClientRunController, ControllerSettings, ControllerState, Reconciliation, StartDisposition,
};
pub use state::{ClientRunState, RunResult};
pub use storage::{ClientStorage, FileStorage, MemoryStorage};

/// User-facing failures of a client-driven run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The worker reported failure; retrying may help
    #[error("scrape failed: {0}")]
    WorkerFailure(String),
    /// Poll ceiling reached while the server still reported the run active
    #[error("scrape still running after {polls} status checks; try resetting it")]
    Timeout { polls: u32 },
    #[error("network error: {0}")]
    Network(String),
    #[error("local storage error: {0}")]
    Storage(String),
}
