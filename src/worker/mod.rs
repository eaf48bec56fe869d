pub mod enricher;
pub mod extraction_worker;
pub mod extractor;
pub mod fallback;
pub mod fetcher;
pub mod worker_pool;

pub use enricher::{Enricher, Enrichment, OpenAiEnricher};
pub use extraction_worker::{Extraction, ExtractionWorker};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use worker_pool::WorkerPool;

/// Failures inside a single extraction
///
/// These are absorbed by the worker's fallback path and never fail a run on
/// their own.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("no job postings found at {0}")]
    NoPostings(String),
    #[error("enrichment failed: {0}")]
    Enrichment(String),
}
