pub mod connection;
pub mod job_record_repository;
pub mod migrations;
pub mod models;
pub mod scrape_run_repository;

pub use job_record_repository::JobRecordRepository;
pub use scrape_run_repository::ScrapeRunRepository;
