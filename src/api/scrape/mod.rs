pub mod dto;
pub mod handlers;
pub mod service;

pub use handlers::scrape_config;
pub use service::ScrapeService;
