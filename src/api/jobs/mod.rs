pub mod dto;
pub mod handlers;
pub mod service;

pub use handlers::jobs_config;
pub use service::JobService;
