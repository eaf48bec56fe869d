pub mod error;
pub mod health;
pub mod jobs;
pub mod scrape;
pub mod validation;

use actix_web::web::ServiceConfig;

/// Every route the server exposes
pub fn configure(config: &mut ServiceConfig) {
    config
        .configure(health::health_config)
        .configure(scrape::scrape_config)
        .configure(jobs::jobs_config);
}
