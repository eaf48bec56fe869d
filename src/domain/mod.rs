pub mod identity;
pub mod job_record;
pub mod scrape_run;

pub use identity::{company_key_from_url, normalize_company, normalize_title};
pub use job_record::{parse_salary_range, JobRecord};
pub use scrape_run::{RunOutcome, RunStatus, ScrapeRun, ABANDONED_RUN_ERROR};
