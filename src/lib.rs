//! Background scrape-job lifecycle
//!
//! A server side that registers at most one active scrape run per company,
//! extracts job postings in background workers and stores them idempotently,
//! plus a client side run controller that starts, polls and resumes runs.

pub mod api;
pub mod app;
pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod dedup;
pub mod domain;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod worker;
