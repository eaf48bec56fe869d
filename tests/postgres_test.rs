//! Postgres adapter tests; skipped unless DATABASE_URL points at a scratch database

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use scrape_runner::clock::{Clock, ManualClock};
use scrape_runner::db::{self, JobRecordRepository, ScrapeRunRepository};
use scrape_runner::domain::{JobRecord, RunOutcome, RunStatus};
use scrape_runner::registry::{RunRegistry, StartOutcome};
use scrape_runner::store::{ImportResult, ResultStore};

const URL: &str = "https://acme.com/careers";

async fn pool() -> Option<Pool<Postgres>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };
    let pool = db::connection::get_connection(&database_url, 8)
        .await
        .expect("connect to DATABASE_URL");
    db::migrations::run_migrations(&pool)
        .await
        .expect("apply migrations");
    Some(pool)
}

/// Company key no other test run touches
fn company() -> String {
    format!("pgtest{}", Uuid::new_v4().simple())
}

fn registry(pool: &Pool<Postgres>) -> (ScrapeRunRepository, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let registry = ScrapeRunRepository::new(pool.clone(), dyn_clock, chrono::Duration::minutes(15));
    (registry, clock)
}

#[tokio::test]
async fn test_second_start_while_active_is_rejected() {
    let Some(pool) = pool().await else { return };
    let (registry, _) = registry(&pool);
    let company = company();

    let first = registry.start(&company, URL).await.unwrap();
    let second = registry.start(&company, URL).await.unwrap();

    assert!(matches!(first, StartOutcome::Started(_)));
    assert!(matches!(second, StartOutcome::AlreadyActive(_)));
    assert_eq!(second.run().run_id, first.run().run_id);

    registry.clear(&company).await.unwrap();
}

#[tokio::test]
async fn test_abandoned_run_can_be_restarted() {
    let Some(pool) = pool().await else { return };
    let (registry, clock) = registry(&pool);
    let company = company();

    let abandoned = registry.start(&company, URL).await.unwrap().run().clone();
    clock.advance(Duration::from_secs(16 * 60));

    let status = registry.status(&company).await.unwrap();
    assert_eq!(status.status, RunStatus::Failed);

    let restarted = registry.start(&company, URL).await.unwrap();
    let StartOutcome::Started(run) = restarted else {
        panic!("abandoned run should not block a new start");
    };
    assert_ne!(run.run_id, abandoned.run_id);

    registry.clear(&company).await.unwrap();
}

#[tokio::test]
async fn test_complete_with_stale_run_id_is_ignored() {
    let Some(pool) = pool().await else { return };
    let (registry, clock) = registry(&pool);
    let company = company();

    let stale = registry.start(&company, URL).await.unwrap().run().clone();
    clock.advance(Duration::from_secs(16 * 60));
    let current = registry.start(&company, URL).await.unwrap().run().clone();

    let applied = registry
        .complete(
            &company,
            stale.run_id.unwrap(),
            RunOutcome::Completed { inserted: 9, skipped: 0 },
        )
        .await
        .unwrap();

    assert!(!applied);
    let status = registry.status(&company).await.unwrap();
    assert_eq!(status.status, RunStatus::Active);
    assert_eq!(status.run_id, current.run_id);
    assert_eq!(status.inserted, 0);

    let applied = registry
        .complete(
            &company,
            current.run_id.unwrap(),
            RunOutcome::Completed { inserted: 2, skipped: 1 },
        )
        .await
        .unwrap();
    assert!(applied);
    let status = registry.status(&company).await.unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.inserted, 2);

    registry.clear(&company).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_admit_exactly_one_run() {
    let Some(pool) = pool().await else { return };
    let (registry, _) = registry(&pool);
    let registry = Arc::new(registry);
    let company = company();

    let attempts = (0..16).map(|_| {
        let registry = registry.clone();
        let company = company.clone();
        tokio::spawn(async move { registry.start(&company, URL).await })
    });
    let started = join_all(attempts)
        .await
        .into_iter()
        .filter(|o| matches!(o, Ok(Ok(StartOutcome::Started(_)))))
        .count();

    assert_eq!(started, 1);

    registry.clear(&company).await.unwrap();
}

fn batch(company: &str) -> Vec<JobRecord> {
    let now = Utc::now();
    vec![
        JobRecord::new(company, "Platform Engineer", "Berlin", URL, now),
        JobRecord::new(company, "Data Scientist", "Remote", URL, now),
        JobRecord::new(company, "Designer", "London", URL, now).with_salary(Some(80), Some(95)),
    ]
}

#[tokio::test]
async fn test_reimport_inserts_nothing_new() {
    let Some(pool) = pool().await else { return };
    let store = JobRecordRepository::new(pool);
    let company = company();

    let first = store.import(batch(&company)).await.unwrap();
    let second = store.import(batch(&company)).await.unwrap();

    assert_eq!(first, ImportResult { inserted: 3, skipped: 0 });
    assert_eq!(second, ImportResult { inserted: 0, skipped: 3 });
    let stored = store.list(Some(&company)).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored
        .iter()
        .any(|r| r.salary_min == Some(80) && r.salary_max == Some(95)));

    assert_eq!(store.clear(Some(&company)).await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_identities_within_one_batch_are_skipped() {
    let Some(pool) = pool().await else { return };
    let store = JobRecordRepository::new(pool);
    let company = company();
    let now = Utc::now();

    let result = store
        .import(vec![
            JobRecord::new(&company, "Software Engineer", "SF", URL, now),
            JobRecord::new(&company, "software engineer", "sf", URL, now),
        ])
        .await
        .unwrap();

    assert_eq!(result, ImportResult { inserted: 1, skipped: 1 });

    store.clear(Some(&company)).await.unwrap();
}

#[tokio::test]
async fn test_delete_many_removes_listed_ids() {
    let Some(pool) = pool().await else { return };
    let store = JobRecordRepository::new(pool);
    let company = company();
    store.import(batch(&company)).await.unwrap();

    let ids: Vec<String> = store
        .list(Some(&company))
        .await
        .unwrap()
        .into_iter()
        .take(2)
        .map(|r| r.id)
        .collect();

    assert_eq!(store.delete_many(&ids).await.unwrap(), 2);
    assert_eq!(store.list(Some(&company)).await.unwrap().len(), 1);

    store.clear(Some(&company)).await.unwrap();
}
