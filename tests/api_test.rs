use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use scrape_runner::api::scrape::dto::StartScrapeRequest;
use scrape_runner::app::{AppState, Backend};
use scrape_runner::clock::{Clock, SystemClock};
use scrape_runner::worker::{ExtractError, ExtractionWorker, PageFetcher};

const CAREERS_PAGE: &str = r#"
    <html><body>
      <a href="/careers/platform-engineer" data-location="Berlin">Platform Engineer</a>
      <a href="/careers/data-scientist" data-location="Remote">Data Scientist</a>
      <a href="/careers/">View all roles</a>
    </body></html>
"#;

/// Serves the careers page once per permit added to `gate`
struct GatedFetcher {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl PageFetcher for GatedFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, ExtractError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExtractError::Request(e.to_string()))?;
        permit.forget();
        Ok(CAREERS_PAGE.to_string())
    }
}

struct TestApp {
    state: AppState,
    gate: Arc<Semaphore>,
}

impl TestApp {
    /// `open` lets every fetch through immediately
    fn new(open: bool) -> Self {
        let gate = Arc::new(Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 }));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = Backend::in_memory(clock.clone(), chrono::Duration::minutes(15));
        let worker = ExtractionWorker::new(
            Arc::new(GatedFetcher { gate: gate.clone() }),
            backend.registry.clone(),
            backend.store.clone(),
            clock.clone(),
            Duration::from_secs(5),
        );
        Self {
            state: AppState::new(&backend, worker, 2, clock),
            gate,
        }
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

macro_rules! service {
    ($test_app:expr) => {{
        let state = $test_app.state.clone();
        test::init_service(App::new().configure(move |cfg| state.configure(cfg))).await
    }};
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[actix_web::test]
async fn test_start_is_accepted_and_records_appear_in_summary() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let req = test::TestRequest::post()
        .uri("/scrape")
        .set_json(json!({"source_url": "https://acme.com/careers"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "started");
    assert_eq!(body["company_key"], "acme");
    assert!(body["run_id"].is_string());

    let mut status = Value::Null;
    for _ in 0..100 {
        settle().await;
        let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
        status = test::call_and_read_body_json(&app, req).await;
        if status["is_active"] == false {
            break;
        }
    }
    assert_eq!(status["status"], "completed");
    assert_eq!(status["inserted"], 2);
    assert_eq!(status["skipped"], 0);

    let req = test::TestRequest::get().uri("/summary?company=acme").to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary["record_count"], 2);
}

#[actix_web::test]
async fn test_second_start_while_active_is_rejected_with_409() {
    let test_app = TestApp::new(false);
    let app = service!(test_app);

    let start = || {
        test::TestRequest::post()
            .uri("/scrape")
            .set_json(json!({"source_url": "https://acme.com/careers"}))
            .to_request()
    };

    let first = test::call_service(&app, start()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first: Value = test::read_body_json(first).await;

    let second = test::call_service(&app, start()).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let second: Value = test::read_body_json(second).await;
    assert_eq!(second["status"], "already_active");
    assert_eq!(second["run_id"], first["run_id"]);

    let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["is_active"], true);
    assert_eq!(status["status"], "active");

    test_app.release();
    for _ in 0..100 {
        settle().await;
        let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
        let status: Value = test::call_and_read_body_json(&app, req).await;
        if status["is_active"] == false {
            assert_eq!(status["status"], "completed");
            return;
        }
    }
    panic!("run never completed");
}

#[actix_web::test]
async fn test_clear_releases_the_company_while_worker_finishes() {
    let test_app = TestApp::new(false);
    let app = service!(test_app);

    let req = test::TestRequest::post()
        .uri("/scrape")
        .set_json(json!({"source_url": "https://acme.com/careers"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

    let req = test::TestRequest::delete().uri("/scrape-status?company=acme").to_request();
    let cleared = test::call_service(&app, req).await;
    assert_eq!(cleared.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["is_active"], false);
    assert_eq!(status["status"], "idle");

    // The orphaned worker still imports but must not touch the cleared run
    test_app.release();
    let mut count = 0;
    for _ in 0..100 {
        settle().await;
        let req = test::TestRequest::get().uri("/summary?company=acme").to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        count = summary["record_count"].as_u64().unwrap_or_default();
        if count > 0 {
            break;
        }
    }
    assert_eq!(count, 2);
    settle().await;

    let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "idle");
}

#[actix_web::test]
async fn test_wait_mode_returns_records_and_is_idempotent() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let start = || {
        test::TestRequest::post()
            .uri("/scrape?wait=true")
            .set_json(json!({"source_url": "https://acme.com/careers", "company": "Acme"}))
            .to_request()
    };

    let first = test::call_service(&app, start()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = test::read_body_json(first).await;
    assert_eq!(first["status"], "completed");
    assert_eq!(first["inserted"], 2);
    assert_eq!(first["records"].as_array().map(Vec::len), Some(2));

    let second: Value = test::call_and_read_body_json(&app, start()).await;
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["skipped"], 2);
    assert_eq!(second["records"].as_array().map(Vec::len), Some(2));
}

#[actix_web::test]
async fn test_abandoned_wait_request_still_completes_the_run() {
    let test_app = TestApp::new(false);
    let app = service!(test_app);
    let request = StartScrapeRequest {
        source_url: "https://acme.com/careers".to_string(),
        company: None,
    };

    // Caller gives up while the fetch is still blocked
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), test_app.state.scrape.start(&request, true))
            .await;
    assert!(abandoned.is_err());

    let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "active");

    test_app.release();
    let mut status = Value::Null;
    for _ in 0..100 {
        settle().await;
        let req = test::TestRequest::get().uri("/scrape-status?company=acme").to_request();
        status = test::call_and_read_body_json(&app, req).await;
        if status["is_active"] == false {
            break;
        }
    }
    assert_eq!(status["status"], "completed");
    assert_eq!(status["inserted"], 2);

    test_app.state.workers.drain().await;
    assert_eq!(test_app.state.workers.in_flight(), 0);
}

#[actix_web::test]
async fn test_invalid_requests_are_rejected() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let req = test::TestRequest::post()
        .uri("/scrape")
        .set_json(json!({"source_url": "not a url"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert!(body["fields"]["source_url"].is_object());

    let req = test::TestRequest::get().uri("/scrape-status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_import_validates_per_record_and_skips_known_identities() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let payload = json!({"records": [
        {"company": "OpenAI", "title": "Research Engineer", "location": "San Francisco",
         "salary": "$245k - $440k", "skills": "Python, PyTorch"},
        {"company": "OpenAI", "title": "Applied Engineer", "location": "Remote",
         "skills": ["Rust"]},
        {"company": "OpenAI", "title": ""}
    ]});

    let req = test::TestRequest::post().uri("/jobs/import").set_json(&payload).to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first["inserted"], 2);
    assert_eq!(first["skipped"], 0);
    assert_eq!(first["errors"].as_array().map(Vec::len), Some(1));

    let req = test::TestRequest::post().uri("/jobs/import").set_json(&payload).to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["skipped"], 2);

    let req = test::TestRequest::get().uri("/jobs?company=OpenAI").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed["count"], 2);
    let research = listed["records"]
        .as_array()
        .and_then(|records| records.iter().find(|r| r["title"] == "Research Engineer"))
        .cloned()
        .unwrap();
    assert_eq!(research["salary_min"], 245);
    assert_eq!(research["salary_max"], 440);
}

#[actix_web::test]
async fn test_audit_and_clean_duplicates() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let payload = json!({"records": [
        {"company": "OpenAI", "title": "Research Engineer", "location": "San Francisco",
         "scraped_at": "2024-01-01T00:00:00Z"},
        {"company": "openai", "title": "Research Engineer,", "location": "Remote",
         "scraped_at": "2024-01-02T00:00:00Z"},
        {"company": "OpenAI", "title": "Designer", "location": "Remote"}
    ]});
    let req = test::TestRequest::post().uri("/jobs/import").set_json(&payload).to_request();
    let imported: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(imported["inserted"], 3);

    let req = test::TestRequest::get().uri("/jobs/duplicates").to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["total_records"], 3);
    assert_eq!(report["duplicate_records"], 1);
    assert_eq!(report["companies"][0]["company_key"], "openai");
    assert_eq!(report["companies"][0]["unique_count"], 2);

    let req = test::TestRequest::post().uri("/jobs/clean-duplicates").to_request();
    let cleaned: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cleaned["removed_count"], 1);

    let req = test::TestRequest::post().uri("/jobs/clean-duplicates").to_request();
    let again: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(again["removed_count"], 0);

    let req = test::TestRequest::get().uri("/jobs").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed["count"], 2);
    let kept = listed["records"]
        .as_array()
        .and_then(|records| records.iter().find(|r| r["title"] != "Designer"))
        .cloned()
        .unwrap();
    assert_eq!(kept["location"], "San Francisco");
}

#[actix_web::test]
async fn test_delete_and_clear_records() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let payload = json!({"records": [
        {"company": "Acme", "title": "Platform Engineer"},
        {"company": "Globex", "title": "Platform Engineer"}
    ]});
    let req = test::TestRequest::post().uri("/jobs/import").set_json(&payload).to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/jobs?company=acme").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    let id = listed["records"][0]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete().uri(&format!("/jobs/{}", id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::delete().uri(&format!("/jobs/{}", id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::delete().uri("/jobs/clear-all").to_request();
    let cleared: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cleared["removed"], 1);
}

#[actix_web::test]
async fn test_upload_imports_bare_array_file() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    let boundary = "scrape-runner-boundary";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"jobs.json\"\r\n\
         Content-Type: application/json\r\n\r\n\
         [{{\"company\": \"Acme\", \"title\": \"Platform Engineer\", \"url\": \"https://acme.com/careers/1\"}}]\r\n\
         --{b}--\r\n",
        b = boundary
    );

    let req = test::TestRequest::post()
        .uri("/jobs/import/upload")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let imported: Value = test::read_body_json(resp).await;
    assert_eq!(imported["inserted"], 1);
}

#[actix_web::test]
async fn test_health_endpoints() {
    let test_app = TestApp::new(true);
    let app = service!(test_app);

    for uri in ["/health", "/ready", "/live"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK, "{}", uri);
    }
}
