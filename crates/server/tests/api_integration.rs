//! API integration tests over the in-process router with mocked pipeline
//! components.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use platewatch_core::LookupError;

fn search_body(plate: &str, state: &str) -> serde_json::Value {
    json!({ "license_plate": plate, "state": state })
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["database"], "connected");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint_has_no_secrets() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["server"]["port"].is_number());
    // Default fixture has no captcha section at all.
    assert!(response.body.get("captcha").is_none());
}

#[tokio::test]
async fn test_search_returns_data_and_job_id() {
    let fixture = TestFixture::new();
    fixture
        .portal
        .set_violations(vec![fixtures::outstanding("8001234567", 65.0)])
        .await;
    fixture
        .reference
        .set_violations(vec![fixtures::paid("8001234999")])
        .await;

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("XYZ9999", "NY"),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"]["success"], true);

    let data = response.body["result"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);

    let scraped = data
        .iter()
        .find(|v| v["summons_number"] == "8001234567")
        .unwrap();
    assert_eq!(scraped["origin"], "SCRAPED");
    assert_eq!(scraped["status"], "OUTSTANDING");
    assert_eq!(scraped["amount_due"], 65.0);

    let api = data
        .iter()
        .find(|v| v["summons_number"] == "8001234999")
        .unwrap();
    assert_eq!(api["origin"], "API");
    assert_eq!(api["status"], "PAID");

    let sources = response.body["enhanced_data"]["data_sources"]
        .as_array()
        .unwrap();
    assert_eq!(sources.len(), 2);

    let job_id = response.body["job_id"].as_str().unwrap().to_string();
    fixture.wait_terminal(&job_id).await;
}

#[tokio::test]
async fn test_search_with_clean_record() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"]["success"], true);
    assert_eq!(response.body["result"]["data"].as_array().unwrap().len(), 0);
    assert_eq!(response.body["enhanced_data"]["downloaded_pdfs"], 0);

    // The empty search still gets a job, which completes with no downloads.
    let job_id = response.body["job_id"].as_str().unwrap().to_string();
    let job = fixture.wait_terminal(&job_id).await;
    assert_eq!(job["state"]["type"], "COMPLETED");
    assert_eq!(job["state"]["downloaded"], 0);
}

#[tokio::test]
async fn test_search_rejects_invalid_plate() {
    let fixture = TestFixture::new();

    let response = fixture
        .post("/api/search-violations-enhanced", search_body("", "NY"))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["result"]["success"], false);
    assert!(response.body["result"]["error_message"]
        .as_str()
        .unwrap()
        .contains("license plate"));
}

#[tokio::test]
async fn test_search_rejects_invalid_state() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NEW YORK"),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["result"]["success"], false);
}

#[tokio::test]
async fn test_search_surfaces_upstream_failure_as_structured_error() {
    let fixture = TestFixture::new();
    fixture
        .portal
        .set_error(LookupError::SiteUnavailable("portal down".to_string()))
        .await;

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body["result"]["success"], false);
    assert!(response.body["result"]["error_message"]
        .as_str()
        .unwrap()
        .contains("portal down"));
}

#[tokio::test]
async fn test_job_status_unknown_id() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/job-status/no-such-job").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("no-such-job"));
}

#[tokio::test]
async fn test_download_pdfs_unknown_job() {
    let fixture = TestFixture::new();
    let response = fixture.get_raw("/api/download-pdfs/no-such-job").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_pdfs_after_completed_job() {
    let fixture = TestFixture::new();
    let url = "https://img.example/8001234567.pdf";
    fixture
        .portal
        .set_violations(vec![fixtures::with_image("8001234567", 65.0, url)])
        .await;
    fixture.fetcher.insert(url, b"pdf bytes".to_vec()).await;

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("XYZ9999", "NY"),
        )
        .await;
    let job_id = response.body["job_id"].as_str().unwrap().to_string();

    let job = fixture.wait_terminal(&job_id).await;
    assert_eq!(job["state"]["type"], "COMPLETED");

    let archive = fixture
        .get_raw(&format!("/api/download-pdfs/{}", job_id))
        .await;
    assert_eq!(archive.status, StatusCode::OK);
    assert_eq!(archive.content_type, "application/zip");
    // Zip local-file-header magic.
    assert_eq!(&archive.bytes[..4], b"PK\x03\x04");
}

#[tokio::test]
async fn test_download_pdfs_for_job_without_images() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;
    let job_id = response.body["job_id"].as_str().unwrap().to_string();
    fixture.wait_terminal(&job_id).await;

    // COMPLETED with zero downloads yields no archive.
    let archive = fixture
        .get_raw(&format!("/api/download-pdfs/{}", job_id))
        .await;
    assert_eq!(archive.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let fixture = TestFixture::new();
    let response = fixture.delete("/api/jobs/no-such-job").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_finished_job_conflicts() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;
    let job_id = response.body["job_id"].as_str().unwrap().to_string();
    fixture.wait_terminal(&job_id).await;

    let response = fixture.delete(&format!("/api/jobs/{}", job_id)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_generate_pdf_returns_document() {
    let fixture = TestFixture::new();
    fixture
        .portal
        .set_violations(vec![fixtures::outstanding("8001234567", 115.0)])
        .await;

    let response = fixture
        .post_raw("/api/generate-pdf-enhanced", search_body("K58ARK", "NY"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, "application/pdf");

    let text = String::from_utf8(response.bytes).unwrap();
    assert!(text.contains("PARKING VIOLATIONS REPORT"));
    assert!(text.contains("License Plate: K58ARK"));
    assert!(text.contains("Total Violations: 1"));
}

#[tokio::test]
async fn test_generate_pdf_rejects_invalid_query() {
    let fixture = TestFixture::new();
    let response = fixture
        .post("/api/generate-pdf-enhanced", search_body("!!!", "NY"))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_duplicate_search_reuses_job() {
    let fixture = TestFixture::new();
    // A slow image download keeps the first job running while the second
    // search lands (the searches themselves are served from cache).
    let url = "https://img.example/slow.pdf";
    fixture
        .portal
        .set_violations(vec![fixtures::with_image("8001234567", 65.0, url)])
        .await;
    fixture.fetcher.insert(url, b"image".to_vec()).await;
    fixture
        .fetcher
        .set_delay(std::time::Duration::from_millis(300))
        .await;

    let first = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;
    let second = fixture
        .post(
            "/api/search-violations-enhanced",
            search_body("ABC1234", "NY"),
        )
        .await;

    let first_id = first.body["job_id"].as_str().unwrap();
    let second_id = second.body["job_id"].as_str().unwrap();
    assert_eq!(first_id, second_id);

    fixture.wait_terminal(first_id).await;
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    // Generate at least one request first.
    fixture.get("/api/health").await;

    let response = fixture.get_raw("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.bytes).unwrap();
    assert!(text.contains("platewatch_http_requests_total"));
}
