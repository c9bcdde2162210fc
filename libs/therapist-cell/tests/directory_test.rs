use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{header, method, path, query_param};

use shared_models::error::AppError;
use shared_utils::test_utils::{init_test_tracing, MockSupabaseResponses, TestConfig};
use therapist_cell::services::{TherapistDirectory, TherapistDirectoryService};

async fn directory_for(server: &MockServer) -> TherapistDirectoryService {
    init_test_tracing();
    TherapistDirectoryService::new(&TestConfig::with_url(server.uri()).to_app_config())
}

#[tokio::test]
async fn test_list_therapists_returns_bookable_therapists() {
    let mock_server = MockServer::start().await;
    let lane = Uuid::new_v4();
    let rivera = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .and(query_param("is_bookable", "eq.true"))
        .and(query_param("order", "name.asc"))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::therapist_response(lane, "Dr. Lane", &["Speech", "Feeding"]),
            MockSupabaseResponses::therapist_response(rivera, "Dr. Rivera", &["Occupational"]),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let directory = directory_for(&mock_server).await;
    let therapists = directory.list_therapists().await.unwrap();

    assert_eq!(therapists.len(), 2);
    assert_eq!(therapists[0].id, lane);
    assert_eq!(therapists[0].specialties, vec!["Speech", "Feeding"]);
    assert_eq!(therapists[1].name, "Dr. Rivera");
}

#[tokio::test]
async fn test_list_therapists_skips_malformed_rows() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::therapist_response(Uuid::new_v4(), "Dr. Lane", &[]),
            { "id": "not-a-uuid", "name": "Broken" },
        ])))
        .mount(&mock_server)
        .await;

    let directory = directory_for(&mock_server).await;
    let therapists = directory.list_therapists().await.unwrap();

    assert_eq!(therapists.len(), 1);
    assert!(therapists[0].specialties.is_empty());
}

#[tokio::test]
async fn test_list_therapists_surfaces_server_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(503).set_body_json(
            MockSupabaseResponses::error_response("Service unavailable", "PGRST000"),
        ))
        .mount(&mock_server)
        .await;

    let directory = directory_for(&mock_server).await;
    let result = directory.list_therapists().await;

    assert_matches!(result, Err(AppError::ExternalService(msg)) if msg == "Service unavailable");
}

#[tokio::test]
async fn test_list_therapists_sends_bearer_when_authenticated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .and(header("authorization", "Bearer parent-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let directory = directory_for(&mock_server).await.with_auth_token("parent-token");
    let therapists = directory.list_therapists().await.unwrap();

    assert!(therapists.is_empty());
}
