use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::router::availability_routes;
use shared_utils::test_utils::{MockPostgrestResponses, TestConfig};

fn test_app(mock_url: &str) -> Router {
    availability_routes(Arc::new(TestConfig::with_url(mock_url).to_app_config()))
}

async fn mount_practitioner(server: &MockServer, practitioner_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/practitioners"))
        .and(query_param("id", format!("eq.{}", practitioner_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::practitioner_row(practitioner_id, "Dr. Example")
        ])))
        .mount(server)
        .await;
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn returns_slots_minus_existing_bookings() {
    let server = MockServer::start().await;
    let practitioner_id = Uuid::new_v4().to_string();
    // 2099-06-01 is a Monday (day_of_week = 1)
    let date = NaiveDate::from_ymd_opt(2099, 6, 1).unwrap();

    mount_practitioner(&server, &practitioner_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .and(query_param("day_of_week", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::availability_window_row(
                &practitioner_id, 1, "09:00:00", "11:00:00"
            )
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &practitioner_id,
                date,
                "09:00:00",
                "09:50:00",
                "scheduled",
            )
        ])))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/{}/slots?date={}&duration_minutes=50",
                    practitioner_id, date
                ))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["start_time"], "09:50:00");
    assert_eq!(slots[0]["end_time"], "10:40:00");
}

#[tokio::test]
async fn empty_availability_yields_empty_slot_list() {
    let server = MockServer::start().await;
    let practitioner_id = Uuid::new_v4().to_string();

    mount_practitioner(&server, &practitioner_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/slots?date=2099-06-02", practitioner_id))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["slots"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn past_dates_preview_as_empty() {
    let server = MockServer::start().await;
    let practitioner_id = Uuid::new_v4().to_string();

    mount_practitioner(&server, &practitioner_id).await;

    // A full window exists for that weekday, but the date is long gone.
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::availability_window_row(
                &practitioner_id, 1, "09:00:00", "11:00:00"
            )
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/slots?date=2020-01-06", practitioner_id))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["slots"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_practitioner_is_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/practitioners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/slots?date=2099-06-02", Uuid::new_v4()))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_positive_duration_is_bad_request() {
    let server = MockServer::start().await;
    let app = test_app(&server.uri());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/{}/slots?date=2099-06-02&duration_minutes=0",
                    Uuid::new_v4()
                ))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
