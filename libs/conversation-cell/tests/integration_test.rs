use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::router::conversation_routes;
use shared_utils::test_utils::{MockPostgrestResponses, TestConfig};

fn test_app(mock_url: &str) -> Router {
    conversation_routes(Arc::new(TestConfig::with_url(mock_url).to_app_config()))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Mounts the row pair every session access reads: the session itself
/// and its single state row.
async fn mount_session(
    server: &MockServer,
    session_id: &str,
    practitioner_id: &str,
    status: &str,
    current_step: &str,
    context: Value,
    last_updated: &str,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/conversation_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::session_row(
                session_id,
                &Uuid::new_v4().to_string(),
                practitioner_id,
                status,
                "chat",
            )
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/session_states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::session_state_row(session_id, current_step, context, last_updated)
        ])))
        .mount(server)
        .await;
}

/// Slot computation touches practitioners, availability_windows and
/// appointments; booking events fire in the background.
async fn mount_slot_sources(server: &MockServer, practitioner_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/practitioners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::practitioner_row(practitioner_id, "Dr. Reyes")
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::availability_window_row(
                practitioner_id, 1, "09:00:00", "11:00:00"
            )
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_state_patch(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/session_states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_session_patch(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/conversation_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn picking_a_date_offers_slots() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "date_selection",
        json!({}),
        &Utc::now().to_rfc3339(),
    )
    .await;
    mount_slot_sources(&server, &practitioner_id).await;
    mount_state_patch(&server).await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "date", "date": "2099-06-01" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["current_step"], "time_selection");
    assert_eq!(body["terminal"], false);
    // A 09:00-11:00 window with 50-minute slots yields 09:00 and 09:50.
    let slots = body["prompt"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["start_time"], "09:00:00");
    assert_eq!(slots[1]["start_time"], "09:50:00");
}

#[tokio::test]
async fn terminal_session_replays_without_side_effects() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "completed",
        "completed",
        json!({}),
        &Utc::now().to_rfc3339(),
    )
    .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "continue" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session_status"], "completed");
    assert_eq!(body["terminal"], true);

    // No PATCH mock was mounted, so any write would have failed the test
    // with a database error instead of this clean replay.
}

#[tokio::test]
async fn idle_session_expires_without_consuming_input() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "date_selection",
        json!({}),
        "2020-01-01T00:00:00Z",
    )
    .await;
    mount_session_patch(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "date", "date": "2099-06-01" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session_status"], "expired");
    assert_eq!(body["terminal"], true);
    // The date was never applied: the step is still date_selection.
    assert_eq!(body["current_step"], "date_selection");
}

#[tokio::test]
async fn cancel_abandons_an_active_session() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "time_selection",
        json!({}),
        &Utc::now().to_rfc3339(),
    )
    .await;
    mount_session_patch(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = test_app(&server.uri())
        .oneshot(post(&format!("/{}/cancel", session_id), json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session_status"], "abandoned");
    assert_eq!(body["terminal"], true);
}

#[tokio::test]
async fn unknown_session_returns_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversation_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", Uuid::new_v4()),
            json!({ "type": "continue" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submitting_details_books_and_completes_the_session() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    let context = json!({
        "selected_date": "2099-06-01",
        "offered": {
            "date": "2099-06-01",
            "slots": [
                { "date": "2099-06-01", "start_time": "09:00:00", "end_time": "09:50:00" }
            ]
        },
        "selected_slot": { "date": "2099-06-01", "start_time": "09:00:00", "end_time": "09:50:00" }
    });

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "details_collection",
        context,
        &Utc::now().to_rfc3339(),
    )
    .await;
    mount_slot_sources(&server, &practitioner_id).await;
    mount_state_patch(&server).await;
    mount_session_patch(&server).await;

    let mut committed = MockPostgrestResponses::appointment_row(
        &Uuid::new_v4().to_string(),
        &practitioner_id,
        chrono::NaiveDate::from_ymd_opt(2099, 6, 1).unwrap(),
        "09:00:00",
        "09:50:00",
        "scheduled",
    );
    committed["id"] = json!(appointment_id);
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([committed])))
        .mount(&server)
        .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "details", "name": "Ana", "notes": "first visit" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session_status"], "completed");
    assert_eq!(body["current_step"], "completed");
    assert_eq!(body["terminal"], true);
    assert_eq!(body["prompt"]["appointment_id"], json!(appointment_id));
}

#[tokio::test]
async fn losing_the_booking_race_reoffers_slots() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    let context = json!({
        "selected_date": "2099-06-01",
        "offered": {
            "date": "2099-06-01",
            "slots": [
                { "date": "2099-06-01", "start_time": "09:00:00", "end_time": "09:50:00" },
                { "date": "2099-06-01", "start_time": "09:50:00", "end_time": "10:40:00" }
            ]
        },
        "selected_slot": { "date": "2099-06-01", "start_time": "09:00:00", "end_time": "09:50:00" }
    });

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "details_collection",
        context,
        &Utc::now().to_rfc3339(),
    )
    .await;
    mount_slot_sources(&server, &practitioner_id).await;
    mount_state_patch(&server).await;

    // The storage layer refuses the insert: another writer holds the range.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&server)
        .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "details", "name": "Ana", "notes": null }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session_status"], "active");
    assert_eq!(body["current_step"], "time_selection");
    assert_eq!(body["terminal"], false);
    assert!(body["prompt"]["slots"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn stale_offered_slots_are_refused() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4().to_string();
    let practitioner_id = Uuid::new_v4().to_string();

    // The offered list was computed for a different date than the one
    // currently selected, so index selection must not bind.
    let context = json!({
        "selected_date": "2099-06-08",
        "offered": {
            "date": "2099-06-01",
            "slots": [
                { "date": "2099-06-01", "start_time": "09:00:00", "end_time": "09:50:00" }
            ]
        }
    });

    mount_session(
        &server,
        &session_id,
        &practitioner_id,
        "active",
        "time_selection",
        context,
        &Utc::now().to_rfc3339(),
    )
    .await;

    let response = test_app(&server.uri())
        .oneshot(post(
            &format!("/{}/advance", session_id),
            json!({ "type": "slot", "index": 0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
