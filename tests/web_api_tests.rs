//! Integration tests for the web API.
//!
//! These tests verify the HTTP API endpoints work correctly.

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use signalbox::controller::LayoutStatus;
use signalbox::hal::MockCommandStation;
use signalbox::services::{
    build_router, AdvanceResponse, ApiResponse, CommandResponse, SharedLayoutState, WebServerConfig,
};
use signalbox::{LayoutController, LayoutLoader, SectorId};

const LAYOUT: &str = r#"
name: web
cabs:
  - { name: Santa Fe 3751, address: 2 }
sectors:
  - { id: hill, name: Hill Climb, speed_limit: 20 }
  - { id: flat, name: Straight }
proximity_sensors:
  - { id: crest, sector_id: hill }
"#;

type State = Arc<SharedLayoutState<MockCommandStation>>;

fn create_test_app() -> (axum::Router, State) {
    let layout = LayoutLoader::from_yaml(LAYOUT).unwrap();
    let controller = LayoutController::new(layout, MockCommandStation::new());
    let state = Arc::new(SharedLayoutState::new(controller));
    let config = WebServerConfig::default();
    let router = build_router(Arc::clone(&state), &config);
    (router, state)
}

fn post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_get_status() {
    let (app, _state) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json: ApiResponse<LayoutStatus> = read_json(response).await;
    assert!(json.success);

    let data = json.data.unwrap();
    assert_eq!(data.layout.name, "web");
    assert_eq!(data.cabs[0].address, 2);
    assert_eq!(data.cabs[0].location, None);
    assert_eq!(data.sectors[0].id, SectorId::from("hill"));
    assert_eq!(data.sectors[1].speed_limit, Some(10));
}

#[tokio::test]
async fn test_set_target_speed() {
    let (app, state) = create_test_app();

    let response = app
        .oneshot(post("/api/cabs/2/target-speed", r#"{"speed": 35}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<CommandResponse> = read_json(response).await;
    assert_eq!(json, ApiResponse::ok(CommandResponse::accepted("target_speed_set")));

    let target = state.with_controller(|c| c.primary_cab().unwrap().target_speed());
    assert_eq!(target, 35);
}

#[tokio::test]
async fn test_set_target_speed_unknown_cab() {
    let (app, state) = create_test_app();
    let before = state.status();

    let response = app
        .oneshot(post("/api/cabs/9/target-speed", r#"{"speed": 35}"#))
        .await
        .unwrap();

    let json: ApiResponse<CommandResponse> = read_json(response).await;
    assert!(!json.success);
    assert_eq!(json.error.as_deref(), Some("No cab at address 9"));
    assert_eq!(state.status(), before);
}

#[tokio::test]
async fn test_set_target_speed_bad_body() {
    let (app, _state) = create_test_app();

    let response = app
        .oneshot(post("/api/cabs/2/target-speed", r#"{"speed": "fast"}"#))
        .await
        .unwrap();

    let json: ApiResponse<CommandResponse> = read_json(response).await;
    assert!(!json.success);
    assert!(json.error.is_some());
}

#[tokio::test]
async fn test_advance_sector() {
    let (app, state) = create_test_app();

    let response = app.clone().oneshot(post("/api/advance", "")).await.unwrap();
    let json: ApiResponse<AdvanceResponse> = read_json(response).await;
    assert_eq!(json.data.unwrap().sector, Some(SectorId::from("hill")));

    let response = app.oneshot(post("/api/advance", "")).await.unwrap();
    let json: ApiResponse<AdvanceResponse> = read_json(response).await;
    assert_eq!(json.data.unwrap().sector, Some(SectorId::from("flat")));

    let status = state.status();
    assert_eq!(status.cabs[0].location.as_ref().unwrap().id, SectorId::from("flat"));
    assert_eq!(status.cabs[0].target_speed, 0);
}

#[tokio::test]
async fn test_emergency_stop() {
    let (app, state) = create_test_app();

    let response = app.oneshot(post("/api/estop", "")).await.unwrap();

    let json: ApiResponse<CommandResponse> = read_json(response).await;
    assert!(json.success);
    assert_eq!(json.data.unwrap().result, "emergency_stop");

    let sent = state.with_controller(|c| c.dcc().sent.clone());
    assert_eq!(sent, vec!["<0 MAIN>"]);
}

#[tokio::test]
async fn test_emergency_stop_station_offline() {
    let (app, state) = create_test_app();
    state.with_controller(|c| c.dcc_mut().fail_sends(true));

    let response = app.oneshot(post("/api/estop", "")).await.unwrap();

    let json: ApiResponse<CommandResponse> = read_json(response).await;
    assert!(!json.success);
    assert!(json.error.unwrap().contains("offline"));
}

#[tokio::test]
async fn test_not_found() {
    let (app, _state) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_headers() {
    let (app, _state) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/status")
                .header("Origin", "http://example.com")
                .header("Access-Control-Request-Method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
