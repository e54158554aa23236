//! Axum-based HTTP server for layout status and operator commands.
//!
//! Provides REST endpoints for:
//! - GET `/api/status` - Layout status snapshot
//! - POST `/api/cabs/:address/target-speed` - Set a cab's target speed
//! - POST `/api/advance` - Manual sector advance
//! - POST `/api/estop` - Cut track power

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::WebConfig;
use crate::controller::LayoutStatus;
use crate::traits::CommandStation;

use super::api::{AdvanceResponse, ApiResponse, CommandResponse, SetTargetSpeedRequest};
use super::shared::SharedLayoutState;

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /api/status - Returns the layout status snapshot
async fn get_status<D: CommandStation + Send + 'static>(
    State(state): State<Arc<SharedLayoutState<D>>>,
) -> Json<ApiResponse<LayoutStatus>> {
    match state.run(|c| c.status()).await {
        Ok(status) => Json(ApiResponse::ok(status)),
        Err(_) => Json(ApiResponse::err("Controller unavailable")),
    }
}

/// POST /api/cabs/:address/target-speed
///
/// Accepts JSON: `{"speed": 40}`
async fn set_target_speed<D: CommandStation + Send + 'static>(
    State(state): State<Arc<SharedLayoutState<D>>>,
    Path(address): Path<u16>,
    body: Bytes,
) -> Json<ApiResponse<CommandResponse>> {
    let Ok(request) = serde_json::from_slice::<SetTargetSpeedRequest>(&body) else {
        return Json(ApiResponse::err("Invalid target speed request"));
    };

    match state
        .run(move |c| c.set_target_speed(address, request.speed))
        .await
    {
        Ok(true) => Json(ApiResponse::ok(CommandResponse::accepted("target_speed_set"))),
        Ok(false) => Json(ApiResponse::err(format!("No cab at address {}", address))),
        Err(_) => Json(ApiResponse::err("Controller unavailable")),
    }
}

/// POST /api/advance - Force the primary cab into the next sector
async fn advance_sector<D: CommandStation + Send + 'static>(
    State(state): State<Arc<SharedLayoutState<D>>>,
) -> Json<ApiResponse<AdvanceResponse>> {
    match state.run(|c| c.advance_sector()).await {
        Ok(sector) => Json(ApiResponse::ok(AdvanceResponse { sector })),
        Err(_) => Json(ApiResponse::err("Controller unavailable")),
    }
}

/// POST /api/estop - Cut track power
async fn emergency_stop<D: CommandStation + Send + 'static>(
    State(state): State<Arc<SharedLayoutState<D>>>,
) -> Json<ApiResponse<CommandResponse>> {
    let result = state
        .run(|c| c.emergency_stop().map_err(|e| e.to_string()))
        .await;

    match result {
        Ok(Ok(())) => Json(ApiResponse::ok(CommandResponse::accepted("emergency_stop"))),
        Ok(Err(e)) => {
            warn!(error = e.as_str(), "emergency stop failed");
            Json(ApiResponse::err(format!("Command station error: {}", e)))
        }
        Err(_) => Json(ApiResponse::err("Controller unavailable")),
    }
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not found")),
    )
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

impl WebServerConfig {
    /// Create from shared WebConfig
    pub fn from_config(config: &WebConfig) -> Self {
        Self {
            addr: config.addr(),
            cors_permissive: config.cors_permissive,
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router<D: CommandStation + Send + 'static>(
    state: Arc<SharedLayoutState<D>>,
    config: &WebServerConfig,
) -> Router {
    let mut router = Router::new()
        .route("/api/status", get(get_status::<D>))
        .route("/api/cabs/:address/target-speed", post(set_target_speed::<D>))
        .route("/api/advance", post(advance_sector::<D>))
        .route("/api/estop", post(emergency_stop::<D>))
        .fallback(not_found)
        .with_state(state);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Serve the HTTP API over shared state until the task is dropped.
pub async fn run_server<D: CommandStation + Send + 'static>(
    state: Arc<SharedLayoutState<D>>,
    config: WebServerConfig,
) -> Result<(), std::io::Error> {
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "web server listening");

    axum::serve(listener, router).await
}
