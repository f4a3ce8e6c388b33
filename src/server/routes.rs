// ABOUTME: HTTP routes for the terminal server
// Namespace/pod listing for the terminal picker and the WebSocket exec endpoint

use super::socket;
use crate::exec::PodDirectory;
use crate::terminal::{SessionController, TerminalRequest};
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub directory: Arc<dyn PodDirectory>,
}

/// `{code, msg, data}` envelope returned by the JSON endpoints
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: &'static str,
    pub msg: String,
    pub data: Option<T>,
}

pub const SUCCESS: &str = "0";
pub const ERROR: &str = "1";

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS,
            msg: String::new(),
            data: Some(data),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            code: ERROR,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/k8s/namespaces", get(list_namespaces))
        .route("/k8s/namespaces/:namespace/pods", get(list_pods))
        .route("/terminal/exec", get(exec_handler))
        .with_state(state)
}

/// Mount the browser terminal: `/page/terminal` from `<web_dir>/html`, `/static` from `<web_dir>/static`
pub fn with_assets(router: Router, web_dir: &FsPath) -> Router {
    router
        .nest_service("/page/terminal", ServeDir::new(web_dir.join("html")))
        .nest_service("/static", ServeDir::new(web_dir.join("static")))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /k8s/namespaces
async fn list_namespaces(State(state): State<AppState>) -> Response {
    match state.directory.namespaces().await {
        Ok(namespaces) => Json(ApiResponse::success(namespaces)).into_response(),
        Err(e) => {
            warn!("Failed to list namespaces: {}", e);
            Json(ApiResponse::<()>::failed(e.to_string())).into_response()
        }
    }
}

/// GET /k8s/namespaces/:namespace/pods
async fn list_pods(State(state): State<AppState>, Path(namespace): Path<String>) -> Response {
    if namespace.trim().is_empty() {
        return Json(ApiResponse::<()>::failed("namespace cannot be null")).into_response();
    }
    match state.directory.pods(&namespace).await {
        Ok(pods) => Json(ApiResponse::success(pods)).into_response(),
        Err(e) => {
            warn!("Failed to list pods in {}: {}", namespace, e);
            Json(ApiResponse::<()>::failed(e.to_string())).into_response()
        }
    }
}

/// GET /terminal/exec?namespace=..&pod=..&container=.. - WebSocket endpoint
async fn exec_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(request): Query<TerminalRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::failed(e.to_string())),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let (source, sink) = socket::split(socket);
        match state
            .controller
            .run(request, Box::new(source), Box::new(sink))
            .await
        {
            Ok(()) => info!("Terminal session closed"),
            Err(e) => warn!("Terminal session ended: {}", e),
        }
    })
}
