//! HTTP surface: Prometheus metrics, hub introspection, and the broadcast
//! ingress used by the chat backend after it commits a mutation.
//!
//! Runs on its own listener and tokio task, separate from the WebSocket
//! gateway.

use crate::dispatch::{Dispatcher, Scope};
use crate::error::DispatchError;
use crate::state::{Hub, HubStats, RoomSnapshot};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use roomcast_proto::{ChatEvent, EventKind, RoomId};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub dispatcher: Dispatcher,
    /// Bearer token required on broadcast routes, when configured.
    pub ingress_token: Option<Arc<str>>,
}

/// Errors surfaced to ingress callers.
enum ApiError {
    Unauthorized,
    Dispatch(DispatchError),
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid bearer token".to_string()),
            Self::Dispatch(e) => {
                let status = match e {
                    DispatchError::Invalid(_) => StatusCode::BAD_REQUEST,
                    DispatchError::QueueFull | DispatchError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.error_code(), e.to_string())
            }
        };
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn stats_handler(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

async fn room_handler(State(state): State<AppState>, Path(room_id): Path<RoomId>) -> Json<RoomSnapshot> {
    Json(state.hub.room_snapshot(room_id))
}

async fn broadcast_room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    headers: HeaderMap,
    Json(mut event): Json<ChatEvent>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    event.room_id.get_or_insert(room_id);

    let scope = Scope::Room {
        room_id,
        exclude: None,
    };
    state.dispatcher.dispatch(scope, &event)?;
    debug!(room_id, kind = %event.kind, "room broadcast queued");
    Ok(StatusCode::ACCEPTED)
}

async fn broadcast_all_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ChatEvent>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    // Viewers of any room may be showing the deleted message.
    let scope = if event.kind == EventKind::Delete {
        Scope::Everywhere
    } else {
        Scope::Global
    };
    state.dispatcher.dispatch(scope, &event)?;
    debug!(kind = %event.kind, "global broadcast queued");
    Ok(StatusCode::ACCEPTED)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.ingress_token else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        crate::metrics::record_dispatch_rejected("unauthorized");
        Err(ApiError::Unauthorized)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/broadcast/rooms/:room_id", post(broadcast_room_handler))
        .route("/broadcast/all", post(broadcast_all_handler))
        .with_state(state)
}

/// Serve the router on an already bound listener until hub shutdown.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let mut shutdown_rx = state.hub.lifecycle.subscribe();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}

/// Run the HTTP server.
///
/// This is a long-running task that should be spawned in the background.
pub async fn run_http_server(addr: SocketAddr, state: AppState) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind HTTP server");
            return;
        }
    };
    info!(%addr, "HTTP server listening");

    if let Err(e) = serve(listener, state).await {
        error!(error = %e, "HTTP server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use roomcast_proto::Route;
    use std::time::Duration;

    fn app_state(capacity: usize, token: Option<&str>) -> AppState {
        let hub = Arc::new(Hub::default());
        let (dispatcher, _worker) = Dispatcher::spawn(Arc::clone(&hub), capacity);
        AppState {
            hub,
            dispatcher,
            ingress_token: token.map(Arc::from),
        }
    }

    async fn start(token: Option<&str>) -> (Arc<Hub>, String) {
        let state = app_state(16, token);
        let hub = Arc::clone(&state.hub);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, state));
        (hub, base)
    }

    #[tokio::test]
    async fn test_room_broadcast_reaches_room() {
        let (hub, base) = start(None).await;
        let (_conn, mut rx) = hub.on_connect(&Identity::new(1, "a"), Route::Room(3));

        let event = json!({"type": "deleted", "clientId": "abc", "senderId": 7, "senderName": "alice"});
        let response = reqwest::Client::new()
            .post(format!("{base}/broadcast/rooms/3"))
            .json(&event)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(payload.contains(r#""roomId":3"#));
        assert!(payload.contains(r#""clientId":"abc""#));
    }

    #[tokio::test]
    async fn test_invalid_event_is_bad_request() {
        let (_hub, base) = start(None).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/broadcast/rooms/3"))
            .json(&json!({"type": "message", "content": "no client id"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["code"], "missing_field");
    }

    #[tokio::test]
    async fn test_ingress_token_required() {
        let (_hub, base) = start(Some("s3cret")).await;
        let client = reqwest::Client::new();
        let event = json!({"type": "delete", "clientId": "abc"});

        let denied = client
            .post(format!("{base}/broadcast/all"))
            .json(&event)
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

        let allowed = client
            .post(format!("{base}/broadcast/all"))
            .bearer_auth("s3cret")
            .json(&event)
            .send()
            .await
            .unwrap();
        assert_eq!(allowed.status(), reqwest::StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_delete_reaches_notify_and_rooms() {
        let (hub, base) = start(None).await;
        let (_n, mut notify_rx) = hub.on_connect(&Identity::new(1, "a"), Route::Notify);
        let (_r, mut room_rx) = hub.on_connect(&Identity::new(2, "b"), Route::Room(4));

        let response = reqwest::Client::new()
            .post(format!("{base}/broadcast/all"))
            .json(&json!({"type": "delete", "clientId": "abc"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        for rx in [&mut notify_rx, &mut room_rx] {
            let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(payload.contains(r#""clientId":"abc""#));
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_delete_without_partial_delivery() {
        let state = app_state(1, None);
        let hub = Arc::clone(&state.hub);
        let (_n, mut notify_rx) = hub.on_connect(&Identity::new(1, "a"), Route::Notify);
        let (_r, mut room_rx) = hub.on_connect(&Identity::new(2, "b"), Route::Room(4));

        // Occupy the only slot; the worker cannot drain it before the handler runs.
        let filler = ChatEvent::message(4, "filler", 1, "a", "hi");
        state
            .dispatcher
            .dispatch(Scope::Room { room_id: 4, exclude: None }, &filler)
            .unwrap();

        let delete: ChatEvent = serde_json::from_value(json!({"type": "delete", "clientId": "abc"})).unwrap();
        let response = broadcast_all_handler(State(state), HeaderMap::new(), Json(delete))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let first = tokio::time::timeout(Duration::from_secs(2), room_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.contains("filler"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(room_rx.try_recv().is_err());
        assert!(notify_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_introspection_routes() {
        let (hub, base) = start(None).await;
        let (_conn, _rx) = hub.on_connect(&Identity::new(7, "alice"), Route::Room(3));

        let health = reqwest::get(format!("{base}/health")).await.unwrap().text().await.unwrap();
        assert_eq!(health, "ok");

        let stats: serde_json::Value = reqwest::get(format!("{base}/stats")).await.unwrap().json().await.unwrap();
        assert_eq!(stats["roomConnections"], 1);

        let room: serde_json::Value = reqwest::get(format!("{base}/rooms/3")).await.unwrap().json().await.unwrap();
        assert_eq!(room["roomId"], 3);
        assert_eq!(room["connections"], 1);
    }
}
