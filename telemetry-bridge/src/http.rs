/**
 * HTTP / WEBSOCKET SURFACE - dashboard push endpoint and read-only API
 *
 * ROUTES:
 * - GET /, GET /ws  : WebSocket upgrade. Snapshot on connect (if any device
 *                     is active), then one `{device_id: record}` frame per
 *                     accepted telemetry message. Client frames are ignored.
 * - GET /health     : bridge health counters as JSON
 * - GET /devices    : current active snapshot as JSON
 *
 * Each socket is split: a writer task drains the viewer queue into the sink,
 * the reader loop only watches for Close/errors. Either side ending tears the
 * session down and unregisters the viewer.
 */

use crate::health::{BridgeHealth, HealthTracker};
use crate::models::Snapshot;
use crate::store::DeviceStore;
use crate::viewers::ViewerRegistry;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use time::{Duration, OffsetDateTime};
use tracing::{debug, trace};

#[derive(Clone)]
pub struct AppState {
    pub store: DeviceStore,
    pub viewers: ViewerRegistry,
    pub health: HealthTracker,
    pub window: Duration,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(get_health))
        .route("/devices", get(get_devices))
        .with_state(app_state)
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<BridgeHealth> {
    let active = app.store.active_snapshot(OffsetDateTime::now_utc(), app.window).len();
    Json(app.health.report(app.store.len(), active, app.viewers.len()))
}

// GET /devices
async fn get_devices(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.store.active_snapshot(OffsetDateTime::now_utc(), app.window))
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app.viewers))
}

async fn handle_socket(socket: WebSocket, viewers: ViewerRegistry) {
    let session = viewers.register(OffsetDateTime::now_utc());
    let viewer_id = session.id;
    let mut outbound = session.outbound;
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!(viewer = %viewer_id, "websocket sink closed");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => trace!(viewer = %viewer_id, "ignoring client frame"),
                Err(e) => {
                    debug!(viewer = %viewer_id, error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    viewers.unregister(viewer_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TelemetryRecord;
    use serde_json::json;

    async fn serve(state: AppState) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        addr
    }

    fn state() -> AppState {
        let store = DeviceStore::new();
        let window = Duration::seconds(30);
        AppState {
            viewers: ViewerRegistry::new(store.clone(), window),
            store,
            health: HealthTracker::new(),
            window,
        }
    }

    #[tokio::test]
    async fn test_devices_endpoint_lists_active_only() {
        let app = state();
        let now = OffsetDateTime::now_utc();
        let rec: TelemetryRecord = serde_json::from_value(json!({"device_id": "pi-4", "cpu_percent": 3})).unwrap();
        app.store.upsert("pi-4", rec.clone(), now);
        app.store.upsert("gone", rec, now - Duration::minutes(5));
        let addr = serve(app).await;

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/devices"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"pi-4": {"device_id": "pi-4", "cpu_percent": 3}}));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = state();
        app.health.record_accepted();
        let addr = serve(app).await;

        let health: BridgeHealth = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.messages_accepted, 1);
        assert_eq!(health.mqtt_status, "connecting");
        assert_eq!(health.viewers_connected, 0);
    }
}
