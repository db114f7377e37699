/*!
Mock chat webhook.

Binds an HTTP server on a random loopback port, records the `text` field of
every JSON body POSTed to `/hook` and answers with a fixed status code.
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Deserialize)]
struct HookBody {
    text: String,
}

#[derive(Clone)]
struct HookState {
    received: Arc<Mutex<Vec<String>>>,
    status: StatusCode,
}

pub struct MockWebhookServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockWebhookServer {
    /// Server answering `200 ok`.
    pub async fn start() -> Result<Self> {
        Self::start_with_status(200).await
    }

    pub async fn start_with_status(status: u16) -> Result<Self> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = HookState {
            received: received.clone(),
            status: StatusCode::from_u16(status)?,
        };
        let app = Router::new().route("/hook", post(receive)).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[mock-webhook] server stopped: {}", e);
            }
        });
        log::info!("[mock-webhook] listening on {}", addr);

        Ok(Self { addr, received, task })
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub fn received_texts(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Polls until at least `count` notifications arrived or `timeout` elapsed.
    pub async fn wait_for_texts(&self, count: usize, timeout: Duration) -> Vec<String> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let texts = self.received_texts();
            if texts.len() >= count {
                return texts;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.received_texts()
    }
}

impl Drop for MockWebhookServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive(State(state): State<HookState>, Json(body): Json<HookBody>) -> (StatusCode, &'static str) {
    log::info!("[mock-webhook] received {} bytes", body.text.len());
    state.received.lock().unwrap().push(body.text);
    let reply = if state.status.is_success() { "ok" } else { "error" };
    (state.status, reply)
}
