// THEORY:
// Sessions publish a `TickReport` for every tick onto a broadcast `StatusBus`. Display
// collaborators (the console renderer, the web status server) subscribe and draw
// whatever they like; a slow subscriber only lags itself, never the frame loop.
//
// `LatestReports` follows the bus and keeps the most recent report per stream so a
// late joiner (an HTTP `GET /status`) has something to show before the next tick.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use posture_sentinel::{ShutdownTrigger, TickReport};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct StatusBus {
    pub reports_tx: broadcast::Sender<TickReport>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (reports_tx, _) = broadcast::channel::<TickReport>(capacity.max(1));
        Self { reports_tx }
    }

    /// A sender to hand to `Session::with_reports`.
    pub fn sender(&self) -> broadcast::Sender<TickReport> {
        self.reports_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.reports_tx.subscribe()
    }
}

/// The most recent report of every stream seen on the bus.
#[derive(Clone, Default)]
pub struct LatestReports {
    inner: Arc<RwLock<BTreeMap<String, TickReport>>>,
}

impl LatestReports {
    pub fn record(&self, report: TickReport) {
        let mut reports = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        reports.insert(report.stream.clone(), report);
    }

    pub fn get(&self, stream: &str) -> Option<TickReport> {
        let reports = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reports.get(stream).cloned()
    }

    /// All streams, ordered by name.
    pub fn all(&self) -> Vec<TickReport> {
        let reports = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reports.values().cloned().collect()
    }

    /// Keeps this store up to date from `bus` until every sender is gone.
    pub fn track(&self, bus: &StatusBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let latest = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(report) => latest.record(report),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("status tracker skipped {skipped} reports");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ControlHandle {
    pub shutdown: ShutdownTrigger,
}

#[cfg(feature = "web")]
pub async fn start_server(
    bus: StatusBus,
    latest: LatestReports,
    cfg: ServerConfig,
    control: ControlHandle,
) -> anyhow::Result<JoinHandle<()>> {
    use anyhow::Context;
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures_util::{SinkExt, StreamExt};
    use log::{info, warn};

    async fn stream_reports(socket: WebSocket, mut reports: broadcast::Receiver<TickReport>) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        loop {
            tokio::select! {
                report = reports.recv() => match report {
                    Ok(report) => {
                        let Ok(text) = serde_json::to_string(&report) else { continue };
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("status socket skipped {skipped} reports");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        let _ = ws_tx.close().await;
    }

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/status", get({
            let latest = latest.clone();
            move || {
                let latest = latest.clone();
                async move { Json(latest.all()) }
            }
        }))
        .route("/ws/status", get({
            let bus = bus.clone();
            move |ws: WebSocketUpgrade| {
                let reports = bus.subscribe();
                async move { ws.on_upgrade(move |socket| stream_reports(socket, reports)) }
            }
        }))
        .route("/control/stop", post({
            let shutdown = control.shutdown.clone();
            move || {
                let shutdown = shutdown.clone();
                async move {
                    warn!("shutdown requested through the status server");
                    shutdown.trigger();
                    StatusCode::NO_CONTENT
                }
            }
        }));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding status server to {}", cfg.bind_addr))?;
    info!("Status server listening on http://{}", cfg.bind_addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("status server stopped: {e}");
        }
    });

    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(
    _bus: StatusBus,
    _latest: LatestReports,
    _cfg: ServerConfig,
    _control: ControlHandle,
) -> anyhow::Result<JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for posture_sentinel_status"))
}
