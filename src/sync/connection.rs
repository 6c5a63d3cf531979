//! Persistent event stream to the remote authority
//!
//! A single tokio task owns the connection, its heartbeat, its liveness
//! deadline and the reconnect backoff, so no two timers for the same
//! connection ever fire concurrently. Shutdown is signalled through a watch
//! channel and stops reconnection for good.

use super::api::normalize_base_url;
use super::messages::WsMessage;
use super::state_machine::{ConnectionState, ConnectionStateMachine};
use super::{SyncError, SyncResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-API-Key";
const STREAM_PATH: &str = "/ws/plugin";

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub reconnect_step: Duration,
    pub reconnect_cap: Duration,
    pub heartbeat_interval: Duration,
    /// Silence longer than this tears the connection down
    pub liveness_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_step: Duration::from_secs(5),
            reconnect_cap: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(60),
        }
    }
}

/// Backoff before reconnect attempt `attempt` (1-based): `min(attempt * step, cap)`
pub fn reconnect_delay(attempt: u32, step: Duration, cap: Duration) -> Duration {
    step.saturating_mul(attempt).min(cap)
}

/// Stream endpoint derived from the HTTP API base URL
pub fn stream_url(api_url: &str) -> SyncResult<Url> {
    let base = normalize_base_url(api_url);
    let mut url = Url::parse(&format!("{}{}", base, STREAM_PATH)).map_err(|e| SyncError::Transport {
        reason: format!("invalid API url '{}': {}", api_url, e),
    })?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(SyncError::Transport {
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| SyncError::Transport {
        reason: format!("cannot switch '{}' to {}", api_url, scheme),
    })?;
    Ok(url)
}

/// Opens a fresh transport for every connection attempt
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> SyncResult<Box<dyn StreamTransport>>;
}

/// One open text-frame connection
#[async_trait]
pub trait StreamTransport: Send {
    async fn send_text(&mut self, text: String) -> SyncResult<()>;

    /// Next text frame; `None` once the peer closed the connection
    async fn next_text(&mut self) -> Option<SyncResult<String>>;

    async fn close(&mut self);
}

/// Websocket connector authenticating with a pre-shared key header
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    api_key: String,
}

impl WebSocketConnector {
    pub fn new(url: Url, api_key: impl Into<String>) -> Self {
        Self {
            url,
            api_key: api_key.into(),
        }
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

fn transport_error(e: impl std::fmt::Display) -> SyncError {
    SyncError::Transport { reason: e.to_string() }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self) -> SyncResult<Box<dyn StreamTransport>> {
        let mut request = self.url.as_str().into_client_request().map_err(transport_error)?;
        let key = HeaderValue::from_str(&self.api_key).map_err(transport_error)?;
        request.headers_mut().insert(API_KEY_HEADER, key);

        debug!("📡 Connecting to {}", self.url);
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SyncError::RemoteUnavailable { reason: e.to_string() })?;
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> SyncResult<()> {
        self.stream.send(Message::Text(text)).await.map_err(transport_error)
    }

    async fn next_text(&mut self) -> Option<SyncResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(transport_error(e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Websocket close: {}", e);
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// State owned by the connection task
struct StreamWorker {
    connector: Arc<dyn StreamConnector>,
    settings: StreamSettings,
    outbound: mpsc::UnboundedReceiver<WsMessage>,
    outbound_closed: bool,
    inbound: mpsc::UnboundedSender<WsMessage>,
    shutdown: watch::Receiver<bool>,
    machine: ConnectionStateMachine,
    state_tx: watch::Sender<ConnectionState>,
}

impl StreamWorker {
    fn transition(&mut self, state: ConnectionState) {
        if let Err(e) = self.machine.transition_to(state) {
            warn!("{}", e);
        }
        self.state_tx.send_replace(self.machine.current_state());
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run(mut self) {
        let mut attempt: u32 = 0;

        while !self.shutting_down() {
            self.transition(ConnectionState::Connecting);
            let connected = tokio::select! {
                result = self.connector.connect() => result,
                _ = self.shutdown.changed() => break,
            };

            match connected {
                Ok(mut transport) => {
                    self.transition(ConnectionState::Connected);
                    attempt = 0;
                    let end = self.run_session(transport.as_mut()).await;
                    self.transition(ConnectionState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => warn!("📡 Event stream lost: {}", reason),
                    }
                }
                Err(e) => {
                    self.transition(ConnectionState::Disconnected);
                    warn!("📡 Event stream connect failed: {}", e);
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = reconnect_delay(attempt, self.settings.reconnect_step, self.settings.reconnect_cap);
            info!("🔄 Reconnecting in {}s (attempt {})", delay.as_secs(), attempt);
            if !self.backoff(delay).await {
                break;
            }
        }

        self.transition(ConnectionState::Disconnected);
        info!("📡 Event stream stopped");
    }

    /// Wait out the backoff, dropping outbound messages. False on shutdown.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown.changed() => return false,
                message = self.outbound.recv(), if !self.outbound_closed => match message {
                    Some(m) => debug!("Dropping {} while disconnected", m.type_name()),
                    None => self.outbound_closed = true,
                },
            }
        }
    }

    async fn run_session(&mut self, transport: &mut dyn StreamTransport) -> SessionEnd {
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            let deadline = last_inbound + self.settings.liveness_timeout;
            tokio::select! {
                _ = self.shutdown.changed() => {
                    transport.close().await;
                    return SessionEnd::Shutdown;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    transport.close().await;
                    return SessionEnd::Lost("no traffic within liveness timeout".to_string());
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = transport.send_text(WsMessage::Ping.to_json()).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                message = self.outbound.recv(), if !self.outbound_closed => match message {
                    Some(m) => {
                        debug!("📤 {}", m.type_name());
                        if let Err(e) = transport.send_text(m.to_json()).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    None => self.outbound_closed = true,
                },
                frame = transport.next_text() => match frame {
                    Some(Ok(text)) => {
                        last_inbound = Instant::now();
                        match WsMessage::from_json(&text) {
                            Some(WsMessage::Pong) | None => {}
                            Some(message) => {
                                debug!("📥 {}", message.type_name());
                                if self.inbound.send(message).is_err() {
                                    debug!("No listener for stream events");
                                }
                            }
                        }
                    }
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("closed by remote".to_string()),
                },
            }
        }
    }
}

/// Handle to the running connection task
pub struct StreamClient {
    outbound: mpsc::UnboundedSender<WsMessage>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    /// Spawn the connection task on `runtime`. Inbound events go to `inbound`.
    pub fn start(
        runtime: &tokio::runtime::Handle,
        connector: Arc<dyn StreamConnector>,
        settings: StreamSettings,
        inbound: mpsc::UnboundedSender<WsMessage>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let worker = StreamWorker {
            connector,
            settings,
            outbound: outbound_rx,
            outbound_closed: false,
            inbound,
            shutdown: shutdown_rx,
            machine: ConnectionStateMachine::new(),
            state_tx,
        };
        let task = runtime.spawn(worker.run());

        Self {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            state: state_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a message; it is dropped unless a connection comes up
    pub fn send(&self, message: WsMessage) {
        if self.outbound.send(message).is_err() {
            debug!("Event stream stopped, message dropped");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop reconnecting, close the socket and wait for the task to finish
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Event stream task ended abnormally: {}", e);
            }
        }
    }
}
