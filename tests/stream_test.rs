use async_trait::async_trait;
use skinmotion::sync::{
    ConnectionState, StreamClient, StreamConnector, StreamSettings, StreamTransport, SyncError, SyncResult,
    WsMessage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
enum Script {
    Refuse,
    /// Stay open until the test drops the feed or the client closes it
    Open,
    /// Accept, then report the peer closing at once
    OpenThenClose,
}

#[derive(Clone)]
struct TransportProbe {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    feed: Option<mpsc::UnboundedSender<String>>,
}

impl TransportProbe {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn push(&self, text: &str) {
        self.feed.as_ref().unwrap().send(text.to_string()).unwrap();
    }
}

struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    frames: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> SyncResult<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<SyncResult<String>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct ScriptedConnector {
    started: Instant,
    script: Mutex<VecDeque<Script>>,
    attempts: Mutex<Vec<u64>>,
    transports: Mutex<Vec<TransportProbe>>,
}

impl ScriptedConnector {
    fn new(script: &[Script]) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            script: Mutex::new(script.iter().copied().collect()),
            attempts: Mutex::new(Vec::new()),
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Seconds since creation at which each connect attempt happened
    fn attempts(&self) -> Vec<u64> {
        self.attempts.lock().unwrap().clone()
    }

    fn transport(&self, index: usize) -> TransportProbe {
        self.transports.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self) -> SyncResult<Box<dyn StreamTransport>> {
        self.attempts.lock().unwrap().push(self.started.elapsed().as_secs());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Refuse);
        if let Script::Refuse = step {
            return Err(SyncError::RemoteUnavailable {
                reason: "connection refused".to_string(),
            });
        }

        let (feed, frames) = mpsc::unbounded_channel();
        let probe = TransportProbe {
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            feed: matches!(step, Script::Open).then_some(feed),
        };
        self.transports.lock().unwrap().push(probe.clone());
        Ok(Box::new(ScriptedTransport {
            sent: probe.sent,
            closed: probe.closed,
            frames,
        }))
    }
}

fn start(connector: &Arc<ScriptedConnector>) -> (StreamClient, mpsc::UnboundedReceiver<WsMessage>) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let client = StreamClient::start(&Handle::current(), connector.clone(), StreamSettings::default(), inbound_tx);
    (client, inbound_rx)
}

async fn wait_connected(client: &StreamClient) {
    client
        .subscribe_state()
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .map(|_| ())
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_connects_back_off_linearly() {
    let connector = ScriptedConnector::new(&[]);
    let (client, _events) = start(&connector);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(connector.attempts(), vec![0, 5, 15, 30]);
    assert!(!client.is_connected());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_resets_backoff() {
    let connector = ScriptedConnector::new(&[Script::Refuse, Script::Refuse, Script::OpenThenClose]);
    let (client, _events) = start(&connector);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(connector.attempts(), vec![0, 5, 15, 20, 30]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_ping_every_interval() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, _events) = start(&connector);
    wait_connected(&client).await;
    let transport = connector.transport(0);

    sleep(Duration::from_secs(29)).await;
    assert!(transport.sent().is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.sent(), vec![WsMessage::Ping.to_json()]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_connection_is_torn_down() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, _events) = start(&connector);
    wait_connected(&client).await;
    let transport = connector.transport(0);

    sleep(Duration::from_secs(59)).await;
    assert!(client.is_connected());
    assert!(!transport.is_closed());

    sleep(Duration::from_secs(2)).await;
    assert!(transport.is_closed());
    assert!(!client.is_connected());
    assert_eq!(connector.attempts(), vec![0]);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(), vec![0, 65]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_inbound_traffic_extends_liveness() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, _events) = start(&connector);
    wait_connected(&client).await;
    let transport = connector.transport(0);

    sleep(Duration::from_secs(50)).await;
    transport.push(r#"{"type":"Pong"}"#);
    sleep(Duration::from_secs(50)).await;
    assert!(client.is_connected());
    assert!(!transport.is_closed());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_inbound_events_forwarded_without_pongs() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, mut events) = start(&connector);
    wait_connected(&client).await;
    let transport = connector.transport(0);
    let subject = Uuid::new_v4();

    transport.push(r#"{"type":"Pong","data":null}"#);
    transport.push("not json at all");
    transport.push(&format!(
        r#"{{"type":"SkinUpdated","data":{{"minecraft_uuid":"{}","minecraft_username":"Alex"}}}}"#,
        subject
    ));

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        WsMessage::SkinUpdated {
            subject,
            name: "Alex".to_string(),
        }
    );
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_outbound_messages_sent_while_connected() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, _events) = start(&connector);
    wait_connected(&client).await;
    let subject = Uuid::new_v4();

    client.send(WsMessage::PlayerOffline { subject });
    sleep(Duration::from_millis(10)).await;

    assert_eq!(
        connector.transport(0).sent(),
        vec![WsMessage::PlayerOffline { subject }.to_json()]
    );
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_outbound_messages_dropped_while_disconnected() {
    let connector = ScriptedConnector::new(&[Script::Refuse, Script::Open]);
    let (client, _events) = start(&connector);

    sleep(Duration::from_secs(1)).await;
    client.send(WsMessage::PlayerOffline { subject: Uuid::new_v4() });
    wait_connected(&client).await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.attempts(), vec![0, 5]);
    assert!(connector.transport(0).sent().is_empty());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_and_stops_reconnecting() {
    let connector = ScriptedConnector::new(&[Script::Open]);
    let (client, _events) = start(&connector);
    wait_connected(&client).await;

    client.shutdown().await;
    assert!(connector.transport(0).is_closed());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.attempts(), vec![0]);
}
