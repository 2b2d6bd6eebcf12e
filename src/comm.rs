// MIT License - Copyright (c) 2026 Peter Wright
// Relay connection supervisor

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::constants::{CLOSE_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_PARTITION, RECONNECT_DELAY};
use crate::crypto::RelayKey;
use crate::dispatch::Dispatcher;
use crate::error::{RelayError, Result};
use crate::event::PanelEvent;
use crate::transport::command::CommandSender;
use crate::transport::direct::Connector;
use crate::transport::frame::{read_message, FrameTimeouts};

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Between sessions, waiting out the reconnect delay.
    Disconnected,
    Connecting,
    Connected,
    /// Terminal. Entered only through an explicit stop.
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Timing for the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommSettings {
    pub connect_timeout: Duration,
    pub frame: FrameTimeouts,
    /// Fixed, no growth between attempts.
    pub reconnect_delay: Duration,
    /// Partition created on every successful connect if it does not exist.
    pub default_partition: u32,
}

impl Default for CommSettings {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            frame: FrameTimeouts::default(),
            reconnect_delay: RECONNECT_DELAY,
            default_partition: DEFAULT_PARTITION,
        }
    }
}

impl From<&RelayConfig> for CommSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            frame: FrameTimeouts {
                idle: config.idle_timeout(),
                body: config.body_timeout(),
            },
            reconnect_delay: config.reconnect_delay(),
            default_partition: config.default_partition,
        }
    }
}

/// Keeps one session to the relay alive until stopped.
///
/// Loop: connect (bounded), read frames and hand them to the dispatcher
/// until the session fails, tear down, wait the fixed delay, repeat. Every
/// wait races the shutdown signal, so a stop interrupts connect, read and
/// backoff alike and is never mistaken for a connection failure.
pub struct RelayComm<C: Connector> {
    connector: C,
    key: Arc<RelayKey>,
    dispatcher: Dispatcher,
    sender: CommandSender,
    status: Arc<watch::Sender<ConnectionState>>,
    settings: CommSettings,
}

impl<C: Connector> RelayComm<C> {
    pub fn new(
        connector: C,
        key: Arc<RelayKey>,
        dispatcher: Dispatcher,
        sender: CommandSender,
        status: Arc<watch::Sender<ConnectionState>>,
        settings: CommSettings,
    ) -> Self {
        Self {
            connector,
            key,
            dispatcher,
            sender,
            status,
            settings,
        }
    }

    /// Run until `shutdown` becomes `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let target = self.connector.describe();
        let retry_secs = self.settings.reconnect_delay.as_secs();
        info!("Starting relay client for {}", target);

        loop {
            self.set_state(ConnectionState::Connecting);
            debug!("Connecting to relay at {}", target);

            let attempt = timeout(self.settings.connect_timeout, self.connector.connect());
            match until_shutdown(&mut shutdown, attempt).await {
                Err(_) => break,
                Ok(Err(_)) => {
                    warn!(
                        "Cannot connect to relay at {}: timed out after {}s, retrying in {}s",
                        target,
                        self.settings.connect_timeout.as_secs(),
                        retry_secs
                    );
                }
                Ok(Ok(Err(e))) => {
                    warn!("Cannot connect to relay at {}: {}, retrying in {}s", target, e, retry_secs);
                }
                Ok(Ok(Ok(stream))) => match self.serve(stream, &mut shutdown).await {
                    RelayError::Cancelled => break,
                    e if e.is_retryable() => {
                        warn!("Relay session to {} ended: {}, reconnecting in {}s", target, e, retry_secs);
                    }
                    e => {
                        error!("Relay session to {} failed: {}, reconnecting in {}s", target, e, retry_secs);
                    }
                },
            }

            self.set_state(ConnectionState::Disconnected);
            if until_shutdown(&mut shutdown, sleep(self.settings.reconnect_delay))
                .await
                .is_err()
            {
                break;
            }
        }

        self.set_state(ConnectionState::Stopped);
        info!("Relay client stopped");
    }

    /// Run one session. Always tears down before returning the reason it ended.
    async fn serve(&self, stream: C::Stream, shutdown: &mut watch::Receiver<bool>) -> RelayError {
        let (mut reader, writer) = tokio::io::split(stream);
        let writer = self.sender.attach(Box::new(writer));
        let bus = self.dispatcher.bus();

        self.set_state(ConnectionState::Connected);
        info!("Connected to relay at {}", self.connector.describe());
        bus.notify(&PanelEvent::ConnectionUpdate { connected: true });
        self.dispatcher
            .ensure_default_partition(self.settings.default_partition);

        let reason = loop {
            let next = read_message(&mut reader, &self.key, &self.settings.frame);
            match until_shutdown(shutdown, next).await {
                Ok(Ok(payload)) => {
                    self.dispatcher.dispatch(&payload);
                }
                Ok(Err(e)) => break e,
                Err(e) => break e,
            }
        };

        self.sender.detach();
        bus.notify(&PanelEvent::ConnectionUpdate { connected: false });

        // Best-effort close; a pending command write may still hold the lock
        let close = async { writer.lock().await.shutdown().await };
        match timeout(CLOSE_TIMEOUT, close).await {
            Ok(Ok(())) => debug!("Relay socket closed"),
            Ok(Err(e)) => debug!("Error closing relay socket: {}", e),
            Err(_) => debug!("Timed out closing relay socket"),
        }
        reason
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.status.send_replace(state);
        if previous != state {
            debug!("Connection state {} -> {}", previous, state);
        }
    }
}

/// Race `fut` against the shutdown signal.
///
/// A dropped shutdown sender counts as a stop request.
async fn until_shutdown<F: Future>(shutdown: &mut watch::Receiver<bool>, fut: F) -> Result<F::Output> {
    if *shutdown.borrow() {
        return Err(RelayError::Cancelled);
    }
    tokio::select! {
        out = fut => Ok(out),
        _ = stop_requested(shutdown) => Err(RelayError::Cancelled),
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{IDLE_READ_TIMEOUT, KEY_SIZE};
    use crate::event::{EventBus, EventStream, Topic};
    use crate::protocol::Command;
    use crate::state::PanelState;
    use crate::transport::frame::write_message;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    enum Step {
        Refuse,
        Hang,
        Accept(DuplexStream),
    }

    /// Plays back a fixed list of connect outcomes, refusing once exhausted.
    struct ScriptedConnector {
        steps: Mutex<VecDeque<Step>>,
        attempts: Arc<AtomicUsize>,
    }

    impl Connector for ScriptedConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> io::Result<DuplexStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
            match step {
                Step::Refuse => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                Step::Hang => std::future::pending().await,
                Step::Accept(stream) => Ok(stream),
            }
        }

        fn describe(&self) -> String {
            "scripted-relay".to_string()
        }
    }

    fn key() -> RelayKey {
        RelayKey::from_bytes([0x42; KEY_SIZE])
    }

    struct Harness {
        state: Arc<PanelState>,
        bus: EventBus,
        sender: CommandSender,
        status: watch::Receiver<ConnectionState>,
        attempts: Arc<AtomicUsize>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    }

    impl Harness {
        fn start(steps: Vec<Step>) -> Self {
            let state = Arc::new(PanelState::new());
            let bus = EventBus::new();
            let key = Arc::new(key());
            let sender = CommandSender::new(Arc::clone(&key));
            let (status_tx, status) = watch::channel(ConnectionState::Disconnected);
            let attempts = Arc::new(AtomicUsize::new(0));
            let connector = ScriptedConnector {
                steps: Mutex::new(steps.into()),
                attempts: Arc::clone(&attempts),
            };
            let comm = RelayComm::new(
                connector,
                key,
                Dispatcher::new(Arc::clone(&state), bus.clone()),
                sender.clone(),
                Arc::new(status_tx),
                CommSettings::default(),
            );
            let (shutdown, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(comm.run(shutdown_rx));
            Self {
                state,
                bus,
                sender,
                status,
                attempts,
                shutdown,
                handle,
            }
        }

        fn connection_events(&self) -> EventStream {
            self.bus.stream(&[Topic::ConnectionUpdate])
        }

        async fn stop(self) -> ConnectionState {
            self.shutdown.send_replace(true);
            self.handle.await.unwrap();
            *self.status.borrow()
        }
    }

    async fn send(relay: &mut DuplexStream, json: &str) {
        write_message(relay, &key(), json.as_bytes()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_three_failures() {
        let (client, _relay) = tokio::io::duplex(4096);
        let start = Instant::now();
        let harness = Harness::start(vec![Step::Refuse, Step::Refuse, Step::Refuse, Step::Accept(client)]);
        let mut events = harness.connection_events();

        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: true })
        );
        assert_eq!(start.elapsed(), RECONNECT_DELAY * 3);
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(*harness.status.borrow(), ConnectionState::Connected);
        assert!(harness.sender.is_connected());
        // Exactly one connectivity change so far
        assert_eq!(events.try_recv(), None);

        // Default partition is ready for consumers
        let part = harness.state.partition(DEFAULT_PARTITION).unwrap();
        assert!(!part.ready);

        assert_eq!(harness.stop().await, ConnectionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_then_retry() {
        let (client, _relay) = tokio::io::duplex(4096);
        let start = Instant::now();
        let harness = Harness::start(vec![Step::Hang, Step::Accept(client)]);
        let mut events = harness.connection_events();

        events.recv().await;
        assert_eq!(start.elapsed(), CONNECT_TIMEOUT + RECONNECT_DELAY);
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 2);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_messages_reach_state_in_order() {
        let (client, mut relay) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(client)]);
        let mut zones = harness.bus.stream(&[Topic::NewZone, Topic::ZoneUpdate]);

        send(&mut relay, r#"{"type":"zone_status","zone":2,"open":true}"#).await;
        send(&mut relay, r#"{"type":"heartbeat"}"#).await;
        send(&mut relay, r#"{"type":"zone_status","zone":2,"open":false}"#).await;

        assert_eq!(zones.recv().await, Some(PanelEvent::NewZone { zone_id: 2 }));
        assert_eq!(zones.recv().await, Some(PanelEvent::ZoneUpdate { zone_id: 2 }));
        assert!(!harness.state.zone(2).unwrap().open);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_session() {
        let (client, mut relay) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(client)]);
        let mut events = harness.bus.stream(&[Topic::NewZone, Topic::ConnectionUpdate]);
        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: true })
        );

        send(&mut relay, r#"{"type":"zone_status"}"#).await;
        send(&mut relay, "not json at all").await;
        send(&mut relay, r#"{"type":"zone_status","zone":5,"open":true}"#).await;

        assert_eq!(events.recv().await, Some(PanelEvent::NewZone { zone_id: 5 }));
        assert_eq!(harness.state.zone_count(), 1);
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 1);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_close_triggers_reconnect() {
        let (first, relay_a) = tokio::io::duplex(4096);
        let (second, _relay_b) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(first), Step::Accept(second)]);
        let mut events = harness.connection_events();

        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: true })
        );
        drop(relay_a);

        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: false })
        );
        assert!(!harness.sender.is_connected());
        assert!(!harness.sender.send_command(&Command::disarm(1, "1234")).await);

        let down = Instant::now();
        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: true })
        );
        assert_eq!(down.elapsed(), RECONNECT_DELAY);
        // Default partition is only announced once
        assert_eq!(harness.state.partition_count(), 1);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_reconnects() {
        let (first, mut relay_a) = tokio::io::duplex(4096);
        let (second, _relay_b) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(first), Step::Accept(second)]);
        let mut events = harness.connection_events();
        events.recv().await;

        let wrong = RelayKey::from_bytes([0x01; KEY_SIZE]);
        write_message(&mut relay_a, &wrong, br#"{"type":"heartbeat"}"#)
            .await
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: false })
        );
        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: true })
        );
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 2);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_relay_times_out() {
        let (client, _relay) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(client)]);
        let mut events = harness.connection_events();
        events.recv().await;

        let up = Instant::now();
        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: false })
        );
        assert_eq!(up.elapsed(), IDLE_READ_TIMEOUT);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_backoff() {
        let harness = Harness::start(vec![]);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(*harness.status.borrow(), ConnectionState::Disconnected);
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 1);

        let start = Instant::now();
        assert_eq!(harness.stop().await, ConnectionState::Stopped);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_connect() {
        let harness = Harness::start(vec![Step::Hang]);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(*harness.status.borrow(), ConnectionState::Connecting);

        let start = Instant::now();
        assert_eq!(harness.stop().await, ConnectionState::Stopped);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_while_connected_tears_down() {
        let (client, mut relay) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(client)]);
        let mut events = harness.connection_events();
        events.recv().await;

        let sender = harness.sender.clone();
        let attempts = Arc::clone(&harness.attempts);
        assert_eq!(harness.stop().await, ConnectionState::Stopped);

        assert_eq!(
            events.recv().await,
            Some(PanelEvent::ConnectionUpdate { connected: false })
        );
        assert!(!sender.is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // Relay sees the socket closed
        let mut buf = [0u8; 1];
        assert_eq!(relay.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commands_flow_over_live_session() {
        let (client, mut relay) = tokio::io::duplex(4096);
        let harness = Harness::start(vec![Step::Accept(client)]);
        let mut events = harness.connection_events();
        events.recv().await;

        assert!(harness.sender.send_command(&Command::disarm(1, "2468")).await);
        let plain = read_message(&mut relay, &key(), &FrameTimeouts::default())
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(json["type"], "disarm");
        assert_eq!(json["code"], "2468");
        harness.stop().await;
    }
}
