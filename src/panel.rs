// MIT License - Copyright (c) 2026 Peter Wright
// Relay client coordinator

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::comm::{CommSettings, ConnectionState, RelayComm};
use crate::config::RelayConfig;
use crate::crypto::{derive_key, RelayKey};
use crate::debounce::ZoneSensor;
use crate::devices::{Partition, Zone};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::event::{EventBus, EventStream, PanelEvent, Subscription, Topic};
use crate::protocol::{ArmMode, Command};
use crate::state::PanelState;
use crate::transport::command::CommandSender;
use crate::transport::direct::{Connector, TcpConnector};

/// The main public API for the relay client.
///
/// Owns the state model, the event bus and the supervisor task. Consumers get
/// a reference to the panel (or to the pieces they need) instead of looking
/// it up globally.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use dsc_neo_relay::{ArmMode, RelayConfig, RelayPanel, Topic};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = RelayConfig::builder()
///         .host("192.168.1.20")
///         .secret("correct horse battery staple")
///         .build();
///
///     let mut panel = RelayPanel::new(config)?;
///     let _sub = panel.subscribe(Topic::PartitionUpdate, |event| {
///         println!("Event: {:?}", event);
///     });
///     panel.start();
///
///     if panel.wait_connected(Duration::from_secs(15)).await {
///         panel.arm_partition(1, ArmMode::Away, "1234").await;
///     }
///
///     tokio::signal::ctrl_c().await?;
///     panel.stop().await;
///     Ok(())
/// }
/// ```
pub struct RelayPanel {
    config: RelayConfig,
    key: Arc<RelayKey>,
    state: Arc<PanelState>,
    bus: EventBus,
    sender: CommandSender,
    status_tx: Arc<watch::Sender<ConnectionState>>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl RelayPanel {
    /// Build a panel. Derives the session key, which takes a noticeable
    /// fraction of a second; no connection is made until [`start`](Self::start).
    pub fn new(config: RelayConfig) -> Result<Self> {
        let key = Arc::new(derive_key(&config.secret)?);
        let sender = CommandSender::new(Arc::clone(&key)).with_write_timeout(config.body_timeout());
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            key,
            state: Arc::new(PanelState::new()),
            bus: EventBus::new(),
            sender,
            status_tx: Arc::new(status_tx),
            shutdown_tx,
            supervisor: None,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start the supervisor over TCP to the configured relay.
    pub fn start(&mut self) {
        let connector = TcpConnector::new(self.config.host.clone(), self.config.port);
        self.start_with(connector);
    }

    /// Start the supervisor over a custom [`Connector`].
    ///
    /// Does nothing if a supervisor is already running. Zones and partitions
    /// from an earlier run are kept.
    pub fn start_with<C: Connector>(&mut self, connector: C) {
        if self.supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Relay client already running");
            return;
        }

        self.shutdown_tx.send_replace(false);
        let comm = RelayComm::new(
            connector,
            Arc::clone(&self.key),
            Dispatcher::new(Arc::clone(&self.state), self.bus.clone()),
            self.sender.clone(),
            Arc::clone(&self.status_tx),
            CommSettings::from(&self.config),
        );
        self.supervisor = Some(tokio::spawn(comm.run(self.shutdown_tx.subscribe())));
    }

    /// Stop the supervisor and wait for it to tear the session down.
    pub async fn stop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                warn!("Relay supervisor task ended abnormally: {}", e);
            }
            info!("Disconnected from relay");
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether a session is live and commands can be sent.
    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status_tx.borrow()
    }

    /// Watch supervisor state transitions.
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    /// Wait up to `limit` for a live session. Returns `false` on timeout.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut states = self.status_tx.subscribe();
        let wait = async move {
            loop {
                if *states.borrow_and_update() == ConnectionState::Connected {
                    return true;
                }
                if states.changed().await.is_err() {
                    return false;
                }
            }
        };
        timeout(limit, wait).await.unwrap_or(false)
    }

    // --- Events ---

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register a synchronous handler for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&PanelEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, handler)
    }

    /// Async stream of events for `topics`.
    pub fn events(&self, topics: &[Topic]) -> EventStream {
        self.bus.stream(topics)
    }

    // --- State ---

    pub fn state(&self) -> Arc<PanelState> {
        Arc::clone(&self.state)
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.state.zones()
    }

    pub fn zone(&self, id: u32) -> Option<Zone> {
        self.state.zone(id)
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.state.partitions()
    }

    pub fn partition(&self, id: u32) -> Option<Partition> {
        self.state.partition(id)
    }

    /// Debounced view of one zone, using the configured off-delay.
    pub fn zone_sensor<F>(&self, zone_id: u32, on_change: F) -> ZoneSensor
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        ZoneSensor::attach(
            &self.bus,
            Arc::clone(&self.state),
            zone_id,
            self.config.zone_off_delay(),
            on_change,
        )
    }

    // --- Commands ---

    pub fn command_sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Send a raw command. See [`CommandSender::send_command`].
    pub async fn send_command(&self, command: &Command) -> bool {
        self.sender.send_command(command).await
    }

    /// Arm a partition. The panel rejects an empty access code, so one is
    /// not sent.
    pub async fn arm_partition(&self, id: u32, mode: ArmMode, code: &str) -> bool {
        if code.is_empty() {
            warn!("Access code required to arm partition {}", id);
            return false;
        }
        debug!("Arming partition {} ({:?})", id, mode);
        self.sender.send_command(&Command::arm(id, mode, code)).await
    }

    /// Disarm a partition.
    pub async fn disarm_partition(&self, id: u32, code: &str) -> bool {
        if code.is_empty() {
            warn!("Access code required to disarm partition {}", id);
            return false;
        }
        debug!("Disarming partition {}", id);
        self.sender.send_command(&Command::disarm(id, code)).await
    }
}

impl Drop for RelayPanel {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(h) = self.supervisor.take() {
            h.abort();
        }
    }
}

impl std::fmt::Debug for RelayPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPanel")
            .field("relay", &self.config.address())
            .field("state", &self.connection_state())
            .field("zones", &self.state.zone_count())
            .field("partitions", &self.state.partition_count())
            .finish()
    }
}
