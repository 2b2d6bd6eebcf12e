// MIT License - Copyright (c) 2026 Peter Wright
// Relay client command line

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use dsc_neo_relay::constants::{DEFAULT_PARTITION, DEFAULT_RELAY_PORT, PROBE_TIMEOUT};
use dsc_neo_relay::transport::probe::probe;
use dsc_neo_relay::{
    ArmMode, EventBus, EventStream, PanelEvent, PanelState, RelayConfig, RelayPanel, Subscription, Topic,
    ZoneSensor,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dsc-neo-relay")]
#[command(about = "Client for a DSC PowerSeries Neo TLink relay")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Stay connected and log zone, partition and connection changes (default)
    Run,
    /// Check that the relay accepts TCP connections
    Probe,
    /// Arm a partition
    Arm {
        #[arg(long, default_value_t = DEFAULT_PARTITION)]
        partition: u32,
        #[arg(long, value_enum, default_value_t = ModeArg::Away)]
        mode: ModeArg,
        /// User access code
        #[arg(long)]
        code: String,
    },
    /// Disarm a partition
    Disarm {
        #[arg(long, default_value_t = DEFAULT_PARTITION)]
        partition: u32,
        /// User access code
        #[arg(long)]
        code: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Away,
    Home,
    Night,
}

impl From<ModeArg> for ArmMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Away => ArmMode::Away,
            ModeArg::Home => ArmMode::Home,
            ModeArg::Night => ArmMode::Night,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    relay: RelayToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u32, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RelayToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    secret: String,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    idle_timeout_ms: Option<u64>,
    #[serde(default)]
    body_timeout_ms: Option<u64>,
    #[serde(default)]
    reconnect_delay_ms: Option<u64>,
    #[serde(default)]
    zone_off_delay_ms: Option<u64>,
    #[serde(default = "default_partition")]
    default_partition: u32,
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}
fn default_partition() -> u32 {
    DEFAULT_PARTITION
}

fn build_relay_config(toml: &RelayToml) -> Result<RelayConfig> {
    if toml.secret.is_empty() {
        anyhow::bail!("relay.secret must not be empty");
    }
    let defaults = RelayConfig::default();
    Ok(RelayConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .secret(&toml.secret)
        .connect_timeout_ms(toml.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms))
        .idle_timeout_ms(toml.idle_timeout_ms.unwrap_or(defaults.idle_timeout_ms))
        .body_timeout_ms(toml.body_timeout_ms.unwrap_or(defaults.body_timeout_ms))
        .reconnect_delay_ms(toml.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms))
        .zone_off_delay_ms(toml.zone_off_delay_ms.unwrap_or(defaults.zone_off_delay_ms))
        .default_partition(toml.default_partition)
        .build())
}

fn load_config(path: &str) -> Result<(RelayConfig, HashMap<u32, String>)> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    let relay = build_relay_config(&config.relay).context("Invalid [relay] section")?;
    Ok((relay, config.zone_names))
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

fn zone_label(zone_names: &HashMap<u32, String>, id: u32) -> String {
    match zone_names.get(&id) {
        Some(name) => format!("Zone {id} ({name})"),
        None => format!("Zone {id}"),
    }
}

/// Debounced sensors for every zone, created the moment a zone is discovered
/// so short motion pulses show up as a steady open period.
///
/// Discovery runs on the bus synchronously: each sensor is seeded from state
/// before the zone's next report can be dispatched.
struct ZoneSensors {
    sensors: Arc<Mutex<HashMap<u32, ZoneSensor>>>,
    _discovery: Subscription,
}

impl ZoneSensors {
    fn attach(
        bus: &EventBus,
        state: Arc<PanelState>,
        off_delay: Duration,
        zone_names: Arc<HashMap<u32, String>>,
    ) -> Self {
        let sensors: Arc<Mutex<HashMap<u32, ZoneSensor>>> = Arc::default();
        let registry = Arc::clone(&sensors);
        let sensor_bus = bus.clone();

        let discovery = bus.subscribe(Topic::NewZone, move |event| {
            let PanelEvent::NewZone { zone_id } = *event else {
                return;
            };
            let names = Arc::clone(&zone_names);
            let sensor = ZoneSensor::attach(&sensor_bus, Arc::clone(&state), zone_id, off_delay, move |id, on| {
                info!("{} {}", zone_label(&names, id), if on { "open" } else { "closed" });
            });
            info!(
                "{} discovered ({})",
                zone_label(&zone_names, zone_id),
                if sensor.is_on() { "open" } else { "closed" }
            );
            lock(&registry).insert(zone_id, sensor);
        });

        Self {
            sensors,
            _discovery: discovery,
        }
    }

    #[cfg(test)]
    fn is_on(&self, zone_id: u32) -> Option<bool> {
        lock(&self.sensors).get(&zone_id).map(ZoneSensor::is_on)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Log partition and connection changes as they arrive.
async fn monitor(mut events: EventStream, state: Arc<PanelState>) {
    while let Some(event) = events.recv().await {
        match event {
            PanelEvent::NewPartition { partition_id } | PanelEvent::PartitionUpdate { partition_id } => {
                if let Some(p) = state.partition(partition_id) {
                    let mut line = format!(
                        "Partition {}: {}, {}",
                        p.id,
                        p.state,
                        if p.ready { "ready" } else { "not ready" }
                    );
                    if let Some(s) = p.exit_delay_seconds {
                        line.push_str(&format!(", exit delay {s}s"));
                    }
                    if let Some(s) = p.entry_delay_seconds {
                        line.push_str(&format!(", entry delay {s}s"));
                    }
                    info!("{}", line);
                }
            }
            PanelEvent::ConnectionUpdate { connected } => {
                if connected {
                    info!("Relay available");
                } else {
                    warn!("Relay unavailable");
                }
            }
            PanelEvent::NewZone { .. } | PanelEvent::ZoneUpdate { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run(cli: &Cli, mut relay_config: RelayConfig, zone_names: HashMap<u32, String>) -> Result<()> {
    let mut zone_names = Arc::new(zone_names);
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        info!("Connecting to relay at {}", relay_config.address());
        let mut panel = RelayPanel::new(relay_config.clone()).context("Failed to set up relay client")?;

        let sensors = ZoneSensors::attach(
            panel.bus(),
            panel.state(),
            relay_config.zone_off_delay(),
            Arc::clone(&zone_names),
        );
        let events = panel.events(&[Topic::NewPartition, Topic::PartitionUpdate, Topic::ConnectionUpdate]);
        let monitor_handle = tokio::spawn(monitor(events, panel.state()));
        panel.start();

        info!("Relay client running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting...");
                true
            }
        };

        panel.stop().await;
        monitor_handle.abort();
        drop(sensors);

        if !restart {
            break;
        }

        // Keep the previous config if the new one is unusable
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok((new_config, new_names)) => {
                relay_config = new_config;
                zone_names = Arc::new(new_names);
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Connect, send one command, disconnect.
async fn one_shot(relay_config: RelayConfig, partition: u32, mode: Option<ArmMode>, code: &str) -> Result<()> {
    let wait = relay_config.connect_timeout() + Duration::from_secs(5);
    let mut panel = RelayPanel::new(relay_config).context("Failed to set up relay client")?;
    panel.start();

    if !panel.wait_connected(wait).await {
        panel.stop().await;
        anyhow::bail!("Relay not reachable within {}s", wait.as_secs());
    }

    let sent = match mode {
        Some(mode) => panel.arm_partition(partition, mode, code).await,
        None => panel.disarm_partition(partition, code).await,
    };
    panel.stop().await;

    if !sent {
        anyhow::bail!("Command was not sent");
    }
    info!("Command sent to partition {}", partition);
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=dsc_neo_relay=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let (relay_config, zone_names) = load_config(&cli.config)?;

    match &cli.command {
        None | Some(Cmd::Run) => run(&cli, relay_config, zone_names).await,
        Some(Cmd::Probe) => {
            probe(&relay_config.host, relay_config.port, PROBE_TIMEOUT)
                .await
                .with_context(|| format!("Relay at {} is not reachable", relay_config.address()))?;
            Ok(())
        }
        Some(Cmd::Arm { partition, mode, code }) => {
            one_shot(relay_config, *partition, Some((*mode).into()), code).await
        }
        Some(Cmd::Disarm { partition, code }) => one_shot(relay_config, *partition, None, code).await,
    }
}
