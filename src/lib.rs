// MIT License - Copyright (c) 2026 Peter Wright
// DSC Neo relay client
//
//! # dsc-neo-relay
//!
//! Client for a DSC PowerSeries Neo TLink relay. Keeps one long-lived TCP
//! session to the relay, decodes its encrypted JSON event stream into zone
//! and partition state, and sends arm/disarm commands back.
//!
//! Frames are `[u32 BE length][nonce || AES-256-GCM ciphertext || tag]` with
//! a key derived from a shared passphrase (PBKDF2-HMAC-SHA256). The session is
//! supervised: on any failure it is torn down and retried every 10 seconds
//! until stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dsc_neo_relay::{RelayConfig, RelayPanel, Topic};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RelayConfig::builder()
//!         .host("192.168.1.20")
//!         .port(3073)
//!         .secret("correct horse battery staple")
//!         .build();
//!
//!     let mut panel = RelayPanel::new(config)?;
//!
//!     let mut events = panel.events(&[Topic::NewZone, Topic::ZoneUpdate]);
//!     panel.start();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.stop().await;
//!     Ok(())
//! }
//! ```

pub mod comm;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod debounce;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod panel;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use comm::ConnectionState;
pub use config::{RelayConfig, RelayConfigBuilder};
pub use crypto::{derive_key, RelayKey};
pub use debounce::{ZoneDebouncer, ZoneSensor};
pub use devices::{ArmingState, Partition, Zone};
pub use error::{RelayError, Result};
pub use event::{EventBus, EventStream, PanelEvent, Subscription, Topic};
pub use panel::RelayPanel;
pub use protocol::{ArmMode, Command, RelayMessage};
pub use state::PanelState;
