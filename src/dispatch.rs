// MIT License - Copyright (c) 2026 Peter Wright
// Applies relay messages to the state model

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::devices::{ArmingState, Partition};
use crate::event::{EventBus, PanelEvent};
use crate::protocol::RelayMessage;
use crate::state::PanelState;

/// Turns decrypted payloads into state changes and notifications.
///
/// Every message is handled on its own: nothing here can fail the session.
/// Each state mutation completes before its notification is sent.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: Arc<PanelState>,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(state: Arc<PanelState>, bus: EventBus) -> Self {
        Self { state, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Decode and apply one payload. Returns the notification sent, if any.
    pub fn dispatch(&self, payload: &[u8]) -> Option<PanelEvent> {
        let Ok(text) = std::str::from_utf8(payload) else {
            debug!("Dropping non-UTF-8 payload ({} bytes)", payload.len());
            return None;
        };
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Dropping payload that is not JSON: {}", e);
                return None;
            }
        };

        match RelayMessage::from_value(value) {
            Ok(Some(message)) => self.apply(message),
            Ok(None) => {
                trace!("Ignoring unrecognised message: {}", text);
                None
            }
            Err(e) if e.is_message_level() => {
                warn!("Dropping message: {}", e);
                None
            }
            Err(e) => {
                error!("Cannot decode message: {}", e);
                None
            }
        }
    }

    /// Apply a decoded message.
    pub fn apply(&self, message: RelayMessage) -> Option<PanelEvent> {
        let event = match message {
            RelayMessage::ZoneStatus { zone, open } => {
                trace!("Zone {} {}", zone, if open { "open" } else { "closed" });
                if self.state.upsert_zone(zone, open) {
                    PanelEvent::NewZone { zone_id: zone }
                } else {
                    PanelEvent::ZoneUpdate { zone_id: zone }
                }
            }
            RelayMessage::Arming { partition, state } => {
                debug!("Partition {} arming state {}", partition, state);
                let created = self.state.upsert_partition(
                    partition,
                    || Partition::new(partition, state, true),
                    |p| p.state = state,
                );
                partition_event(partition, created)
            }
            RelayMessage::PartitionReady { partition, ready } => {
                debug!("Partition {} ready={}", partition, ready);
                let created = self.state.upsert_partition(
                    partition,
                    || Partition::new(partition, ArmingState::Disarmed, ready),
                    |p| p.ready = ready,
                );
                partition_event(partition, created)
            }
            RelayMessage::ExitDelay { partition, seconds } => {
                debug!("Partition {} exit delay {}s", partition, seconds);
                self.state.upsert_partition(
                    partition,
                    || Partition::placeholder(partition),
                    |p| {
                        p.state = ArmingState::Arming;
                        p.exit_delay_seconds = Some(seconds);
                    },
                );
                PanelEvent::PartitionUpdate {
                    partition_id: partition,
                }
            }
            RelayMessage::EntryDelay { partition, seconds } => {
                debug!("Partition {} entry delay {}s", partition, seconds);
                self.state.upsert_partition(
                    partition,
                    || Partition::placeholder(partition),
                    |p| {
                        p.state = ArmingState::Pending;
                        p.entry_delay_seconds = Some(seconds);
                    },
                );
                PanelEvent::PartitionUpdate {
                    partition_id: partition,
                }
            }
            RelayMessage::Heartbeat => {
                trace!("Heartbeat");
                return None;
            }
        };

        self.bus.notify(&event);
        Some(event)
    }

    /// Create the default partition if it does not exist yet, notifying
    /// `new_partition` only when it was created.
    pub fn ensure_default_partition(&self, id: u32) -> bool {
        let created = self.state.ensure_partition(id);
        if created {
            debug!("Created default partition {}", id);
            self.bus.notify(&PanelEvent::NewPartition { partition_id: id });
        }
        created
    }
}

fn partition_event(partition_id: u32, created: bool) -> PanelEvent {
    if created {
        PanelEvent::NewPartition { partition_id }
    } else {
        PanelEvent::PartitionUpdate { partition_id }
    }
}
