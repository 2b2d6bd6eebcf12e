// MIT License - Copyright (c) 2026 Peter Wright
// Relay JSON message schema

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::devices::ArmingState;
use crate::error::{RelayError, Result};

/// Messages pushed by the relay.
///
/// Each frame carries one JSON object tagged by `type`:
///
/// ```text
/// {"type":"zone_status","zone":3,"open":true}
/// {"type":"arming","partition":1,"state":"armed_away"}
/// {"type":"partition_ready","partition":1,"ready":false}
/// {"type":"exit_delay","partition":1,"seconds":60}
/// {"type":"entry_delay","partition":1,"seconds":30}
/// {"type":"heartbeat"}
/// ```
///
/// Extra fields are ignored. Ids are unsigned, so a negative id fails to
/// decode and the message is dropped as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    ZoneStatus { zone: u32, open: bool },
    Arming { partition: u32, state: ArmingState },
    PartitionReady { partition: u32, ready: bool },
    ExitDelay { partition: u32, seconds: u32 },
    EntryDelay { partition: u32, seconds: u32 },
    /// Sent every 60s; only keeps the idle timer alive.
    Heartbeat,
}

/// Message types this client understands. Anything else is skipped.
const KNOWN_TYPES: &[&str] = &[
    "zone_status",
    "arming",
    "partition_ready",
    "exit_delay",
    "entry_delay",
    "heartbeat",
];

impl RelayMessage {
    /// Decode an already-parsed JSON object.
    ///
    /// Returns `Ok(None)` for objects without a recognised `type`, and
    /// [`RelayError::MalformedMessage`] when a known type is missing fields
    /// or carries values of the wrong shape.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        if !KNOWN_TYPES.contains(&kind) {
            return Ok(None);
        }
        let kind = kind.to_string();
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RelayError::malformed(format!("{kind}: {e}")))
    }

    /// Wire name of this message's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ZoneStatus { .. } => "zone_status",
            Self::Arming { .. } => "arming",
            Self::PartitionReady { .. } => "partition_ready",
            Self::ExitDelay { .. } => "exit_delay",
            Self::EntryDelay { .. } => "entry_delay",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Arm modes supported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmMode {
    Away,
    /// Perimeter only. Also called "stay" on DSC keypads.
    Home,
    Night,
}

/// Commands sent to the relay.
///
/// Serialises to `{"type":"arm_away","partition":1,"code":"1234"}`. The
/// access code is passed through to the panel as-is; it is never logged.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    ArmAway { partition: u32, code: String },
    ArmHome { partition: u32, code: String },
    ArmNight { partition: u32, code: String },
    Disarm { partition: u32, code: String },
}

impl Command {
    pub fn arm(partition: u32, mode: ArmMode, code: impl Into<String>) -> Self {
        let code = code.into();
        match mode {
            ArmMode::Away => Self::ArmAway { partition, code },
            ArmMode::Home => Self::ArmHome { partition, code },
            ArmMode::Night => Self::ArmNight { partition, code },
        }
    }

    pub fn disarm(partition: u32, code: impl Into<String>) -> Self {
        Self::Disarm {
            partition,
            code: code.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArmAway { .. } => "arm_away",
            Self::ArmHome { .. } => "arm_home",
            Self::ArmNight { .. } => "arm_night",
            Self::Disarm { .. } => "disarm",
        }
    }

    pub fn partition(&self) -> u32 {
        match self {
            Self::ArmAway { partition, .. }
            | Self::ArmHome { partition, .. }
            | Self::ArmNight { partition, .. }
            | Self::Disarm { partition, .. } => *partition,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RelayError::malformed(format!("encode {}: {e}", self.kind())))
    }
}

// Keeps the access code out of logs
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("type", &self.kind())
            .field("partition", &self.partition())
            .finish_non_exhaustive()
    }
}
