// MIT License - Copyright (c) 2026 Peter Wright
// Partition record and arming state

use std::fmt;

use serde::{Deserialize, Serialize};

/// Arming state of a partition.
///
/// The relay reports the first four directly; `Arming` and `Pending` are
/// derived from exit and entry delay notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmingState {
    Disarmed,
    ArmedAway,
    ArmedHome,
    ArmedNight,
    /// Exit delay running
    Arming,
    /// Entry delay running, alarm pending
    Pending,
}

impl ArmingState {
    /// The wire string (e.g. `"armed_away"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::ArmedAway => "armed_away",
            Self::ArmedHome => "armed_home",
            Self::ArmedNight => "armed_night",
            Self::Arming => "arming",
            Self::Pending => "pending",
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::ArmedAway | Self::ArmedHome | Self::ArmedNight)
    }
}

impl fmt::Display for ArmingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single independently armable area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub id: u32,
    pub state: ArmingState,
    /// Panel reports all zones closed and the partition can be armed.
    pub ready: bool,
    /// Set by an exit delay notification. The relay never signals the end of
    /// a delay, so this is not cleared automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_delay_seconds: Option<u32>,
    /// Set by an entry delay notification; never cleared automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_delay_seconds: Option<u32>,
}

impl Partition {
    pub fn new(id: u32, state: ArmingState, ready: bool) -> Self {
        Self {
            id,
            state,
            ready,
            exit_delay_seconds: None,
            entry_delay_seconds: None,
        }
    }

    /// Placeholder created on connect before the panel has reported anything.
    pub fn placeholder(id: u32) -> Self {
        Self::new(id, ArmingState::Disarmed, false)
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arming_state_wire_names() {
        for state in [
            ArmingState::Disarmed,
            ArmingState::ArmedAway,
            ArmingState::ArmedHome,
            ArmingState::ArmedNight,
            ArmingState::Arming,
            ArmingState::Pending,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            let parsed: ArmingState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_unknown_arming_state_rejected() {
        // The relay emits unknown_0xNN for codes it cannot map
        assert!(serde_json::from_str::<ArmingState>("\"unknown_0x05\"").is_err());
    }

    #[test]
    fn test_is_armed() {
        assert!(ArmingState::ArmedNight.is_armed());
        assert!(!ArmingState::Arming.is_armed());
        assert!(!ArmingState::Pending.is_armed());
        assert!(!Partition::placeholder(1).is_armed());
    }

    #[test]
    fn test_placeholder_defaults() {
        let part = Partition::placeholder(1);
        assert_eq!(part.state, ArmingState::Disarmed);
        assert!(!part.is_ready());
        assert_eq!(part.exit_delay_seconds, None);
        assert_eq!(part.entry_delay_seconds, None);
    }

    #[test]
    fn test_partition_serialization_omits_inactive_delays() {
        let mut part = Partition::new(2, ArmingState::Arming, true);
        part.exit_delay_seconds = Some(60);
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 2, "state": "arming", "ready": true, "exit_delay_seconds": 60})
        );
    }
}
