// MIT License - Copyright (c) 2026 Peter Wright
// Zone record

use serde::Serialize;

/// A single alarm zone (door, window or motion input).
///
/// Created the first time the relay reports it and updated in place after
/// that. Zones are never removed while the client lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: u32,
    /// Raw open/faulted state as last reported by the panel.
    pub open: bool,
}

impl Zone {
    pub fn new(id: u32, open: bool) -> Self {
        Self { id, open }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}
