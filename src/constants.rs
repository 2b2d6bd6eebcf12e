// MIT License - Copyright (c) 2026 Peter Wright
// Relay wire protocol constants

use std::time::Duration;

/// PBKDF2 salt shared with the relay.
pub const PBKDF2_SALT: &[u8] = b"DSC-TLink-Relay-v1";
/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;
/// AES-GCM nonce length (96 bits).
pub const NONCE_SIZE: usize = 12;
/// AES-GCM authentication tag length (128 bits).
pub const TAG_SIZE: usize = 16;

/// Frame header: big-endian u32 length of the encrypted payload.
pub const LENGTH_PREFIX_SIZE: usize = 4;
/// Largest encrypted payload the relay will put on the wire (1 MiB).
pub const MAX_FRAME_LEN: usize = 1_048_576;

/// Idle window for the length prefix. The relay sends a heartbeat every 60s,
/// so five minutes of silence means the session is dead.
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(300);
/// Once a length prefix has arrived the body must follow promptly.
pub const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Fixed delay between reconnect attempts. The relay is a LAN peer, so there
/// is no backoff growth.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);
/// Upper bound on the best-effort socket shutdown during teardown.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Timeout for the setup reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a zone is presented as open after the panel reports it closed.
/// Motion sensors report open/close within about a second.
pub const ZONE_OFF_DELAY: Duration = Duration::from_secs(5);

/// Partition created eagerly on connect so consumers have something to bind to.
pub const DEFAULT_PARTITION: u32 = 1;
/// Relay TCP port used when none is configured.
pub const DEFAULT_RELAY_PORT: u16 = 3073;
