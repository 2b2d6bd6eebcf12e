// MIT License - Copyright (c) 2026 Peter Wright
// Outbound commands over the live relay session

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::constants::BODY_READ_TIMEOUT;
use crate::crypto::RelayKey;
use crate::error::RelayError;
use crate::protocol::Command;
use crate::transport::frame::write_message;

/// Write half of the current session.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub(crate) type SharedWriter = Arc<Mutex<BoxedWriter>>;

/// Sends commands to the relay on whatever session is currently live.
///
/// Cheap to clone. The live write handle doubles as the connected flag: the
/// supervisor installs it when a session comes up and removes it on teardown,
/// so "connected" and "has a writer" can never disagree.
#[derive(Clone)]
pub struct CommandSender {
    key: Arc<RelayKey>,
    link: Arc<RwLock<Option<SharedWriter>>>,
    write_timeout: Duration,
}

impl CommandSender {
    pub fn new(key: Arc<RelayKey>) -> Self {
        Self {
            key,
            link: Arc::new(RwLock::new(None)),
            write_timeout: BODY_READ_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.link.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Install the write half of a new session.
    pub(crate) fn attach(&self, writer: BoxedWriter) -> SharedWriter {
        let shared = Arc::new(Mutex::new(writer));
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&shared));
        shared
    }

    /// Remove the live writer, returning it so the caller can close it.
    pub(crate) fn detach(&self) -> Option<SharedWriter> {
        self.link.write().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn current(&self) -> Option<SharedWriter> {
        self.link.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Encrypt, frame and write `command`.
    ///
    /// Fire-and-forget: failures are logged, never returned, and do not change
    /// the connection state. A broken socket is picked up by the read loop.
    /// Returns whether the frame was written.
    pub async fn send_command(&self, command: &Command) -> bool {
        let Some(writer) = self.current() else {
            warn!("{}, dropping {} command", RelayError::NotConnected, command.kind());
            return false;
        };

        let payload = match command.to_json() {
            Ok(p) => p,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };

        let mut guard = writer.lock().await;
        match timeout(self.write_timeout, write_message(&mut **guard, &self.key, &payload)).await {
            Ok(Ok(())) => {
                debug!("Sent {} for partition {}", command.kind(), command.partition());
                true
            }
            Ok(Err(e)) => {
                error!("Failed to send {} command: {}", command.kind(), e);
                false
            }
            Err(_) => {
                error!(
                    "Failed to send {} command: {}",
                    command.kind(),
                    RelayError::WriteTimeout(self.write_timeout)
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("connected", &self.is_connected())
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
