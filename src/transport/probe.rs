// MIT License - Copyright (c) 2026 Peter Wright
// Relay reachability probe used during setup

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

/// Check that something accepts TCP connections at `host:port`.
///
/// Connects, then closes immediately. No frames are exchanged, so a wrong
/// secret is not detected here.
pub async fn probe(host: &str, port: u16, limit: Duration) -> Result<()> {
    debug!("Probing relay at {}:{}", host, port);
    let mut stream = timeout(limit, TcpStream::connect((host, port)))
        .await
        .map_err(|_| RelayError::ConnectionTimeout)??;

    // Best-effort close
    let _ = stream.shutdown().await;
    info!("Relay at {}:{} is reachable", host, port);
    Ok(())
}
