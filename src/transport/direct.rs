// MIT License - Copyright (c) 2026 Peter Wright
// Direct TCP connection to the relay

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens the byte stream the supervisor runs a session over.
///
/// [`TcpConnector`] is the production implementation; tests substitute
/// in-memory streams.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream. The caller applies the connect timeout.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human-readable peer address for logs.
    fn describe(&self) -> String;
}

/// Plain TCP to the relay. Confidentiality comes from the frame cipher, not TLS.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        // Commands are tiny and latency-sensitive
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        debug!("TCP socket connected to {}", self.describe());
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = TcpConnector::new("127.0.0.1", port);
        let (client, accepted) = tokio::join!(connector.connect(), listener.accept());
        assert!(client.is_ok());
        assert!(accepted.is_ok());
        assert_eq!(connector.describe(), format!("127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = TcpConnector::new("127.0.0.1", port).connect().await;
        assert!(result.is_err());
    }
}
