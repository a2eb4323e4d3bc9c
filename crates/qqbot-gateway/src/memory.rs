//! In-memory gateway transport.
//!
//! Useful for tests and local simulation. Each [`MemoryConnector::connect`]
//! hands a [`ServerConnection`] to the paired [`MemoryGateway`]; dropping the
//! server side closes the client socket.

use async_trait::async_trait;
use qqbot_core::{Connector, FrameHalves, FrameSink, FrameSource, traits::TransportError};
use serde_json::Value;
use tokio::sync::mpsc;

/// Create a connected connector / gateway pair.
#[must_use]
pub fn channel() -> (MemoryConnector, MemoryGateway) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { accept: accept_tx },
        MemoryGateway { incoming: accept_rx },
    )
}

/// Client side: opens sockets to the paired [`MemoryGateway`].
#[derive(Clone)]
pub struct MemoryConnector {
    accept: mpsc::UnboundedSender<ServerConnection>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<FrameHalves, TransportError> {
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let server = ServerConnection {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.accept
            .send(server)
            .map_err(|_| TransportError::Connect(format!("{url}: gateway is gone")))?;

        Ok((
            Box::new(MemorySink { tx: to_server }),
            Box::new(MemorySource { rx: from_server }),
        ))
    }
}

/// Server side: accepts connections opened by the paired connector.
pub struct MemoryGateway {
    incoming: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MemoryGateway {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.incoming.recv().await
    }
}

/// Server end of one in-memory socket.
#[derive(Debug)]
pub struct ServerConnection {
    url: String,
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerConnection {
    /// URL the client connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a frame for the client. Returns false if the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }

    /// Next frame from the client, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame from the client, decoded as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Next frame with the given opcode, skipping anything else (heartbeats).
    pub async fn recv_op(&mut self, op: u8) -> Option<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame["op"] == op {
                return Some(frame);
            }
        }
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<String, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}
