//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use qqbot_core::{Connector, FrameHalves, FrameSink, FrameSource, traits::TransportError};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens gateway sockets with `connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameHalves, TransportError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(%url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = ws.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> Result<String, TransportError> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(e) => tracing::warn!("Ignoring non-UTF-8 binary frame: {e}"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Gateway closed the socket");
                    return Err(TransportError::Closed);
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
        Err(TransportError::Closed)
    }
}
