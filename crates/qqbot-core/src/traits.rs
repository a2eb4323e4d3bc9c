//! Core traits for the gateway transport, event handling and the
//! collaborators handlers talk to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Content, InboundEvent};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Connection closed")]
    Closed,
    #[error("Transport error: {0}")]
    Io(String),
}

/// Write half of a gateway socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;
}

/// Read half of a gateway socket.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next text frame.
    async fn receive(&mut self) -> Result<String, TransportError>;
}

/// An open socket, split so writer and reader can run independently.
pub type FrameHalves = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Opens sockets to the gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<FrameHalves, TransportError>;
}

/// Reply API error.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Image download error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Download failed: {0}")]
    Download(String),
}

/// Generative API error.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The model refused to answer.
    #[error("Blocked by safety filter: {0}")]
    Safety(String),
    /// The API answered with an error or an unreadable body.
    #[error("Response error: {message}")]
    Response { message: String },
    /// The request never got an answer.
    #[error("Network error: {0}")]
    Network(String),
}

/// Handler error.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed event: {0}")]
    Malformed(String),
    #[error("Reply error: {0}")]
    Reply(#[from] ReplyError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Business logic invoked once per dispatch event.
///
/// Implementations must tolerate cancellation at any await point: the
/// dispatcher drops the future when the deadline elapses and then calls
/// [`EventHandler::on_timeout`] instead.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError>;

    /// Produce a fallback outcome after `handle` was cancelled on deadline.
    async fn on_timeout(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }
}

/// A reply to a group message.
///
/// Replies are text unless the caller attaches an image with
/// [`Reply::with_image`]. None of the built-in commands do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Conversation identifier.
    pub group_openid: String,
    /// Message being replied to.
    pub message_id: String,
    /// Text content.
    pub content: String,
    /// Optional image to attach.
    pub image_url: Option<String>,
}

impl Reply {
    /// Text reply.
    #[must_use]
    pub fn text(
        group_openid: impl Into<String>,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            group_openid: group_openid.into(),
            message_id: message_id.into(),
            content: content.into(),
            image_url: None,
        }
    }

    /// Attach an image, uploaded by the reply client before sending.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Delivered.
    Sent,
    /// The platform accepted the request but refused the content.
    Refused,
    /// The platform rejected the request.
    Failed,
}

/// Sends replies keyed by conversation and message identifier.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send one reply.
    async fn send(&self, reply: &Reply) -> Result<SendStatus, ReplyError>;
}

/// Generates text from an ordered list of role-tagged contents.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a response.
    async fn generate(&self, contents: Vec<Content>) -> Result<String, GenerateError>;
}

/// Downloads attachments.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the bytes at `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// A finished conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedConversation {
    /// Conversation identifier.
    pub group_openid: String,
    /// Transcript.
    pub contents: Vec<Content>,
    /// Archive timestamp (Unix epoch seconds).
    pub created_at: i64,
}

/// Trait for conversation transcript storage, keyed by group.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Whether a multi-turn conversation is running.
    async fn is_active(&self, group_openid: &str) -> Result<bool, StorageError>;

    /// Start a multi-turn conversation. Returns false if one is running.
    async fn start(&self, group_openid: &str) -> Result<bool, StorageError>;

    /// Transcript of the running conversation.
    async fn contents(&self, group_openid: &str) -> Result<Option<Vec<Content>>, StorageError>;

    /// Append turns to the running conversation. Returns false if none is running.
    async fn append(&self, group_openid: &str, turns: Vec<Content>) -> Result<bool, StorageError>;

    /// End the running conversation, archiving and returning its transcript.
    async fn end(&self, group_openid: &str) -> Result<Option<Vec<Content>>, StorageError>;

    /// Archive a one-shot exchange.
    async fn archive(&self, group_openid: &str, contents: Vec<Content>) -> Result<(), StorageError>;

    /// Archived conversations for a group, newest first.
    async fn archived(&self, group_openid: &str) -> Result<Vec<ArchivedConversation>, StorageError>;
}
