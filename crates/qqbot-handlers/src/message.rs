//! Group @-message handler.

use std::sync::Arc;

use async_trait::async_trait;
use qqbot_core::{
    ContentGenerator, ConversationStore, EventHandler, ImageFetcher, InboundEvent, Reply,
    ReplySender, traits::HandlerError,
};
use serde::Deserialize;

use crate::{command::CommandRouter, reply::send_reply};

/// Sent when a handler overruns its deadline.
pub const THINKING_REPLY: &str = "派蒙还在思考，稍后再问问看吧。";

/// A file attached to a group message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    /// MIME type reported by the platform.
    #[serde(default)]
    pub content_type: String,
    /// Download URL.
    pub url: String,
}

/// Payload of a `GROUP_AT_MESSAGE_CREATE` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMessage {
    /// Conversation identifier.
    pub group_openid: String,
    /// Identifier replies refer to.
    #[serde(rename = "id")]
    pub message_id: String,
    /// Text content, with the @-mention already stripped by the platform.
    #[serde(default)]
    pub content: String,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl GroupMessage {
    /// Decode the payload of `event`.
    ///
    /// # Errors
    /// Returns error if the event has no payload or the payload lacks a field.
    pub fn from_event(event: &InboundEvent) -> Result<Self, HandlerError> {
        if !event.has_payload() {
            return Err(HandlerError::Malformed("event has no payload".to_string()));
        }
        serde_json::from_value(event.d.clone()).map_err(|e| HandlerError::Malformed(e.to_string()))
    }

    /// A text reply to this message.
    #[must_use]
    pub fn reply(&self, content: impl Into<String>) -> Reply {
        Reply::text(&self.group_openid, &self.message_id, content)
    }
}

/// Collaborators shared by the commands.
#[derive(Clone)]
pub struct Services {
    /// Reply API.
    pub replies: Arc<dyn ReplySender>,
    /// Conversation transcripts.
    pub store: Arc<dyn ConversationStore>,
    /// Generative model.
    pub generator: Arc<dyn ContentGenerator>,
    /// Attachment downloads.
    pub images: Arc<dyn ImageFetcher>,
}

/// Routes each group message through a [`CommandRouter`].
pub struct GroupMessageHandler {
    router: CommandRouter,
    replies: Arc<dyn ReplySender>,
}

impl GroupMessageHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(router: CommandRouter, replies: Arc<dyn ReplySender>) -> Self {
        Self { router, replies }
    }
}

#[async_trait]
impl EventHandler for GroupMessageHandler {
    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let message = GroupMessage::from_event(event)?;
        tracing::debug!(
            group_openid = %message.group_openid,
            message_id = %message.message_id,
            attachments = message.attachments.len(),
            "Group message"
        );
        self.router.run(&message).await
    }

    async fn on_timeout(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let message = GroupMessage::from_event(event)?;
        send_reply(self.replies.as_ref(), &message.reply(THINKING_REPLY)).await?;
        Ok(())
    }
}
