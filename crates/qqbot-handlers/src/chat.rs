//! Generative chat fallback for messages that name no command.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use qqbot_core::{
    Content, InlineData, Part, is_supported_mime_type,
    traits::{GenerateError, HandlerError},
};
use tracing::{error, warn};

use crate::{
    command::Command,
    message::{GroupMessage, Services},
    reply::send_reply,
};

/// Reply when the model refuses the topic.
pub const SAFETY_REPLY: &str = "这是不可以谈的话题。";

/// Reply when the model could not be reached.
pub const NETWORK_REPLY: &str = "怎么办？怎么办？派蒙连接不上提瓦特了。";

/// Sends the message to the model and replies with its answer.
///
/// Inside a multi-turn conversation the whole transcript is sent and the
/// exchange is appended to it. Otherwise the message is a one-shot prompt
/// and the exchange is archived.
pub struct ChatCommand {
    services: Services,
}

impl ChatCommand {
    /// Create the fallback.
    #[must_use]
    pub const fn new(services: Services) -> Self {
        Self { services }
    }

    /// Text plus every supported image attachment, base64 encoded.
    async fn parts(&self, message: &GroupMessage, text: &str) -> Vec<Part> {
        let mut parts = vec![Part::text(text)];
        for attachment in &message.attachments {
            if !is_supported_mime_type(&attachment.content_type) {
                continue;
            }
            match self.services.images.fetch(&attachment.url).await {
                Ok(bytes) => parts.push(Part::InlineData {
                    inline_data: InlineData {
                        mime_type: attachment.content_type.clone(),
                        data: STANDARD.encode(&bytes),
                    },
                }),
                Err(e) => warn!(url = %attachment.url, "Skipping attachment: {e}"),
            }
        }
        parts
    }

    /// Persist a successful exchange.
    async fn record(
        &self,
        group_openid: &str,
        mut contents: Vec<Content>,
        parts: Vec<Part>,
        answer: &str,
    ) -> Result<(), HandlerError> {
        let store = &self.services.store;
        let turns = vec![Content::user(parts), Content::model(answer)];
        if !store.append(group_openid, turns).await? {
            contents.push(Content::model(answer));
            store.archive(group_openid, contents).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Command for ChatCommand {
    async fn run(&self, message: &GroupMessage, argument: &str) -> Result<(), HandlerError> {
        let group_openid = message.group_openid.as_str();
        let parts = self.parts(message, argument).await;

        let contents = match self.services.store.contents(group_openid).await? {
            Some(mut history) => {
                history.push(Content::user(parts.clone()));
                history
            }
            None => vec![Content::prompt(parts.clone())],
        };

        let answer = match self.services.generator.generate(contents.clone()).await {
            Ok(answer) => {
                if let Err(e) = self.record(group_openid, contents, parts, &answer).await {
                    error!(%group_openid, "Failed to record exchange: {e}");
                }
                answer
            }
            Err(GenerateError::Safety(feedback)) => {
                warn!(%group_openid, %feedback, "Blocked by safety filter");
                SAFETY_REPLY.to_string()
            }
            Err(GenerateError::Response { message }) => {
                error!(%group_openid, %message, "Generate response error");
                message
            }
            Err(GenerateError::Network(e)) => {
                warn!(%group_openid, "Generate network error: {e}");
                NETWORK_REPLY.to_string()
            }
        };

        send_reply(self.services.replies.as_ref(), &message.reply(answer)).await?;
        Ok(())
    }
}
