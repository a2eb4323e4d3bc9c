//! Built-in slash commands.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use qqbot_core::{ReplySender, Secret, traits::HandlerError};

use crate::{
    chat::ChatCommand,
    command::{Command, CommandRouter, CommandRouterError},
    message::{GroupMessage, Services},
    reply::send_reply,
};

async fn respond(
    replies: &dyn ReplySender,
    message: &GroupMessage,
    content: impl Into<String>,
) -> Result<(), HandlerError> {
    send_reply(replies, &message.reply(content)).await?;
    Ok(())
}

/// `/echo <text>`
pub struct Echo {
    services: Services,
}

#[async_trait]
impl Command for Echo {
    async fn run(&self, message: &GroupMessage, argument: &str) -> Result<(), HandlerError> {
        respond(self.services.replies.as_ref(), message, argument).await
    }
}

/// `/status`
pub struct Status {
    services: Services,
}

#[async_trait]
impl Command for Status {
    async fn run(&self, message: &GroupMessage, _argument: &str) -> Result<(), HandlerError> {
        let conversation = if self.services.store.is_active(&message.group_openid).await? {
            "正在进行连续对话。"
        } else {
            "没有在进行连续对话。"
        };
        respond(
            self.services.replies.as_ref(),
            message,
            format!("数据库正常。{conversation}"),
        )
        .await
    }
}

/// `/连续对话`
pub struct StartConversation {
    services: Services,
}

#[async_trait]
impl Command for StartConversation {
    async fn run(&self, message: &GroupMessage, _argument: &str) -> Result<(), HandlerError> {
        let content = if self.services.store.start(&message.group_openid).await? {
            tracing::info!(group_openid = %message.group_openid, "Conversation started");
            "好的，我们来聊些什么呢？"
        } else {
            "正在进行连续对话。"
        };
        respond(self.services.replies.as_ref(), message, content).await
    }
}

/// `/结束对话`
pub struct EndConversation {
    services: Services,
}

#[async_trait]
impl Command for EndConversation {
    async fn run(&self, message: &GroupMessage, _argument: &str) -> Result<(), HandlerError> {
        let content = match self.services.store.end(&message.group_openid).await? {
            Some(transcript) => {
                tracing::info!(
                    group_openid = %message.group_openid,
                    turns = transcript.len(),
                    "Conversation archived"
                );
                "那下次再和派蒙聊天吧。"
            }
            None => "我们没有在聊天啊。",
        };
        respond(self.services.replies.as_ref(), message, content).await
    }
}

/// `/key <secret>`: replace the generative API key. Admin groups only.
pub struct RotateKey {
    services: Services,
    key: Secret,
    admin_groups: HashSet<String>,
}

#[async_trait]
impl Command for RotateKey {
    async fn run(&self, message: &GroupMessage, argument: &str) -> Result<(), HandlerError> {
        let content = if !self.admin_groups.contains(&message.group_openid) {
            tracing::warn!(group_openid = %message.group_openid, "Key rotation refused");
            "只有管理员可以更换密钥。"
        } else if argument.trim().is_empty() {
            "密钥不能为空。"
        } else {
            self.key.rotate(argument.trim());
            tracing::info!(group_openid = %message.group_openid, "Generative API key rotated");
            "密钥已更新。"
        };
        respond(self.services.replies.as_ref(), message, content).await
    }
}

/// Router with every built-in command and the chat fallback.
///
/// # Errors
/// Returns error if the command table cannot be built.
pub fn router(
    services: &Services,
    key: Secret,
    admin_groups: HashSet<String>,
) -> Result<CommandRouter, CommandRouterError> {
    let share = || services.clone();
    CommandRouter::builder(Arc::new(ChatCommand::new(share())))
        .command("echo", Arc::new(Echo { services: share() }))
        .command("status", Arc::new(Status { services: share() }))
        .command("连续对话", Arc::new(StartConversation { services: share() }))
        .command("结束对话", Arc::new(EndConversation { services: share() }))
        .command(
            "key",
            Arc::new(RotateKey {
                services: share(),
                key,
                admin_groups,
            }),
        )
        .build()
}
