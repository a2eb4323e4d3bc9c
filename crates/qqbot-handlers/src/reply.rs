//! Group message reply API.

use async_trait::async_trait;
use qqbot_core::{Credentials, Reply, ReplySender, SendStatus, traits::ReplyError};
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Follow-up sent when the platform refuses a reply's content.
pub const REFUSED_NOTICE: &str = "腾讯不让我发这条消息, 我们换个话题吧。";

/// Follow-up sent when the platform rejects a reply request.
pub const FAILED_NOTICE: &str = "不利于团结的话不要讲！";

const URL_NOT_ALLOWED: &str = "url not allowed:";

/// Send `reply`, following up with a notice when it was not delivered.
///
/// Returns the status of the original reply.
///
/// # Errors
/// Returns error if a request could not be made at all.
pub async fn send_reply(sender: &dyn ReplySender, reply: &Reply) -> Result<SendStatus, ReplyError> {
    let status = sender.send(reply).await?;
    let notice = match status {
        SendStatus::Sent => return Ok(status),
        SendStatus::Refused => REFUSED_NOTICE,
        SendStatus::Failed => FAILED_NOTICE,
    };

    warn!(
        group_openid = %reply.group_openid,
        message_id = %reply.message_id,
        ?status,
        "Reply not delivered, sending notice"
    );
    let follow_up = Reply::text(&reply.group_openid, &reply.message_id, notice);
    let follow_up_status = sender.send(&follow_up).await?;
    if follow_up_status != SendStatus::Sent {
        warn!(status = ?follow_up_status, "Notice not delivered either");
    }
    Ok(status)
}

/// What the messages endpoint said.
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Sent,
    Failed,
    Refused(String),
}

impl Delivery {
    const fn status(&self) -> SendStatus {
        match self {
            Self::Sent => SendStatus::Sent,
            Self::Failed => SendStatus::Failed,
            Self::Refused(_) => SendStatus::Refused,
        }
    }
}

/// Client for the bot OpenAPI.
pub struct OpenApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl OpenApiClient {
    /// Create a client for `base_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ReplyError> {
        debug!(%path, %body, "OpenAPI request");
        self.http
            .post(format!("{}{path}", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.credentials.authorization())
            .json(body)
            .send()
            .await
            .map_err(|e| ReplyError::Network(e.to_string()))
    }

    /// Upload an image by URL, returning its `file_info`.
    async fn upload(&self, group_openid: &str, url: &str) -> Result<Option<Value>, ReplyError> {
        let resp = self
            .post(
                &format!("/v2/groups/{group_openid}/files"),
                &json!({"file_type": 1, "url": url, "srv_send_msg": false}),
            )
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();

        match body.get("file_info") {
            Some(file_info) if !file_info.is_null() => Ok(Some(file_info.clone())),
            _ => {
                warn!(%status, %body, "Failed to upload image");
                Ok(None)
            }
        }
    }

    async fn message_body(&self, reply: &Reply, content: &str) -> Result<Value, ReplyError> {
        let Some(image_url) = &reply.image_url else {
            return Ok(json!({"msg_type": 0, "content": content, "msg_id": reply.message_id}));
        };

        Ok(match self.upload(&reply.group_openid, image_url).await? {
            Some(file_info) => json!({
                "msg_type": 7,
                "content": content,
                "msg_id": reply.message_id,
                "media": {"file_info": file_info},
            }),
            None => json!({
                "msg_type": 0,
                "content": format!("图片上传失败, 请访问 {} 查看图片", image_url.replace('.', "%2E")),
                "msg_id": reply.message_id,
            }),
        })
    }

    async fn deliver(&self, reply: &Reply, content: &str) -> Result<Delivery, ReplyError> {
        let body = self.message_body(reply, content).await?;
        let resp = self
            .post(&format!("/v2/groups/{}/messages", reply.group_openid), &body)
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "Failed to send message");
            return Ok(Delivery::Failed);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ReplyError::InvalidResponse(e.to_string()))?;
        debug!(%body, "Sent message response");

        Ok(match body.get("msg").and_then(Value::as_str) {
            None | Some("success") => Delivery::Sent,
            Some(msg) => Delivery::Refused(msg.to_string()),
        })
    }
}

/// Break each rejected URL's dots so the platform no longer sees a link.
fn space_urls(content: &str, urls: &str) -> String {
    urls.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .fold(content.to_string(), |content, url| {
            content.replace(url, &url.replace('.', " ."))
        })
}

#[async_trait]
impl ReplySender for OpenApiClient {
    async fn send(&self, reply: &Reply) -> Result<SendStatus, ReplyError> {
        let delivery = self.deliver(reply, &reply.content).await?;
        let Delivery::Refused(msg) = &delivery else {
            return Ok(delivery.status());
        };

        let Some(urls) = msg.strip_prefix(URL_NOT_ALLOWED) else {
            warn!(%msg, "Message refused");
            return Ok(SendStatus::Refused);
        };

        warn!(%urls, "Url not allowed, retrying with spaced urls");
        let content = space_urls(&reply.content, urls);
        Ok(self.deliver(reply, &content).await?.status())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;
    use crate::testing::RecordingReplies;

    fn client(server: &MockServer) -> OpenApiClient {
        OpenApiClient::new(reqwest::Client::new(), server.uri(), Credentials::new("1", "t"))
    }

    fn text(content: &str) -> Value {
        json!({"msg_type": 0, "content": content, "msg_id": "m1"})
    }

    async fn mount_message(server: &MockServer, body: Value, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v2/groups/g1/messages"))
            .and(body_json(body))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_text_reply_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/groups/g1/messages"))
            .and(header("authorization", "Bot 1.t"))
            .and(body_json(text("hello")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1"})))
            .expect(1)
            .mount(&server)
            .await;

        let status = client(&server)
            .send(&Reply::text("g1", "m1", "hello"))
            .await
            .unwrap();
        assert_eq!(status, SendStatus::Sent);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        mount_message(
            &server,
            text("ok"),
            ResponseTemplate::new(200).set_body_json(json!({"msg": "success"})),
        )
        .await;
        mount_message(
            &server,
            text("rude"),
            ResponseTemplate::new(200).set_body_json(json!({"msg": "消息被去重"})),
        )
        .await;
        mount_message(&server, text("boom"), ResponseTemplate::new(500)).await;

        let client = client(&server);
        for (content, expected) in [
            ("ok", SendStatus::Sent),
            ("rude", SendStatus::Refused),
            ("boom", SendStatus::Failed),
        ] {
            let status = client.send(&Reply::text("g1", "m1", content)).await.unwrap();
            assert_eq!(status, expected, "{content}");
        }
    }

    #[tokio::test]
    async fn test_url_not_allowed_retries_once_with_spaced_urls() {
        let server = MockServer::start().await;
        mount_message(
            &server,
            text("see example.com or a.b.cn"),
            ResponseTemplate::new(200)
                .set_body_json(json!({"msg": "url not allowed:example.com,a.b.cn"})),
        )
        .await;
        mount_message(
            &server,
            text("see example .com or a .b .cn"),
            ResponseTemplate::new(200).set_body_json(json!({"msg": "url not allowed:b .cn"})),
        )
        .await;

        let status = client(&server)
            .send(&Reply::text("g1", "m1", "see example.com or a.b.cn"))
            .await
            .unwrap();
        assert_eq!(status, SendStatus::Refused);
    }

    #[tokio::test]
    async fn test_image_reply_uploads_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/groups/g1/files"))
            .and(body_json(
                json!({"file_type": 1, "url": "https://img.example/a.png", "srv_send_msg": false}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_info": "FI"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_message(
            &server,
            json!({"msg_type": 7, "content": "look", "msg_id": "m1", "media": {"file_info": "FI"}}),
            ResponseTemplate::new(200).set_body_json(json!({})),
        )
        .await;

        let reply = Reply::text("g1", "m1", "look").with_image("https://img.example/a.png");
        assert_eq!(client(&server).send(&reply).await.unwrap(), SendStatus::Sent);
    }

    #[tokio::test]
    async fn test_failed_upload_falls_back_to_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/groups/g1/files"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"code": 40034})))
            .mount(&server)
            .await;
        mount_message(
            &server,
            text("图片上传失败, 请访问 https://img%2Eexample/a%2Epng 查看图片"),
            ResponseTemplate::new(200).set_body_json(json!({})),
        )
        .await;

        let reply = Reply::text("g1", "m1", "look").with_image("https://img.example/a.png");
        assert_eq!(client(&server).send(&reply).await.unwrap(), SendStatus::Sent);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_network_error() {
        let client = OpenApiClient::new(reqwest::Client::new(), "http://127.0.0.1:1", Credentials::new("1", "t"));
        let err = client.send(&Reply::text("g1", "m1", "hi")).await.unwrap_err();
        assert!(matches!(err, ReplyError::Network(_)));
    }

    #[tokio::test]
    async fn test_send_reply_follows_up() {
        let replies = RecordingReplies::with_statuses([SendStatus::Refused, SendStatus::Sent, SendStatus::Failed]);

        let status = send_reply(&replies, &Reply::text("g", "m", "first")).await.unwrap();
        assert_eq!(status, SendStatus::Refused);
        let status = send_reply(&replies, &Reply::text("g", "m", "second")).await.unwrap();
        assert_eq!(status, SendStatus::Failed);
        let status = send_reply(&replies, &Reply::text("g", "m", "third")).await.unwrap();
        assert_eq!(status, SendStatus::Sent);

        assert_eq!(
            replies.contents().await,
            vec!["first", REFUSED_NOTICE, "second", FAILED_NOTICE, "third"]
        );
    }

    #[test]
    fn test_space_urls() {
        assert_eq!(space_urls("go to x.y/z now", "x.y/z"), "go to x .y/z now");
        assert_eq!(space_urls("a.b", ",, "), "a.b");
    }
}
