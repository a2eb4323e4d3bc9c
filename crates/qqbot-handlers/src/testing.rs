//! Recording fakes for the collaborator traits.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use qqbot_core::{
    Content, ContentGenerator, ImageFetcher, Reply, ReplySender, SendStatus,
    traits::{FetchError, GenerateError, ReplyError},
};
use tokio::sync::Mutex;

/// Records replies; answers with scripted statuses, then `Sent`.
#[derive(Default)]
pub struct RecordingReplies {
    sent: Mutex<Vec<Reply>>,
    statuses: Mutex<VecDeque<SendStatus>>,
}

impl RecordingReplies {
    pub fn with_statuses(statuses: impl IntoIterator<Item = SendStatus>) -> Self {
        Self {
            sent: Mutex::default(),
            statuses: Mutex::new(statuses.into_iter().collect()),
        }
    }

    pub async fn sent(&self) -> Vec<Reply> {
        self.sent.lock().await.clone()
    }

    pub async fn contents(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|r| r.content.clone()).collect()
    }
}

#[async_trait]
impl ReplySender for RecordingReplies {
    async fn send(&self, reply: &Reply) -> Result<SendStatus, ReplyError> {
        self.sent.lock().await.push(reply.clone());
        Ok(self.statuses.lock().await.pop_front().unwrap_or(SendStatus::Sent))
    }
}

/// Answers with scripted results, then echoes the request size.
#[derive(Default)]
pub struct ScriptedGenerator {
    results: Mutex<VecDeque<Result<String, GenerateError>>>,
    requests: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedGenerator {
    pub fn with_results(results: impl IntoIterator<Item = Result<String, GenerateError>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub async fn requests(&self) -> Vec<Vec<Content>> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, contents: Vec<Content>) -> Result<String, GenerateError> {
        let size = contents.len();
        self.requests.lock().await.push(contents);
        self.results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("answer to {size}")))
    }
}

/// Serves fixed bytes per URL.
#[derive(Default)]
pub struct StaticImages {
    images: HashMap<String, Bytes>,
}

impl StaticImages {
    pub fn with(mut self, url: &str, bytes: &'static [u8]) -> Self {
        self.images.insert(url.to_string(), Bytes::from_static(bytes));
        self
    }
}

#[async_trait]
impl ImageFetcher for StaticImages {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Download(format!("404 for {url}")))
    }
}
