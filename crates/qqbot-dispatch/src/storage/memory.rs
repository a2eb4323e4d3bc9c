//! In-memory conversation storage.

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use qqbot_core::{
    Content,
    traits::{ArchivedConversation, ConversationStore, StorageError},
};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryConversationStore {
    active: RwLock<HashMap<String, Vec<Content>>>,
    archive: RwLock<Vec<ArchivedConversation>>,
}

impl MemoryConversationStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn active_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Content>>>, StorageError> {
        self.active
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    fn active_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Content>>>, StorageError> {
        self.active
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    fn push_archive(&self, group_openid: &str, contents: Vec<Content>) -> Result<(), StorageError> {
        self.archive
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .push(ArchivedConversation {
                group_openid: group_openid.to_string(),
                contents,
                created_at: Utc::now().timestamp(),
            });
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn is_active(&self, group_openid: &str) -> Result<bool, StorageError> {
        Ok(self.active_read()?.contains_key(group_openid))
    }

    async fn start(&self, group_openid: &str) -> Result<bool, StorageError> {
        let mut active = self.active_write()?;
        if active.contains_key(group_openid) {
            return Ok(false);
        }
        active.insert(group_openid.to_string(), Vec::new());
        Ok(true)
    }

    async fn contents(&self, group_openid: &str) -> Result<Option<Vec<Content>>, StorageError> {
        Ok(self.active_read()?.get(group_openid).cloned())
    }

    async fn append(&self, group_openid: &str, turns: Vec<Content>) -> Result<bool, StorageError> {
        let mut active = self.active_write()?;
        let Some(transcript) = active.get_mut(group_openid) else {
            return Ok(false);
        };
        transcript.extend(turns);
        Ok(true)
    }

    async fn end(&self, group_openid: &str) -> Result<Option<Vec<Content>>, StorageError> {
        let Some(contents) = self.active_write()?.remove(group_openid) else {
            return Ok(None);
        };
        self.push_archive(group_openid, contents.clone())?;
        Ok(Some(contents))
    }

    async fn archive(&self, group_openid: &str, contents: Vec<Content>) -> Result<(), StorageError> {
        self.push_archive(group_openid, contents)
    }

    async fn archived(&self, group_openid: &str) -> Result<Vec<ArchivedConversation>, StorageError> {
        let archive = self
            .archive
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        // Insertion order is chronological; newest first.
        Ok(archive
            .iter()
            .rev()
            .filter(|c| c.group_openid == group_openid)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use qqbot_core::Part;

    use super::*;

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let store = MemoryConversationStore::new();

        assert!(!store.is_active("g").await.unwrap());
        assert!(!store.append("g", vec![Content::model("hi")]).await.unwrap());

        assert!(store.start("g").await.unwrap());
        assert!(!store.start("g").await.unwrap());
        assert!(store.is_active("g").await.unwrap());
        assert_eq!(store.contents("g").await.unwrap(), Some(Vec::new()));

        let turns = vec![
            Content::user(vec![Part::text("what is 1+1")]),
            Content::model("2"),
        ];
        assert!(store.append("g", turns.clone()).await.unwrap());
        assert_eq!(store.contents("g").await.unwrap(), Some(turns.clone()));
        assert_eq!(store.contents("other").await.unwrap(), None);

        assert_eq!(store.end("g").await.unwrap(), Some(turns.clone()));
        assert!(!store.is_active("g").await.unwrap());
        assert_eq!(store.end("g").await.unwrap(), None);

        let archived = store.archived("g").await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].contents, turns);
        assert!(archived[0].created_at > 0);
    }

    #[tokio::test]
    async fn test_archive_newest_first_per_group() {
        let store = MemoryConversationStore::new();
        store
            .archive("g", vec![Content::model("first")])
            .await
            .unwrap();
        store
            .archive("h", vec![Content::model("elsewhere")])
            .await
            .unwrap();
        store
            .archive("g", vec![Content::model("second")])
            .await
            .unwrap();

        let archived = store.archived("g").await.unwrap();
        let texts: Vec<_> = archived.iter().map(|c| c.contents[0].clone()).collect();
        assert_eq!(texts, vec![Content::model("second"), Content::model("first")]);
    }
}
