//! In-memory archive store.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::ArchiveStore;
use crate::message::MessageId;
use crate::{Error, Result};

/// Archive store holding blobs in memory, for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    blobs: RwLock<HashMap<MessageId, Bytes>>,
}

impl MemoryArchiveStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw message and returns its id.
    pub async fn put(&self, raw: impl Into<Bytes>) -> MessageId {
        let raw = raw.into();
        let id = MessageId::from_content(&raw);
        self.blobs.write().await.insert(id.clone(), raw);
        id
    }

    /// Removes a blob, simulating loss in the backing store.
    pub async fn evict(&self, id: &MessageId) -> bool {
        self.blobs.write().await.remove(id).is_some()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn get_body(&self, id: &MessageId) -> Result<Bytes> {
        self.blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("archived body {id}")))
    }
}
