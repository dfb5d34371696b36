//! Filesystem archive store.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::ArchiveStore;
use crate::message::{MessageId, object_key};
use crate::{Error, Result};

/// Content-addressed blob tree rooted at a directory.
///
/// Blobs live at `<root>/<first two hex chars>/<digest>.eml`.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    /// Opens (and creates if needed) the store at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &MessageId) -> PathBuf {
        self.root.join(object_key(id))
    }

    /// Stores a raw message and returns its id.
    ///
    /// Storing the same bytes twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    pub async fn put(&self, raw: &[u8]) -> Result<MessageId> {
        let id = MessageId::from_content(raw);
        let path = self.path_for(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so readers never observe a partial blob.
        let partial = path.with_extension("eml.partial");
        tokio::fs::write(&partial, raw).await?;
        tokio::fs::rename(&partial, &path).await?;

        tracing::debug!(id = %id, bytes = raw.len(), "blob archived");
        Ok(id)
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn get_body(&self, id: &MessageId) -> Result<Bytes> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(raw) => Ok(Bytes::from(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("archived body {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::new(dir.path()).await.unwrap();

        let id = store.put(b"Subject: MinIO\r\n\r\nstatus").await.unwrap();
        let body = store.get_body(&id).await.unwrap();

        assert_eq!(&body[..], b"Subject: MinIO\r\n\r\nstatus");
        assert!(dir.path().join(object_key(&id)).exists());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::new(dir.path()).await.unwrap();

        let first = store.put(b"same").await.unwrap();
        let second = store.put(b"same").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::new(dir.path()).await.unwrap();

        let err = store
            .get_body(&MessageId::from_content(b"never stored"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
