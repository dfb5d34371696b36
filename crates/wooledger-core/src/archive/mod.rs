//! Archive store for raw message content.
//!
//! Raw messages are stored content-addressed: the key of a blob is derived
//! from the SHA-256 digest of its bytes, which is also the message id.

mod fs;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use fs::FsArchiveStore;
pub use memory::MemoryArchiveStore;

use crate::Result;
use crate::message::MessageId;

/// Read interface of the archive store.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Fetches the raw bytes of a message.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no blob is stored for `id`.
    async fn get_body(&self, id: &MessageId) -> Result<Bytes>;
}
