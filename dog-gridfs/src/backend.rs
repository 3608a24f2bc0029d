use async_trait::async_trait;
use bytes::Bytes;

use crate::{FileId, GridResult, LogicalName, Namespace, StoredFile};

/// Persistence primitives behind the chunk store - implemented by every backend.
///
/// Chunks are addressed by file id only. A file becomes reachable by name
/// once [`ChunkBackend::commit_file`] has stored its record, so chunks of an
/// unfinished write are never visible to readers.
#[async_trait]
pub trait ChunkBackend: Send + Sync {
    /// Persist chunk `n` of a file being written
    async fn put_chunk(&self, file_id: &FileId, n: u32, data: Bytes) -> GridResult<()>;

    /// Fetch chunk `n` of a file
    async fn get_chunk(&self, file_id: &FileId, n: u32) -> GridResult<Option<Bytes>>;

    /// Remove every chunk of a file, returning how many were removed
    async fn discard_chunks(&self, file_id: &FileId) -> GridResult<u64>;

    /// Atomically publish the file record.
    ///
    /// Must fail with `NameCollision` when the namespace already holds a
    /// file with the same logical name; the existing record is left intact.
    async fn commit_file(&self, file: &StoredFile) -> GridResult<()>;

    /// Look up a committed file by name
    async fn find_file(
        &self,
        namespace: &Namespace,
        name: &LogicalName,
    ) -> GridResult<Option<StoredFile>>;

    /// Check the backend can serve requests
    async fn health_check(&self) -> GridResult<()>;
}
