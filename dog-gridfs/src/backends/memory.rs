use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    backend::ChunkBackend, FileId, GridError, GridResult, LogicalName, Namespace, StoredFile,
};

type FileIndex = HashMap<(Namespace, LogicalName), StoredFile>;

/// In-memory backend for testing and development.
///
/// Cloning shares the underlying maps, so a test can keep a handle for
/// inspection after giving one to the store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    /// Chunk payloads: file_id -> n -> data
    chunks: Arc<RwLock<HashMap<FileId, BTreeMap<u32, Bytes>>>>,

    /// Committed file records by (namespace, name)
    files: Arc<RwLock<FileIndex>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of chunks held, committed or not
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().values().map(BTreeMap::len).sum()
    }

    /// Sequence numbers stored for a file, ascending
    pub fn chunk_indices(&self, file_id: &FileId) -> Vec<u32> {
        self.chunks
            .read()
            .get(file_id)
            .map(|chunks| chunks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of committed files
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }
}

#[async_trait]
impl ChunkBackend for MemoryBackend {
    async fn put_chunk(&self, file_id: &FileId, n: u32, data: Bytes) -> GridResult<()> {
        let mut chunks = self.chunks.write();
        let file_chunks = chunks.entry(file_id.clone()).or_default();
        if file_chunks.contains_key(&n) {
            return Err(GridError::stream(format!(
                "chunk {} of {} written twice",
                n, file_id
            )));
        }
        file_chunks.insert(n, data);
        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, n: u32) -> GridResult<Option<Bytes>> {
        Ok(self
            .chunks
            .read()
            .get(file_id)
            .and_then(|chunks| chunks.get(&n).cloned()))
    }

    async fn discard_chunks(&self, file_id: &FileId) -> GridResult<u64> {
        let removed = self.chunks.write().remove(file_id);
        Ok(removed.map(|chunks| chunks.len() as u64).unwrap_or(0))
    }

    async fn commit_file(&self, file: &StoredFile) -> GridResult<()> {
        let key = (file.namespace.clone(), file.logical_name.clone());
        let mut files = self.files.write();
        if files.contains_key(&key) {
            return Err(GridError::name_collision(
                file.namespace.as_str(),
                file.logical_name.as_str(),
            ));
        }
        files.insert(key, file.clone());
        Ok(())
    }

    async fn find_file(
        &self,
        namespace: &Namespace,
        name: &LogicalName,
    ) -> GridResult<Option<StoredFile>> {
        Ok(self
            .files
            .read()
            .get(&(namespace.clone(), name.clone()))
            .cloned())
    }

    async fn health_check(&self) -> GridResult<()> {
        Ok(())
    }
}
