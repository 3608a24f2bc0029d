#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use dog_gridfs::{
    ChunkBackend, FileId, GridConfig, GridError, GridResult, GridStore, LogicalName,
    MemoryBackend, NameGenerator, Namespace, Payload, SqliteBackend, StoredFile,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(chunk_size: u32) -> GridConfig {
    GridConfig::default().with_chunk_size(chunk_size)
}

pub fn memory_store(chunk_size: u32) -> (GridStore, MemoryBackend) {
    let backend = MemoryBackend::new();
    let store = GridStore::with_backend(backend.clone(), config(chunk_size)).expect("valid test config");
    (store, backend)
}

pub async fn sqlite_store(chunk_size: u32) -> (GridStore, SqliteBackend) {
    let config = config(chunk_size);
    let backend = SqliteBackend::connect(&config)
        .await
        .expect("in-memory sqlite should open");
    let store = GridStore::with_backend(backend.clone(), config).expect("valid test config");
    (store, backend)
}

pub fn name(raw: &str) -> LogicalName {
    LogicalName::new(raw).expect("valid test name")
}

/// Collect chunks until the end of the stream or the first error
pub async fn read_all<S>(mut stream: S) -> GridResult<Vec<Bytes>>
where
    S: futures::Stream<Item = GridResult<Bytes>> + Unpin,
{
    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item?);
    }
    Ok(chunks)
}

pub fn concat(chunks: &[Bytes]) -> Vec<u8> {
    chunks.iter().flat_map(|c| c.iter().copied()).collect()
}

pub fn streamed(parts: &[&'static [u8]]) -> Payload {
    let items: Vec<Result<Bytes, io::Error>> =
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
    Payload::stream(futures::stream::iter(items))
}

/// Payload that yields `parts` and then breaks like a dropped connection
pub fn streamed_then_broken(parts: &[&'static [u8]]) -> Payload {
    let mut items: Vec<Result<Bytes, io::Error>> =
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
    items.push(Err(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "client went away",
    )));
    Payload::stream(futures::stream::iter(items))
}

/// Always hands out the same name
pub struct FixedName(pub &'static str);

impl NameGenerator for FixedName {
    fn generate(&self, _original_filename: &str) -> LogicalName {
        name(self.0)
    }
}

fn injected(what: &str) -> GridError {
    GridError::backend(io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what)))
}

/// Memory backend with failure injection and call counting
#[derive(Clone, Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    fail_put_after: Option<u32>,
    fail_get_at: Option<u32>,
    fail_commit: bool,
    hang_after_put: bool,
    puts: Arc<AtomicU32>,
    gets: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `ok` chunk writes through, fail every later one
    pub fn fail_put_after(mut self, ok: u32) -> Self {
        self.fail_put_after = Some(ok);
        self
    }

    /// Fail reads of chunk `n`
    pub fn fail_get_at(mut self, n: u32) -> Self {
        self.fail_get_at = Some(n);
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Store each chunk, then never return from `put_chunk`
    pub fn hang_after_put(mut self) -> Self {
        self.hang_after_put = true;
        self
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkBackend for FlakyBackend {
    async fn put_chunk(&self, file_id: &FileId, n: u32, data: Bytes) -> GridResult<()> {
        let attempt = self.puts.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fail_put_after, Some(ok) if attempt >= ok) {
            return Err(injected("put"));
        }
        self.inner.put_chunk(file_id, n, data).await?;
        if self.hang_after_put {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, n: u32) -> GridResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_at == Some(n) {
            return Err(injected("get"));
        }
        self.inner.get_chunk(file_id, n).await
    }

    async fn discard_chunks(&self, file_id: &FileId) -> GridResult<u64> {
        self.inner.discard_chunks(file_id).await
    }

    async fn commit_file(&self, file: &StoredFile) -> GridResult<()> {
        if self.fail_commit {
            return Err(injected("commit"));
        }
        self.inner.commit_file(file).await
    }

    async fn find_file(
        &self,
        namespace: &Namespace,
        name: &LogicalName,
    ) -> GridResult<Option<StoredFile>> {
        self.inner.find_file(namespace, name).await
    }

    async fn health_check(&self) -> GridResult<()> {
        self.inner.health_check().await
    }
}

pub fn flaky_store(backend: FlakyBackend, chunk_size: u32) -> GridStore {
    GridStore::with_backend(backend, config(chunk_size)).expect("valid test config")
}
