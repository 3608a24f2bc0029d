use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures_core::Stream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    backend::ChunkBackend, backends::SqliteBackend, ChunkStream, FileId, GridConfig, GridError,
    GridResult, LogicalName, Namespace, StoredFile,
};

/// Connected store shared by every namespace.
///
/// Cheap to clone; all clones talk to the same backend.
#[derive(Clone)]
pub struct GridStore {
    backend: Arc<dyn ChunkBackend>,
    config: Arc<GridConfig>,
}

impl std::fmt::Debug for GridStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridStore").finish_non_exhaustive()
    }
}

impl GridStore {
    /// Validate the config, open the SQLite database and create the schema
    pub async fn connect(config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let backend = SqliteBackend::connect(&config).await?;
        Self::with_backend(backend, config)
    }

    /// Create a store over any backend; the config is validated first
    pub fn with_backend<B: ChunkBackend + 'static>(
        backend: B,
        config: GridConfig,
    ) -> GridResult<Self> {
        config.validate()?;
        Ok(Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
        })
    }

    /// Chunk store for one namespace
    pub fn bucket(&self, namespace: Namespace) -> ChunkStore {
        ChunkStore {
            backend: self.backend.clone(),
            namespace,
            chunk_size: self.config.chunk_size,
        }
    }

    pub fn images(&self) -> ChunkStore {
        self.bucket(Namespace::images())
    }

    pub fn videos(&self) -> ChunkStore {
        self.bucket(Namespace::videos())
    }

    /// Get configuration
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub async fn health_check(&self) -> GridResult<()> {
        self.backend.health_check().await
    }
}

#[derive(Clone)]
enum StoreState {
    Pending,
    Ready(GridStore),
    Failed(String),
}

/// Process-wide handle to a store that may still be initializing.
///
/// [`StoreCell::get`] never waits: before initialization finishes it returns
/// `StoreUnavailable`. [`StoreCell::ready`] waits for the outcome instead.
#[derive(Clone)]
pub struct StoreCell {
    tx: Arc<watch::Sender<StoreState>>,
    rx: watch::Receiver<StoreState>,
}

impl StoreCell {
    /// An empty cell; publish a store with [`StoreCell::set`]
    pub fn pending() -> Self {
        let (tx, rx) = watch::channel(StoreState::Pending);
        Self { tx: Arc::new(tx), rx }
    }

    /// A cell that is ready immediately
    pub fn from_store(store: GridStore) -> Self {
        let cell = Self::pending();
        cell.set(store);
        cell
    }

    /// Start connecting on the current Tokio runtime and return at once
    pub fn connect_in_background(config: GridConfig) -> Self {
        let cell = Self::pending();
        let publisher = cell.clone();
        tokio::spawn(async move {
            match GridStore::connect(config).await {
                Ok(store) => {
                    info!("Grid store initialized");
                    publisher.set(store);
                }
                Err(e) => {
                    error!("Grid store initialization failed: {}", e);
                    publisher.fail(e.to_string());
                }
            }
        });
        cell
    }

    /// Publish a connected store to every clone of this cell
    pub fn set(&self, store: GridStore) {
        self.tx.send_replace(StoreState::Ready(store));
    }

    /// Record that initialization failed for good
    pub fn fail<S: Into<String>>(&self, reason: S) {
        self.tx.send_replace(StoreState::Failed(reason.into()));
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.rx.borrow(), StoreState::Ready(_))
    }

    /// The store, or `StoreUnavailable` if it is not initialized yet
    pub fn get(&self) -> GridResult<GridStore> {
        Self::resolve(&self.rx.borrow())
    }

    /// Wait until initialization finishes, successfully or not
    pub async fn ready(&self) -> GridResult<GridStore> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| !matches!(state, StoreState::Pending))
            .await
            .map_err(|_| GridError::store_unavailable("store initializer went away"))?;
        Self::resolve(&state)
    }

    fn resolve(state: &StoreState) -> GridResult<GridStore> {
        match state {
            StoreState::Ready(store) => Ok(store.clone()),
            StoreState::Pending => Err(GridError::store_unavailable("store is still initializing")),
            StoreState::Failed(reason) => Err(GridError::store_unavailable(format!(
                "store initialization failed: {}",
                reason
            ))),
        }
    }
}

/// Chunked file storage scoped to one namespace
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn ChunkBackend>,
    namespace: Namespace,
    chunk_size: u32,
}

impl ChunkStore {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Start writing a new file under `name`.
    ///
    /// Fails fast with `NameCollision` when the name is already committed.
    /// The commit re-checks through the backend's uniqueness guarantee.
    pub async fn open_write(&self, name: LogicalName) -> GridResult<WriteHandle> {
        if self.backend.find_file(&self.namespace, &name).await?.is_some() {
            return Err(GridError::name_collision(self.namespace.as_str(), name.as_str()));
        }

        let handle = WriteHandle {
            backend: self.backend.clone(),
            file_id: FileId::new(),
            namespace: self.namespace.clone(),
            name,
            chunk_size: self.chunk_size,
            pending: BytesMut::with_capacity(self.chunk_size as usize),
            next_n: 0,
            attempted: false,
            length: 0,
            state: WriteState::Open,
        };
        debug!(file_id = %handle.file_id, name = %handle.name, "Opened write handle");
        Ok(handle)
    }

    /// Open a committed file for reading
    pub async fn open_read(&self, name: &LogicalName) -> GridResult<ReadHandle> {
        let file = self
            .backend
            .find_file(&self.namespace, name)
            .await?
            .ok_or_else(|| GridError::not_found(self.namespace.as_str(), name.as_str()))?;
        Ok(ReadHandle::new(self.backend.clone(), file))
    }

    /// Metadata of a committed file
    pub async fn find(&self, name: &LogicalName) -> GridResult<Option<StoredFile>> {
        self.backend.find_file(&self.namespace, name).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Open,
    /// A chunk write failed; only abort remains
    Failed,
    Committed,
    Aborted,
}

/// In-progress file write.
///
/// Bytes are cut into `chunk_size` chunks as they arrive; full chunks are
/// persisted right away, at most one partial chunk is held in memory.
/// Nothing is visible by name until [`WriteHandle::commit`] succeeds.
/// Dropping an uncommitted handle discards its chunks in the background.
pub struct WriteHandle {
    backend: Arc<dyn ChunkBackend>,
    file_id: FileId,
    namespace: Namespace,
    name: LogicalName,
    chunk_size: u32,
    pending: BytesMut,
    next_n: u32,
    /// Set before the first `put_chunk` is awaited
    attempted: bool,
    length: u64,
    state: WriteState,
}

impl std::fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("file_id", &self.file_id)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("length", &self.length)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WriteHandle {
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn logical_name(&self) -> &LogicalName {
        &self.name
    }

    /// Bytes accepted so far, including the unflushed tail
    pub fn bytes_written(&self) -> u64 {
        self.length
    }

    /// Chunks persisted so far
    pub fn chunks_written(&self) -> u32 {
        self.next_n
    }

    /// Append bytes to the file
    pub async fn write(&mut self, mut bytes: &[u8]) -> GridResult<()> {
        if self.state != WriteState::Open {
            return Err(GridError::write_failed(format!(
                "write handle for {} is no longer open",
                self.name
            )));
        }

        let chunk_size = self.chunk_size as usize;
        while !bytes.is_empty() {
            let take = (chunk_size - self.pending.len()).min(bytes.len());
            self.pending.extend_from_slice(&bytes[..take]);
            self.length += take as u64;
            bytes = &bytes[take..];

            if self.pending.len() == chunk_size {
                let chunk = self.pending.split().freeze();
                self.flush_chunk(chunk).await?;
            }
        }
        Ok(())
    }

    /// Flush the tail and publish the file record.
    ///
    /// On any failure the chunks written so far are discarded and nothing
    /// becomes visible under the name.
    pub async fn commit(mut self) -> GridResult<StoredFile> {
        if self.state != WriteState::Open {
            return Err(GridError::write_failed(format!(
                "write handle for {} is no longer open",
                self.name
            )));
        }

        if !self.pending.is_empty() {
            let tail = self.pending.split().freeze();
            if let Err(e) = self.flush_chunk(tail).await {
                self.discard().await;
                return Err(match e {
                    GridError::StoreUnavailable { .. } => e,
                    other => GridError::write_failed(format!("commit of {} failed: {}", self.name, other)),
                });
            }
        }

        let file = StoredFile {
            id: self.file_id.clone(),
            namespace: self.namespace.clone(),
            logical_name: self.name.clone(),
            extension: self.name.extension().to_ascii_lowercase(),
            length: self.length,
            chunk_size: self.chunk_size,
            chunk_count: self.next_n,
            created_at: Utc::now(),
        };

        match self.backend.commit_file(&file).await {
            Ok(()) => {
                self.state = WriteState::Committed;
                info!(
                    namespace = %file.namespace,
                    name = %file.logical_name,
                    length = file.length,
                    chunks = file.chunk_count,
                    "File committed"
                );
                Ok(file)
            }
            Err(e) => {
                warn!(name = %self.name, "Commit failed: {}", e);
                self.discard().await;
                Err(match e {
                    GridError::NameCollision { .. } | GridError::StoreUnavailable { .. } => e,
                    other => GridError::write_failed(format!("commit of {} failed: {}", self.name, other)),
                })
            }
        }
    }

    /// Discard everything written so far, returning the number of chunks removed
    pub async fn abort(mut self) -> GridResult<u64> {
        self.state = WriteState::Aborted;
        let removed = self.backend.discard_chunks(&self.file_id).await?;
        debug!(file_id = %self.file_id, removed, "Write aborted");
        Ok(removed)
    }

    async fn flush_chunk(&mut self, chunk: Bytes) -> GridResult<()> {
        let n = self.next_n;
        self.attempted = true;
        match self.backend.put_chunk(&self.file_id, n, chunk).await {
            Ok(()) => {
                self.next_n = n
                    .checked_add(1)
                    .ok_or_else(|| GridError::write_failed("chunk index overflow"))?;
                Ok(())
            }
            Err(e) => {
                self.state = WriteState::Failed;
                Err(match e {
                    GridError::StoreUnavailable { .. } => e,
                    other => GridError::stream(format!(
                        "failed to write chunk {} of {}: {}",
                        n, self.name, other
                    )),
                })
            }
        }
    }

    /// Best-effort removal used on failed commits
    async fn discard(&mut self) {
        self.state = WriteState::Aborted;
        if let Err(e) = self.backend.discard_chunks(&self.file_id).await {
            error!(file_id = %self.file_id, "Failed to discard chunks: {}", e);
        }
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if matches!(self.state, WriteState::Committed | WriteState::Aborted) {
            return;
        }
        // A failed or cancelled put may still have landed.
        if !self.attempted {
            return;
        }

        let backend = self.backend.clone();
        let file_id = self.file_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(%file_id, name = %self.name, "Uncommitted write dropped, discarding chunks");
                runtime.spawn(async move {
                    if let Err(e) = backend.discard_chunks(&file_id).await {
                        error!(%file_id, "Failed to discard chunks: {}", e);
                    }
                });
            }
            Err(_) => {
                error!(%file_id, "Uncommitted write dropped outside a runtime; chunks left behind");
            }
        }
    }
}

/// Lazy, single-pass reader over a committed file's chunks.
///
/// Yields chunks in sequence order, fetching one per poll. A missing or
/// mis-sized chunk ends the stream with a `StreamError`. Reading again
/// needs a fresh [`ChunkStore::open_read`].
pub struct ReadHandle {
    file: StoredFile,
    chunks: ChunkStream,
}

impl std::fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl ReadHandle {
    fn new(backend: Arc<dyn ChunkBackend>, file: StoredFile) -> Self {
        let chunks = read_chunks(backend, file.clone());
        Self { file, chunks }
    }

    pub fn file(&self) -> &StoredFile {
        &self.file
    }

    pub fn into_stream(self) -> ChunkStream {
        self.chunks
    }
}

impl Stream for ReadHandle {
    type Item = GridResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

fn read_chunks(backend: Arc<dyn ChunkBackend>, file: StoredFile) -> ChunkStream {
    let stream = async_stream::stream! {
        for n in 0..file.chunk_count {
            let expected = file.expected_chunk_len(n).unwrap_or(0);
            match backend.get_chunk(&file.id, n).await {
                Ok(Some(data)) if data.len() as u64 == expected => {
                    yield Ok(data);
                }
                Ok(Some(data)) => {
                    yield Err(GridError::stream(format!(
                        "chunk {} of {} has {} bytes, expected {}",
                        n, file.logical_name, data.len(), expected
                    )));
                    return;
                }
                Ok(None) => {
                    yield Err(GridError::stream(format!(
                        "chunk {} of {} is missing",
                        n, file.logical_name
                    )));
                    return;
                }
                Err(e) => {
                    yield Err(GridError::stream(format!(
                        "failed to read chunk {} of {}: {}",
                        n, file.logical_name, e
                    )));
                    return;
                }
            }
        }
    };
    Box::pin(stream)
}
