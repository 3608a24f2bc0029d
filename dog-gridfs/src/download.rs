use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::{
    mime::content_type_for, ChunkStream, GridError, GridResult, LogicalName, Namespace,
    StoreCell, StoredFile,
};

/// A located file ready to be streamed to a client
pub struct Download {
    pub file: StoredFile,
    pub content_type: &'static str,
    pub stream: ChunkStream,
}

impl Download {
    pub fn content_length(&self) -> u64 {
        self.file.length
    }

    pub fn into_stream(self) -> ChunkStream {
        self.stream
    }

    /// Copy the whole file into `sink`.
    ///
    /// A failure part way through is an error even though some bytes were
    /// already written; the caller must not treat the body as complete.
    pub async fn write_to<W>(mut self, sink: &mut W) -> GridResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(item) = self.stream.next().await {
            let chunk = item?;
            sink.write_all(&chunk)
                .await
                .map_err(|e| GridError::stream(format!("sink write failed: {}", e)))?;
            written += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| GridError::stream(format!("sink flush failed: {}", e)))?;

        if written != self.file.length {
            return Err(GridError::stream(format!(
                "{} ended after {} of {} bytes",
                self.file.logical_name, written, self.file.length
            )));
        }
        Ok(written)
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("file", &self.file)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Resolves logical names and streams the stored chunks back out
#[derive(Clone)]
pub struct Downloader {
    stores: StoreCell,
}

impl Downloader {
    pub fn new(stores: StoreCell) -> Self {
        Self { stores }
    }

    /// Locate `name` in `namespace` and start streaming it.
    ///
    /// `NotFound` is returned before any byte is produced.
    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn serve(&self, namespace: Namespace, name: &LogicalName) -> GridResult<Download> {
        let store = self.stores.get()?;
        let depth = store.config().read_ahead_chunks.max(1);

        let handle = match store.bucket(namespace).open_read(name).await {
            Ok(handle) => handle,
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Failed to open file for download: {}", e);
                }
                return Err(e);
            }
        };

        let file = handle.file().clone();
        let content_type = content_type_for(&file.extension);
        debug!(length = file.length, content_type, "Serving file");

        Ok(Download {
            file,
            content_type,
            stream: prefetch(handle.into_stream(), depth),
        })
    }
}

/// Read up to `depth` chunks ahead of the consumer on a separate task.
///
/// The producer stops after forwarding an error, or as soon as the
/// consumer side is dropped.
fn prefetch(mut chunks: ChunkStream, depth: usize) -> ChunkStream {
    let (tx, mut rx) = mpsc::channel::<GridResult<bytes::Bytes>>(depth);

    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                _ = tx.closed() => {
                    debug!("Download consumer dropped, stopping read-ahead");
                    break;
                }
                item = chunks.next() => item,
            };

            let Some(item) = item else { break };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    Box::pin(async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    })
}
