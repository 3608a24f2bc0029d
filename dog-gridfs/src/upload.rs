use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use crate::{
    names::{NameGenerator, RandomHexNames},
    GridConfig, GridError, GridResult, Namespace, Payload, StoreCell, StoredFile, WriteHandle,
};

/// Caller-domain check run before any bytes are written
pub trait UploadCheck: Send + Sync {
    fn check(&self) -> GridResult<()>;
}

/// Stages an upload moves through, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadStage {
    Received,
    Validating,
    Streaming,
    Committing,
    Done,
    Failed,
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Streaming => "streaming",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Request to store one uploaded file
pub struct UploadRequest {
    pub namespace: Namespace,
    pub original_filename: String,
    pub payload: Payload,
    checks: Vec<Box<dyn UploadCheck>>,
}

impl UploadRequest {
    pub fn new<S: Into<String>>(namespace: Namespace, original_filename: S, payload: Payload) -> Self {
        Self {
            namespace,
            original_filename: original_filename.into(),
            payload,
            checks: Vec::new(),
        }
    }

    /// Add a check that must pass before streaming starts
    pub fn with_check<C: UploadCheck + 'static>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }
}

/// Result of a successful upload: the committed file plus whatever the
/// completion callback produced
#[derive(Debug, Clone)]
pub struct UploadReceipt<R> {
    pub file: StoredFile,
    pub reference: R,
}

struct StageTracker {
    stage: UploadStage,
}

impl StageTracker {
    fn new() -> Self {
        debug!(stage = %UploadStage::Received, "Upload stage");
        Self {
            stage: UploadStage::Received,
        }
    }

    fn advance(&mut self, next: UploadStage) {
        debug!(from = %self.stage, to = %next, "Upload stage");
        self.stage = next;
    }

    fn fail(&mut self, error: GridError) -> GridError {
        warn!(stage = %self.stage, "Upload failed: {}", error);
        self.stage = UploadStage::Failed;
        error
    }
}

/// Drives uploads into the chunk store: validate, stream, commit, then
/// hand the committed file to the caller's completion callback.
#[derive(Clone)]
pub struct Uploader {
    stores: StoreCell,
    names: Arc<dyn NameGenerator>,
}

impl Uploader {
    pub fn new(stores: StoreCell) -> Self {
        Self {
            stores,
            names: Arc::new(RandomHexNames),
        }
    }

    /// Use a custom name generator
    pub fn with_name_generator<N: NameGenerator + 'static>(mut self, names: N) -> Self {
        self.names = Arc::new(names);
        self
    }

    /// Store the payload and, only once it is committed, run `on_committed`.
    ///
    /// If the callback fails the file stays committed with nothing
    /// referencing it; the error names it so the caller can reconcile.
    #[instrument(skip_all, fields(namespace = %request.namespace, filename = %request.original_filename))]
    pub async fn upload<F, Fut, R>(
        &self,
        request: UploadRequest,
        on_committed: F,
    ) -> GridResult<UploadReceipt<R>>
    where
        F: FnOnce(StoredFile) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let mut tracker = StageTracker::new();

        let store = self.stores.get().map_err(|e| tracker.fail(e))?;

        tracker.advance(UploadStage::Validating);
        Self::validate(&request, store.config()).map_err(|e| tracker.fail(e))?;

        let UploadRequest {
            namespace,
            original_filename,
            payload,
            ..
        } = request;
        let name = self.names.generate(&original_filename);

        tracker.advance(UploadStage::Streaming);
        let mut handle = store
            .bucket(namespace)
            .open_write(name)
            .await
            .map_err(|e| tracker.fail(e))?;

        if let Err(e) = Self::stream_payload(&mut handle, payload, store.config().max_file_bytes).await {
            let e = match e {
                GridError::ValidationFailed { .. }
                | GridError::StoreUnavailable { .. }
                | GridError::WriteFailed { .. } => e,
                other => GridError::write_failed(other.to_string()),
            };
            if let Err(abort_err) = handle.abort().await {
                warn!("Abort after failed upload also failed: {}", abort_err);
            }
            return Err(tracker.fail(e));
        }

        tracker.advance(UploadStage::Committing);
        let file = handle.commit().await.map_err(|e| tracker.fail(e))?;

        match on_committed(file.clone()).await {
            Ok(reference) => {
                tracker.advance(UploadStage::Done);
                Ok(UploadReceipt { file, reference })
            }
            Err(e) => {
                warn!(
                    name = %file.logical_name,
                    "File committed but reference could not be saved; file is orphaned"
                );
                Err(tracker.fail(GridError::reference_failed(file.logical_name.as_str(), e)))
            }
        }
    }

    fn validate(request: &UploadRequest, config: &GridConfig) -> GridResult<()> {
        if request.original_filename.trim().is_empty() {
            return Err(GridError::validation("No file uploaded"));
        }

        if let Some(len) = request.payload.known_len() {
            if len > config.max_file_bytes {
                return Err(GridError::validation(format!(
                    "File size {} exceeds maximum {}",
                    len, config.max_file_bytes
                )));
            }
        }

        for check in &request.checks {
            check.check()?;
        }
        Ok(())
    }

    async fn stream_payload(
        handle: &mut WriteHandle,
        payload: Payload,
        max_file_bytes: u64,
    ) -> GridResult<()> {
        match payload {
            Payload::Buffered(bytes) => handle.write(&bytes).await,
            Payload::Stream(mut stream) => {
                while let Some(item) = stream.next().await {
                    let bytes = item
                        .map_err(|e| GridError::write_failed(format!("payload stream failed: {}", e)))?;

                    if handle.bytes_written() + bytes.len() as u64 > max_file_bytes {
                        return Err(GridError::validation(format!(
                            "File exceeds maximum size of {} bytes",
                            max_file_bytes
                        )));
                    }
                    handle.write(&bytes).await?;
                }
                Ok(())
            }
        }
    }
}
