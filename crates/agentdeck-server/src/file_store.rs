use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use agentdeck_core::{Document, Store, StoreError};

enum WriteJob {
    Write { doc: Document, bytes: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

/// One pretty-printed JSON file per document under a data directory.
///
/// Saves are queued to a single writer task, so they never block the caller
/// and reach disk in the order they were issued.
pub struct FileStore {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl FileStore {
    /// Create the data directory if needed and start the writer task. Must be
    /// called from within a tokio runtime.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(dir.clone(), rx));
        Ok(Self { dir, tx })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, doc: Document) -> PathBuf {
        self.dir.join(doc.file_name())
    }

    /// Wait until every save queued before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl Store for FileStore {
    fn load(&self, doc: Document) -> Result<Option<Value>, StoreError> {
        let content = match std::fs::read_to_string(self.path(doc)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { doc, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Json { doc, source })
    }

    fn save(&self, doc: Document, value: &Value) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json { doc, source })?;
        self.tx
            .send(WriteJob::Write { doc, bytes })
            .map_err(|_| StoreError::WriterClosed(doc))
    }
}

async fn run_writer(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::Write { doc, bytes } => {
                if let Err(e) = write_document(&dir, doc, &bytes).await {
                    tracing::warn!(doc = %doc, error = %e, "Failed to write document");
                }
            },
            WriteJob::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
    tracing::debug!("Persistence writer stopped");
}

/// Write through a temporary file and rename, so readers never see a
/// partially written document.
async fn write_document(dir: &Path, doc: Document, bytes: &[u8]) -> std::io::Result<()> {
    let path = dir.join(doc.file_name());
    let tmp = dir.join(format!(".{}.tmp", doc.file_name()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await
}
