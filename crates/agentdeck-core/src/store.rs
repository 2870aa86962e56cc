use std::fmt;

use serde_json::Value;

/// The independently persisted documents that make up dashboard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Document {
    Config,
    Status,
    Activity,
    Uptime,
    Errors,
    Settings,
}

impl Document {
    pub const ALL: [Document; 6] = [
        Document::Config,
        Document::Status,
        Document::Activity,
        Document::Uptime,
        Document::Errors,
        Document::Settings,
    ];

    /// File name of the document inside the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Document::Config => "agents.json",
            Document::Status => "status.json",
            Document::Activity => "activity.json",
            Document::Uptime => "uptime.json",
            Document::Errors => "errors.json",
            Document::Settings => "settings.json",
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {doc}: {source}")]
    Io {
        doc: Document,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {doc}: {source}")]
    Json {
        doc: Document,
        #[source]
        source: serde_json::Error,
    },
    #[error("persistence writer for {0} has shut down")]
    WriterClosed(Document),
}

/// Load/save of named JSON documents.
///
/// `save` is write-through from the caller's point of view: it is issued
/// immediately after the in-memory mutation, in program order, and its
/// failure never rolls that mutation back.
pub trait Store: Send + Sync {
    /// Returns `Ok(None)` when the document has never been written.
    fn load(&self, doc: Document) -> Result<Option<Value>, StoreError>;

    fn save(&self, doc: Document, value: &Value) -> Result<(), StoreError>;
}
