use bridge_traits::{BridgeError, ItemKey};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("External folder is not configured")]
    ExternalRootNotConfigured,

    #[error("Unknown project folder: {0}")]
    UnknownProject(String),

    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("External file missing: {0}")]
    ExternalMissing(String),

    #[error("Too many files named like {0}")]
    TooManyCollisions(String),

    #[error("Sync metadata error: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl SyncError {
    /// Classify the error for per-file reporting
    pub fn kind(&self) -> FileErrorKind {
        match self {
            SyncError::SourceMissing(_) => FileErrorKind::SourceMissing,
            SyncError::ExternalMissing(_) => FileErrorKind::ExternalMissing,
            SyncError::TooManyCollisions(_) => FileErrorKind::TooManyCollisions,
            SyncError::Metadata(_) => FileErrorKind::MetadataCorrupt,
            other => FileErrorKind::Unknown(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Why a single file failed inside a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileErrorKind {
    SourceMissing,
    ExternalMissing,
    TooManyCollisions,
    MetadataCorrupt,
    /// The conflict resolver chose to skip the file
    ConflictUnresolved,
    Unknown(String),
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileErrorKind::SourceMissing => f.write_str("source file missing"),
            FileErrorKind::ExternalMissing => f.write_str("external file missing"),
            FileErrorKind::TooManyCollisions => f.write_str("too many name collisions"),
            FileErrorKind::MetadataCorrupt => f.write_str("sync metadata unreadable"),
            FileErrorKind::ConflictUnresolved => f.write_str("conflict skipped"),
            FileErrorKind::Unknown(cause) => write!(f, "{}", cause),
        }
    }
}

/// Per-file failure collected into a pass summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub key: ItemKey,
    /// Display name for messages
    pub filename: String,
    pub kind: FileErrorKind,
}

impl FileError {
    pub fn new(key: ItemKey, filename: impl Into<String>, kind: FileErrorKind) -> Self {
        Self {
            key,
            filename: filename.into(),
            kind,
        }
    }

    pub(crate) fn from_sync_error(key: ItemKey, filename: impl Into<String>, error: &SyncError) -> Self {
        Self::new(key, filename, error.kind())
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.filename, self.kind)
    }
}
