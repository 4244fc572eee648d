//! # Host Bridge Traits
//!
//! Abstraction traits the host environment implements for the PDF sync core.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the host it
//! runs inside. Each trait represents a capability the core requires but
//! must not own: the filesystem, the host's item store, annotation import.
//!
//! ## Traits
//!
//! ### I/O
//! - [`FileSystemAccess`](storage::FileSystemAccess) - exists/stat/copy/move/remove/mkdir/list
//!
//! ### Host library
//! - [`LibraryStore`](library::LibraryStore) - items, markers, sync blobs, marker queries
//! - [`LibraryTransaction`](library::LibraryTransaction) - atomic batch writes
//! - [`AnnotationExtractor`](library::AnnotationExtractor) - post-retrieve annotation import
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report missing paths and items so [`BridgeError::is_not_found`] holds
//! - Include error context (file paths, item keys)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so a single adapter can be
//! shared by the engine and the host UI behind an `Arc`.

pub mod error;
pub mod library;
pub mod logging;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use library::{
    AnnotationExtractor, BibliographicInfo, ItemInfo, ItemKey, ItemKind, LibraryStore,
    LibraryTransaction, LinkMode,
};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use storage::{FileMetadata, FileSystemAccess};
