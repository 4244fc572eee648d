//! # PDF Sync Module
//!
//! Moves PDF attachments between a host reference library and an external
//! folder (typically a tablet mount or a synced directory) and back.
//!
//! ## Overview
//!
//! - Sends attachments out, renamed and placed into subfolders on request
//! - Retrieves them, detecting external edits and two-sided conflicts
//! - Checks tracked files for external modifications
//! - Keeps per-file sync records and state markers on the host library
//!
//! ## Components
//!
//! - **Batch Executor** (`batch`): Bounded-concurrency runner that keeps input order
//! - **Paths** (`paths`, `naming`): Collision-free destinations and name templates
//! - **Metadata Store** (`metadata_store`): Sync records encoded on the host item
//! - **Sync Engine** (`engine`, `send`, `retrieve`): Validation and the passes themselves
//! - **Status Projection** (`status`): One status badge per item

pub mod batch;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod metadata_store;
pub mod naming;
pub mod paths;
mod retrieve;
mod send;
pub mod state;
pub mod status;
pub mod summary;

pub use batch::{run_batch, BatchOutcome};
pub use conflict::{ConflictChoice, ConflictDescriptor, ConflictResolver};
pub use engine::{InvalidReason, SyncEngine, TrackedFile, Validation, PDF_CONTENT_TYPE};
pub use error::{FileError, FileErrorKind, Result, SyncError};
pub use metadata_store::{RecordLookup, SyncMetadataStore};
pub use state::{ExternalLocation, StateMarkers, SyncMode, SyncRecord, SyncState};
pub use status::FileStatus;
pub use summary::{CheckSummary, SyncSummary, DEFAULT_MESSAGE_LIMIT};
