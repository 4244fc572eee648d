//! # Conflict Resolution
//!
//! A conflict exists when a Copy-mode file changed both in the library and
//! on the external root since the last sync. The engine never picks a side
//! on its own; it asks the injected [`ConflictResolver`] once per file.
//!
//! Closures work as resolvers:
//!
//! ```ignore
//! use core_sync::{ConflictChoice, ConflictDescriptor};
//!
//! let keep_tablet = |_: &ConflictDescriptor| ConflictChoice::UseExternal;
//! engine.retrieve(&keys, &keep_tablet).await?;
//! ```

use async_trait::async_trait;
use bridge_traits::ItemKey;
use std::path::PathBuf;

/// Everything a resolver needs to show the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDescriptor {
    pub key: ItemKey,
    pub filename: String,
    pub internal_path: PathBuf,
    pub external_path: PathBuf,
    /// Internal mtime in milliseconds
    pub internal_modified: i64,
    /// External mtime in milliseconds
    pub external_modified: i64,
    /// Recorded mtime of the last sync
    pub last_synced: i64,
}

/// Decision for one conflicting file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Overwrite the library copy with the external one
    UseExternal,
    /// Keep the library copy and discard the external one
    UseInternal,
    /// Leave the file tracked and untouched for now
    Skip,
}

#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, conflict: &ConflictDescriptor) -> ConflictChoice;
}

#[async_trait]
impl<F> ConflictResolver for F
where
    F: Fn(&ConflictDescriptor) -> ConflictChoice + Send + Sync,
{
    async fn resolve(&self, conflict: &ConflictDescriptor) -> ConflictChoice {
        self(conflict)
    }
}
