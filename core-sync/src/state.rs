//! # Sync State Model
//!
//! Per-file sync state, the persisted [`SyncRecord`], and the boundary
//! adapter mapping states to host marker strings.
//!
//! ```text
//!              send                 external mtime > last sync
//! Untracked ────────> OnExternal ─────────────────────────────> OnExternalModified
//!     ^                  │   ^                                         │
//!     │                  │   └──────── mtime back at or below ─────────┘
//!     └──── retrieve ────┴──────────────── retrieve ───────────────────┘
//! ```
//!
//! The state itself is never stored; it is decoded from markers on every read.

use bridge_traits::{ItemKey, LibraryTransaction};
use core_runtime::config::MarkerNames;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::Result;

pub use core_runtime::config::SyncMode;

/// Placeholder standing in for the external root inside stored locations
pub const BASE_FOLDER_PLACEHOLDER: &str = "[BaseFolder]";

/// Sync state of a managed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Untracked,
    OnExternal,
    OnExternalModified,
}

impl SyncState {
    pub fn is_tracked(&self) -> bool {
        !matches!(self, SyncState::Untracked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Untracked => "untracked",
            SyncState::OnExternal => "on_external",
            SyncState::OnExternalModified => "on_external_modified",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the external copy lives
///
/// Paths under the external root are kept relative so the root can move;
/// anything else is kept absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalLocation {
    Relative(PathBuf),
    Absolute(PathBuf),
}

impl ExternalLocation {
    /// Capture `path` relative to `root` when possible
    pub fn from_path(path: &Path, root: &Path) -> Self {
        match path.strip_prefix(root) {
            Ok(relative) if !relative.as_os_str().is_empty() => {
                ExternalLocation::Relative(relative.to_path_buf())
            }
            _ => ExternalLocation::Absolute(path.to_path_buf()),
        }
    }

    /// Resolve against the root configured right now
    pub fn resolve(&self, root: &Path) -> PathBuf {
        match self {
            ExternalLocation::Relative(relative) => root.join(relative),
            ExternalLocation::Absolute(path) => path.clone(),
        }
    }

    /// Stored string form, `[BaseFolder]/a/b.pdf` for relative locations
    pub fn encode(&self) -> String {
        match self {
            ExternalLocation::Relative(relative) => {
                let mut encoded = BASE_FOLDER_PLACEHOLDER.to_string();
                for component in relative.components() {
                    if let Component::Normal(part) = component {
                        encoded.push('/');
                        encoded.push_str(&part.to_string_lossy());
                    }
                }
                encoded
            }
            ExternalLocation::Absolute(path) => path.to_string_lossy().into_owned(),
        }
    }

    pub fn decode(value: &str) -> Self {
        match value.strip_prefix(BASE_FOLDER_PLACEHOLDER) {
            Some(rest) => ExternalLocation::Relative(
                rest.split(['/', '\\'])
                    .filter(|part| !matches!(*part, "" | "." | ".."))
                    .collect(),
            ),
            None => ExternalLocation::Absolute(PathBuf::from(value)),
        }
    }
}

/// Persisted per-file sync metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub location: ExternalLocation,
    /// External mtime in milliseconds at the last successful sync action
    pub last_modified: i64,
    /// Fixed at send time
    pub mode: SyncMode,
    pub project_group: Option<String>,
}

/// Maps [`SyncState`] to and from host marker strings
#[derive(Debug, Clone)]
pub struct StateMarkers {
    tracked: String,
    modified: String,
}

impl StateMarkers {
    pub fn new(names: &MarkerNames) -> Self {
        Self {
            tracked: names.tracked.clone(),
            modified: names.modified.clone(),
        }
    }

    pub fn tracked(&self) -> &str {
        &self.tracked
    }

    pub fn modified(&self) -> &str {
        &self.modified
    }

    /// Decode a state from an item's markers
    ///
    /// A modified marker without the tracked marker is stray and ignored.
    pub fn decode(&self, markers: &[String]) -> SyncState {
        let tracked = markers.iter().any(|m| *m == self.tracked);
        let modified = markers.iter().any(|m| *m == self.modified);

        match (tracked, modified) {
            (true, true) => SyncState::OnExternalModified,
            (true, false) => SyncState::OnExternal,
            (false, _) => SyncState::Untracked,
        }
    }

    /// Stage the markers encoding `state` into a transaction
    pub async fn stage(
        &self,
        tx: &mut (dyn LibraryTransaction + Send),
        key: &ItemKey,
        state: SyncState,
    ) -> Result<()> {
        match state {
            SyncState::Untracked => {
                tx.remove_marker(key, &self.tracked).await?;
                tx.remove_marker(key, &self.modified).await?;
            }
            SyncState::OnExternal => {
                tx.add_marker(key, &self.tracked).await?;
                tx.remove_marker(key, &self.modified).await?;
            }
            SyncState::OnExternalModified => {
                tx.add_marker(key, &self.tracked).await?;
                tx.add_marker(key, &self.modified).await?;
            }
        }
        Ok(())
    }
}
