//! Host Library Abstractions
//!
//! Narrow view of the host reference library the sync core runs inside:
//! - Item and attachment lookup (parent, content type, link mode, storage)
//! - A free-text sync blob stored per item
//! - Tag-like markers and the "all items having marker X" query
//! - Transactional batch writes
//!
//! The core never sees the host's schema. Hosts implement [`LibraryStore`]
//! once per platform (the desktop adapter is SQLite-backed).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Stable identifier of a library item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// How an attachment's content is held by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// File lives in library-owned storage
    ImportedFile,
    /// Library holds a link to a file elsewhere on disk
    LinkedFile,
    /// Attachment points at a URL and has no local file
    LinkedUrl,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::ImportedFile => "imported_file",
            LinkMode::LinkedFile => "linked_file",
            LinkMode::LinkedUrl => "linked_url",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "imported_file" => Some(LinkMode::ImportedFile),
            "linked_file" => Some(LinkMode::LinkedFile),
            "linked_url" => Some(LinkMode::LinkedUrl),
            _ => None,
        }
    }
}

/// Item kind as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Regular,
    Attachment,
    Note,
}

/// Host item summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub key: ItemKey,
    pub kind: ItemKind,
    /// Parent item, `None` for top-level items
    pub parent: Option<ItemKey>,
    /// MIME type of the attachment content
    pub content_type: Option<String>,
    pub link_mode: Option<LinkMode>,
    pub title: String,
}

impl ItemInfo {
    pub fn is_attachment(&self) -> bool {
        self.kind == ItemKind::Attachment
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Key of the top-level item this item belongs to
    pub fn top_level_key(&self) -> &ItemKey {
        self.parent.as_ref().unwrap_or(&self.key)
    }
}

/// Bibliographic fields of a parent item, used for file naming
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibliographicInfo {
    pub title: String,
    /// Creator last names in display order
    pub creators: Vec<String>,
    pub year: Option<String>,
    /// Journal or publication title
    pub publication: Option<String>,
}

/// Host item store
///
/// Reads go straight to the host. Writes only happen through a
/// [`LibraryTransaction`], so a batch of record and marker updates becomes
/// visible all at once or not at all.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Look up an item, `Ok(None)` if the key is unknown
    async fn get_item(&self, key: &ItemKey) -> Result<Option<ItemInfo>>;

    /// Bibliographic fields of the item's parent, if it has one
    async fn parent_metadata(&self, key: &ItemKey) -> Result<Option<BibliographicInfo>>;

    /// Resolve the current content path of an attachment
    async fn content_path(&self, key: &ItemKey) -> Result<Option<PathBuf>>;

    /// Library-owned storage directory for an attachment's files
    async fn storage_directory(&self, key: &ItemKey) -> Result<PathBuf>;

    /// Raw sync blob stored on the item
    async fn sync_blob(&self, key: &ItemKey) -> Result<Option<String>>;

    /// All markers currently attached to an item
    async fn markers(&self, key: &ItemKey) -> Result<Vec<String>>;

    /// Check whether an item carries a marker
    async fn has_marker(&self, key: &ItemKey, marker: &str) -> Result<bool> {
        Ok(self.markers(key).await?.iter().any(|m| m == marker))
    }

    /// Every item carrying the given marker
    async fn items_with_marker(&self, marker: &str) -> Result<Vec<ItemKey>>;

    /// Begin a transaction for atomic updates
    ///
    /// Dropping the transaction without committing discards its writes.
    async fn begin_transaction(&self) -> Result<Box<dyn LibraryTransaction + Send>>;
}

/// Transaction for atomic library updates
#[async_trait]
pub trait LibraryTransaction: Send {
    /// Replace the sync blob of an item
    async fn set_sync_blob(&mut self, key: &ItemKey, blob: &str) -> Result<()>;

    /// Remove the sync blob of an item (no-op when absent)
    async fn clear_sync_blob(&mut self, key: &ItemKey) -> Result<()>;

    /// Attach a marker (no-op when present)
    async fn add_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()>;

    /// Detach a marker (no-op when absent)
    async fn remove_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()>;

    /// Point an attachment at a new content path
    async fn relink(&mut self, key: &ItemKey, path: &Path, link_mode: LinkMode) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Annotation extraction collaborator
///
/// Invoked with the files that were just retrieved when extract-on-sync is
/// enabled. Returns the number of annotations imported.
#[async_trait]
pub trait AnnotationExtractor: Send + Sync {
    async fn extract_annotations(&self, keys: &[ItemKey]) -> Result<usize>;
}
