//! File System Abstractions
//!
//! Provides the platform-agnostic trait the sync core uses for every file
//! operation against library storage and the external folder.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations so the sync engine can run against:
/// - Desktop: Direct filesystem access (tablet mounts, cloud-synced folders)
/// - Tests: In-memory filesystems with controlled modification times
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn duplicate(fs: &dyn FileSystemAccess, from: &Path, to: &Path) -> Result<i64> {
///     fs.copy_file(from, to).await?;
///     fs.modified_millis(to).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Copy a file, overwriting the destination if it exists
    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move a file to a new location
    ///
    /// Implementations must fall back to copy + delete when a plain rename is
    /// not possible (e.g. the external folder is on another device).
    async fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory, failing if it is not empty
    async fn delete_empty_dir(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Modification time of a file in milliseconds since the Unix epoch
    async fn modified_millis(&self, path: &Path) -> Result<i64> {
        self.metadata(path).await?.modified_at.ok_or_else(|| {
            BridgeError::NotAvailable(format!(
                "modification time unavailable for {}",
                path.display()
            ))
        })
    }
}
