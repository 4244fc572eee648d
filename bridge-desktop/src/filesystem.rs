//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, warn};

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - Millisecond modification times
/// - Copy + delete fallback when a move crosses devices
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn millis(time: SystemTime) -> Option<i64> {
        time.duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as i64)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata.modified().ok().and_then(Self::millis),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;
        let bytes = fs::copy(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, size = bytes, "Copied file");
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;

        match fs::rename(from, to).await {
            Ok(()) => {
                debug!(from = ?from, to = ?to, "Moved file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::map_io_error(e)),
            Err(e) => {
                // Rename fails across mount points; fall back to copy + delete.
                warn!(from = ?from, to = ?to, error = %e, "Rename failed, copying instead");
                fs::copy(from, to).await.map_err(Self::map_io_error)?;
                fs::remove_file(from).await.map_err(Self::map_io_error)?;
                debug!(from = ?from, to = ?to, "Moved file via copy");
                Ok(())
            }
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_empty_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(Self::map_io_error)?
        {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let test_file = dir.path().join("nested").join("paper.pdf");

        let data = Bytes::from("%PDF-1.7");
        fs.write_file(&test_file, data.clone()).await.unwrap();

        let read_data = fs.read_file(&test_file).await.unwrap();
        assert_eq!(data, read_data);
        assert!(fs.modified_millis(&test_file).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_copy_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let source = dir.path().join("a.pdf");
        let target = dir.path().join("tablet").join("a.pdf");

        fs.write_file(&target, Bytes::from("old")).await.unwrap();
        fs.write_file(&source, Bytes::from("new")).await.unwrap();
        fs.copy_file(&source, &target).await.unwrap();

        assert_eq!(fs.read_file(&target).await.unwrap(), Bytes::from("new"));
        assert!(fs.exists(&source).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_creates_parent_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let source = dir.path().join("a.pdf");
        let target = dir.path().join("x").join("y").join("a.pdf");

        fs.write_file(&source, Bytes::from("content")).await.unwrap();
        fs.move_file(&source, &target).await.unwrap();

        assert!(!fs.exists(&source).await.unwrap());
        assert_eq!(fs.read_file(&target).await.unwrap(), Bytes::from("content"));
    }

    #[tokio::test]
    async fn test_move_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        let err = fs
            .move_file(&dir.path().join("missing.pdf"), &dir.path().join("b.pdf"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_empty_dir_refuses_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let sub = dir.path().join("sub");

        fs.write_file(&sub.join("keep.pdf"), Bytes::from("x"))
            .await
            .unwrap();
        assert!(fs.delete_empty_dir(&sub).await.is_err());

        fs.delete_file(&sub.join("keep.pdf")).await.unwrap();
        fs.delete_empty_dir(&sub).await.unwrap();
        assert!(!fs.exists(&sub).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        fs.write_file(&dir.path().join("one.pdf"), Bytes::from("1"))
            .await
            .unwrap();
        fs.create_dir_all(&dir.path().join("folder")).await.unwrap();

        let mut entries = fs.list_directory(dir.path()).await.unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![dir.path().join("folder"), dir.path().join("one.pdf")]
        );
    }
}
