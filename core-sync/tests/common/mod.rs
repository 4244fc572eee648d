//! Shared in-memory host library and filesystem for the engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{
    BibliographicInfo, FileMetadata, FileSystemAccess, ItemInfo, ItemKey, ItemKind, LibraryStore,
    LibraryTransaction, LinkMode,
};
use bytes::Bytes;
use core_runtime::config::{SyncSettings, SyncSettingsBuilder};
use core_sync::SyncEngine;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

pub const ROOT: &str = "/tablet";
pub const STORAGE: &str = "/library/storage";

// ============================================================================
// Mock Library
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockItem {
    pub info: ItemInfo,
    pub biblio: Option<BibliographicInfo>,
    pub path: Option<PathBuf>,
    pub blob: Option<String>,
    pub markers: BTreeSet<String>,
}

#[derive(Debug)]
enum Op {
    SetBlob(ItemKey, String),
    ClearBlob(ItemKey),
    AddMarker(ItemKey, String),
    RemoveMarker(ItemKey, String),
    Relink(ItemKey, PathBuf, LinkMode),
}

type Items = Arc<AsyncMutex<BTreeMap<ItemKey, MockItem>>>;

/// Host library held in memory; transactions apply on commit
pub struct MockLibrary {
    items: Items,
    storage_root: PathBuf,
    fail_commits: Arc<AtomicBool>,
}

impl MockLibrary {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            items: Arc::new(AsyncMutex::new(BTreeMap::new())),
            storage_root: storage_root.into(),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn insert(&self, item: MockItem) {
        self.items.lock().await.insert(item.info.key.clone(), item);
    }

    pub async fn item(&self, key: &ItemKey) -> Option<MockItem> {
        self.items.lock().await.get(key).cloned()
    }

    pub async fn set_blob(&self, key: &ItemKey, blob: Option<&str>) {
        if let Some(item) = self.items.lock().await.get_mut(key) {
            item.blob = blob.map(str::to_string);
        }
    }

    pub async fn set_path(&self, key: &ItemKey, path: Option<PathBuf>) {
        if let Some(item) = self.items.lock().await.get_mut(key) {
            item.path = path;
        }
    }

    pub async fn add_marker_now(&self, key: &ItemKey, marker: &str) {
        if let Some(item) = self.items.lock().await.get_mut(key) {
            item.markers.insert(marker.to_string());
        }
    }

    /// Make every following commit fail
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LibraryStore for MockLibrary {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<ItemInfo>> {
        Ok(self.items.lock().await.get(key).map(|item| item.info.clone()))
    }

    async fn parent_metadata(&self, key: &ItemKey) -> Result<Option<BibliographicInfo>> {
        let items = self.items.lock().await;
        let parent = items.get(key).and_then(|item| item.info.parent.clone());
        Ok(parent
            .and_then(|parent| items.get(&parent))
            .and_then(|parent| parent.biblio.clone()))
    }

    async fn content_path(&self, key: &ItemKey) -> Result<Option<PathBuf>> {
        Ok(self
            .items
            .lock()
            .await
            .get(key)
            .and_then(|item| item.path.clone()))
    }

    async fn storage_directory(&self, key: &ItemKey) -> Result<PathBuf> {
        Ok(self.storage_root.join(key.as_str()))
    }

    async fn sync_blob(&self, key: &ItemKey) -> Result<Option<String>> {
        Ok(self
            .items
            .lock()
            .await
            .get(key)
            .and_then(|item| item.blob.clone()))
    }

    async fn markers(&self, key: &ItemKey) -> Result<Vec<String>> {
        Ok(self
            .items
            .lock()
            .await
            .get(key)
            .map(|item| item.markers.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn items_with_marker(&self, marker: &str) -> Result<Vec<ItemKey>> {
        Ok(self
            .items
            .lock()
            .await
            .values()
            .filter(|item| item.markers.contains(marker))
            .map(|item| item.info.key.clone())
            .collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn LibraryTransaction + Send>> {
        Ok(Box::new(MockTransaction {
            items: Arc::clone(&self.items),
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
            ops: Vec::new(),
        }))
    }
}

struct MockTransaction {
    items: Items,
    fail_commit: bool,
    ops: Vec<Op>,
}

impl MockTransaction {
    async fn require(&self, key: &ItemKey) -> Result<()> {
        if self.items.lock().await.contains_key(key) {
            Ok(())
        } else {
            Err(BridgeError::NotFound(key.to_string()))
        }
    }
}

#[async_trait]
impl LibraryTransaction for MockTransaction {
    async fn set_sync_blob(&mut self, key: &ItemKey, blob: &str) -> Result<()> {
        self.require(key).await?;
        self.ops.push(Op::SetBlob(key.clone(), blob.to_string()));
        Ok(())
    }

    async fn clear_sync_blob(&mut self, key: &ItemKey) -> Result<()> {
        self.ops.push(Op::ClearBlob(key.clone()));
        Ok(())
    }

    async fn add_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()> {
        self.require(key).await?;
        self.ops.push(Op::AddMarker(key.clone(), marker.to_string()));
        Ok(())
    }

    async fn remove_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()> {
        self.ops.push(Op::RemoveMarker(key.clone(), marker.to_string()));
        Ok(())
    }

    async fn relink(&mut self, key: &ItemKey, path: &Path, link_mode: LinkMode) -> Result<()> {
        self.require(key).await?;
        self.ops
            .push(Op::Relink(key.clone(), path.to_path_buf(), link_mode));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            return Err(BridgeError::DatabaseError("commit refused".to_string()));
        }

        let mut items = self.items.lock().await;
        for op in self.ops {
            match op {
                Op::SetBlob(key, blob) => {
                    if let Some(item) = items.get_mut(&key) {
                        item.blob = Some(blob);
                    }
                }
                Op::ClearBlob(key) => {
                    if let Some(item) = items.get_mut(&key) {
                        item.blob = None;
                    }
                }
                Op::AddMarker(key, marker) => {
                    if let Some(item) = items.get_mut(&key) {
                        item.markers.insert(marker);
                    }
                }
                Op::RemoveMarker(key, marker) => {
                    if let Some(item) = items.get_mut(&key) {
                        item.markers.remove(&marker);
                    }
                }
                Op::Relink(key, path, link_mode) => {
                    if let Some(item) = items.get_mut(&key) {
                        item.path = Some(path);
                        item.info.link_mode = Some(link_mode);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Mock File System
// ============================================================================

#[derive(Debug, Clone)]
struct MockFile {
    data: Bytes,
    modified: i64,
}

#[derive(Debug, Default)]
struct FsState {
    files: HashMap<PathBuf, MockFile>,
    dirs: BTreeSet<PathBuf>,
    /// Every write or copy advances the clock by one second
    clock: i64,
}

impl FsState {
    fn tick(&mut self) -> i64 {
        self.clock += 1_000;
        self.clock
    }

    fn add_dirs(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn add_parent(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
    }
}

fn not_found(path: &Path) -> BridgeError {
    BridgeError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        path.display().to_string(),
    ))
}

/// Filesystem held in memory with a deterministic clock
#[derive(Default)]
pub struct MockFs {
    state: AsyncMutex<FsState>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file; returns its new mtime
    pub async fn put(&self, path: impl AsRef<Path>, data: &str) -> i64 {
        let path = path.as_ref();
        let mut state = self.state.lock().await;
        let modified = state.tick();
        state.add_parent(path);
        state.files.insert(
            path.to_path_buf(),
            MockFile {
                data: Bytes::from(data.to_string()),
                modified,
            },
        );
        modified
    }

    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state
            .lock()
            .await
            .files
            .get(path.as_ref())
            .map(|file| String::from_utf8_lossy(&file.data).into_owned())
    }

    pub async fn mtime(&self, path: impl AsRef<Path>) -> Option<i64> {
        self.state
            .lock()
            .await
            .files
            .get(path.as_ref())
            .map(|file| file.modified)
    }

    pub async fn set_mtime(&self, path: impl AsRef<Path>, modified: i64) {
        if let Some(file) = self.state.lock().await.files.get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    pub async fn remove(&self, path: impl AsRef<Path>) {
        self.state.lock().await.files.remove(path.as_ref());
    }

    pub async fn has_file(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().await.files.contains_key(path.as_ref())
    }

    pub async fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().await.dirs.contains(path.as_ref())
    }

    /// Files below `dir`, sorted
    pub async fn files_under(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = self
            .state
            .lock()
            .await
            .files
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect();
        files.sort();
        files
    }
}

#[async_trait]
impl FileSystemAccess for MockFs {
    async fn exists(&self, path: &Path) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let state = self.state.lock().await;
        if let Some(file) = state.files.get(path) {
            return Ok(FileMetadata {
                size: file.data.len() as u64,
                modified_at: Some(file.modified),
                is_directory: false,
            });
        }
        if state.dirs.contains(path) {
            return Ok(FileMetadata {
                size: 0,
                modified_at: None,
                is_directory: true,
            });
        }
        Err(not_found(path))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.state.lock().await.add_dirs(path);
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        let data = state
            .files
            .get(from)
            .map(|file| file.data.clone())
            .ok_or_else(|| not_found(from))?;
        let modified = state.tick();
        state.add_parent(to);
        state
            .files
            .insert(to.to_path_buf(), MockFile { data, modified });
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        let file = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.add_parent(to);
        state.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .await
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    async fn delete_empty_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }

        let has_children = state.files.keys().any(|p| p.parent() == Some(path))
            || state.dirs.iter().any(|p| p.parent() == Some(path));
        if has_children {
            return Err(BridgeError::OperationFailed(format!(
                "directory not empty: {}",
                path.display()
            )));
        }

        state.dirs.remove(path);
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().await;
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }

        let mut entries: Vec<PathBuf> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.state
            .lock()
            .await
            .files
            .get(path)
            .map(|file| file.data.clone())
            .ok_or_else(|| not_found(path))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        let modified = state.tick();
        state.add_parent(path);
        state
            .files
            .insert(path.to_path_buf(), MockFile { data, modified });
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub fn turing() -> BibliographicInfo {
    BibliographicInfo {
        title: "On Computable Numbers".to_string(),
        creators: vec!["Turing".to_string()],
        year: Some("1936".to_string()),
        publication: Some("Proceedings of the London Mathematical Society".to_string()),
    }
}

pub struct Fixture {
    pub library: Arc<MockLibrary>,
    pub fs: Arc<MockFs>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            library: Arc::new(MockLibrary::new(STORAGE)),
            fs: Arc::new(MockFs::new()),
        }
    }

    pub fn root() -> PathBuf {
        PathBuf::from(ROOT)
    }

    /// Library path of an attachment's content
    pub fn internal_path(key: &str, file_name: &str) -> PathBuf {
        Path::new(STORAGE).join(key).join(file_name)
    }

    pub fn external_path(relative: &str) -> PathBuf {
        Path::new(ROOT).join(relative)
    }

    /// Add a parent item `P<key>` with a PDF attachment `<key>` stored on disk
    pub async fn add_paper(
        &self,
        key: &str,
        file_name: &str,
        biblio: Option<BibliographicInfo>,
    ) -> ItemKey {
        let parent = ItemKey::new(format!("P{}", key));
        self.library
            .insert(MockItem {
                info: ItemInfo {
                    key: parent.clone(),
                    kind: ItemKind::Regular,
                    parent: None,
                    content_type: None,
                    link_mode: None,
                    title: biblio
                        .as_ref()
                        .map(|b| b.title.clone())
                        .unwrap_or_default(),
                },
                biblio,
                path: None,
                blob: None,
                markers: BTreeSet::new(),
            })
            .await;

        let path = Self::internal_path(key, file_name);
        self.fs.put(&path, &format!("library copy of {}", key)).await;

        let key = ItemKey::new(key);
        self.library
            .insert(MockItem {
                info: ItemInfo {
                    key: key.clone(),
                    kind: ItemKind::Attachment,
                    parent: Some(parent),
                    content_type: Some("application/pdf".to_string()),
                    link_mode: Some(LinkMode::ImportedFile),
                    title: file_name.to_string(),
                },
                biblio: None,
                path: Some(path),
                blob: None,
                markers: BTreeSet::new(),
            })
            .await;
        key
    }

    pub fn settings() -> SyncSettingsBuilder {
        SyncSettings::builder().external_root(ROOT)
    }

    pub fn engine(&self, settings: SyncSettings) -> SyncEngine {
        SyncEngine::new(settings, self.library.clone(), self.fs.clone())
            .expect("valid settings")
    }

    pub fn copy_engine(&self) -> SyncEngine {
        self.engine(Self::settings().build().expect("valid settings"))
    }
}
