//! End-to-end round trips against the desktop adapters
//!
//! Uses a real temporary directory and the SQLite-backed library.

use bridge_desktop::{NewItem, SqliteLibraryStore, TokioFileSystem};
use bridge_traits::{BibliographicInfo, ItemKey, ItemKind, LibraryStore, LinkMode};
use core_runtime::config::{SyncMode, SyncSettings};
use core_sync::{ConflictChoice, ConflictDescriptor, FileErrorKind, SyncEngine, SyncState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

struct Desktop {
    _dir: TempDir,
    storage: PathBuf,
    root: PathBuf,
    library: Arc<SqliteLibraryStore>,
}

async fn desktop() -> Desktop {
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("storage");
    let root = dir.path().join("tablet");
    std::fs::create_dir_all(&root).unwrap();

    let library = SqliteLibraryStore::in_memory(storage.clone()).await.unwrap();
    Desktop {
        _dir: dir,
        storage,
        root,
        library: Arc::new(library),
    }
}

async fn add_paper(desktop: &Desktop, key: &str) -> (ItemKey, PathBuf) {
    let path = desktop.storage.join(key).join("paper.pdf");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"%PDF-1.7 original").unwrap();

    desktop
        .library
        .insert_item(&NewItem {
            key: ItemKey::new(format!("P{}", key)),
            kind: ItemKind::Regular,
            parent: None,
            title: "On Computable Numbers".to_string(),
            content_type: None,
            link_mode: None,
            path: None,
            bibliographic: Some(BibliographicInfo {
                title: "On Computable Numbers".to_string(),
                creators: vec!["Turing".to_string()],
                year: Some("1936".to_string()),
                publication: None,
            }),
        })
        .await
        .unwrap();

    let key = ItemKey::new(key);
    desktop
        .library
        .insert_item(&NewItem {
            key: key.clone(),
            kind: ItemKind::Attachment,
            parent: Some(ItemKey::new(format!("P{}", key))),
            title: "Full Text PDF".to_string(),
            content_type: Some("application/pdf".to_string()),
            link_mode: Some(LinkMode::ImportedFile),
            path: Some(path.clone()),
            bibliographic: None,
        })
        .await
        .unwrap();

    (key, path)
}

fn engine(desktop: &Desktop, mode: SyncMode) -> SyncEngine {
    let settings = SyncSettings::builder()
        .external_root(desktop.root.clone())
        .mode(mode)
        .rename_enabled(true)
        .rename_template("%a_%y")
        .subfolder_enabled(true)
        .subfolder_template("%a")
        .build()
        .unwrap();

    SyncEngine::new(
        settings,
        desktop.library.clone(),
        Arc::new(TokioFileSystem::new()),
    )
    .unwrap()
}

fn no_conflicts(_: &ConflictDescriptor) -> ConflictChoice {
    ConflictChoice::Skip
}

fn touch_later(path: &Path) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

fn external_file(root: &Path) -> PathBuf {
    root.join("Turing").join("Turing_1936.pdf")
}

#[tokio::test]
async fn test_copy_round_trip_on_disk() {
    let desktop = desktop().await;
    let (key, internal) = add_paper(&desktop, "ATT1").await;
    let engine = engine(&desktop, SyncMode::Copy);

    let sent = engine.send(&[key.clone()], None).await.unwrap();
    assert_eq!(sent.succeeded, vec![key.clone()]);

    let external = external_file(&desktop.root);
    assert_eq!(std::fs::read(&external).unwrap(), b"%PDF-1.7 original");
    assert!(internal.exists());
    assert_eq!(engine.state_of(&key).await.unwrap(), SyncState::OnExternal);
    assert!(desktop.library.sync_blob(&key).await.unwrap().is_some());

    let retrieved = engine.retrieve(&[key.clone()], &no_conflicts).await.unwrap();
    assert_eq!(retrieved.succeeded, vec![key.clone()]);

    assert!(!external.exists());
    assert!(!desktop.root.join("Turing").exists());
    assert!(desktop.root.exists());
    assert!(internal.exists());
    assert_eq!(engine.state_of(&key).await.unwrap(), SyncState::Untracked);
    assert!(desktop.library.sync_blob(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_move_round_trip_on_disk() {
    let desktop = desktop().await;
    let (key, internal) = add_paper(&desktop, "ATT1").await;
    let engine = engine(&desktop, SyncMode::Move);

    engine.send(&[key.clone()], None).await.unwrap();

    let external = external_file(&desktop.root);
    assert!(external.exists());
    assert!(!internal.exists());
    assert_eq!(
        desktop.library.content_path(&key).await.unwrap(),
        Some(external.clone())
    );
    assert_eq!(
        desktop.library.get_item(&key).await.unwrap().unwrap().link_mode,
        Some(LinkMode::LinkedFile)
    );

    engine.retrieve(&[key.clone()], &no_conflicts).await.unwrap();

    let restored = desktop.storage.join("ATT1").join("Turing_1936.pdf");
    assert!(restored.exists());
    assert!(!external.exists());
    assert_eq!(
        desktop.library.content_path(&key).await.unwrap(),
        Some(restored)
    );
    assert_eq!(
        desktop.library.get_item(&key).await.unwrap().unwrap().link_mode,
        Some(LinkMode::ImportedFile)
    );
}

#[tokio::test]
async fn test_external_file_vanishing_mid_pass_is_reported() {
    let desktop = desktop().await;
    let (key, internal) = add_paper(&desktop, "ATT1").await;
    let engine = engine(&desktop, SyncMode::Copy);
    engine.send(&[key.clone()], None).await.unwrap();

    let external = external_file(&desktop.root);
    touch_later(&external);
    touch_later(&internal);

    let delete_then_keep_external = |conflict: &ConflictDescriptor| {
        std::fs::remove_file(&conflict.external_path).unwrap();
        ConflictChoice::UseExternal
    };
    let summary = engine
        .retrieve(&[key.clone()], &delete_then_keep_external)
        .await
        .unwrap();

    assert!(summary.succeeded.is_empty());
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].kind, FileErrorKind::ExternalMissing);
    assert_eq!(std::fs::read(&internal).unwrap(), b"%PDF-1.7 original");

    // The next pass sees the file gone and stops tracking it.
    let summary = engine.retrieve(&[key.clone()], &no_conflicts).await.unwrap();
    assert_eq!(summary.cleaned, vec![key.clone()]);
    assert_eq!(engine.state_of(&key).await.unwrap(), SyncState::Untracked);
}
