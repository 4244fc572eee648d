//! Host Library Storage using SQLite
//!
//! A small self-contained reference library: items (regular items and their
//! attachments), tag-like markers, and a sync blob column per item. Desktop
//! hosts without their own item store use this to run the sync core.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    library::{
        BibliographicInfo, ItemInfo, ItemKey, ItemKind, LibraryStore, LibraryTransaction,
        LinkMode,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        key TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        parent_key TEXT REFERENCES items(key),
        title TEXT NOT NULL DEFAULT '',
        content_type TEXT,
        link_mode TEXT,
        path TEXT,
        creators TEXT NOT NULL DEFAULT '',
        year TEXT,
        publication TEXT,
        sync_blob TEXT,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_markers (
        item_key TEXT NOT NULL REFERENCES items(key),
        marker TEXT NOT NULL,
        PRIMARY KEY (item_key, marker)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_item_markers_marker ON item_markers(marker)",
];

/// Item to insert into the library
#[derive(Debug, Clone)]
pub struct NewItem {
    pub key: ItemKey,
    pub kind: ItemKind,
    pub parent: Option<ItemKey>,
    pub title: String,
    pub content_type: Option<String>,
    pub link_mode: Option<LinkMode>,
    pub path: Option<PathBuf>,
    pub bibliographic: Option<BibliographicInfo>,
}

/// SQLite-backed host library
///
/// Imported attachments live under `<storage_root>/<item key>/`.
pub struct SqliteLibraryStore {
    pool: SqlitePool,
    storage_root: PathBuf,
}

impl SqliteLibraryStore {
    /// Open (or create) a library database at the given path
    pub async fn new(db_path: PathBuf, storage_root: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // Convert path to string, replacing backslashes with forward slashes for SQLite URL
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool, storage_root };
        store.create_schema().await?;
        debug!(path = ?db_path, "Initialized library store");
        Ok(store)
    }

    /// Create an in-memory library (for testing)
    pub async fn in_memory(storage_root: PathBuf) -> Result<Self> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool, storage_root };
        store.create_schema().await?;
        Ok(store)
    }

    /// Default database location under the user's data directory
    pub fn default_database_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdfsync")
            .join("library.db")
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    async fn create_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    BridgeError::DatabaseError(format!("Failed to create schema: {}", e))
                })?;
        }
        Ok(())
    }

    /// Get the current Unix timestamp in milliseconds
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    /// Insert or replace an item
    pub async fn insert_item(&self, item: &NewItem) -> Result<()> {
        let biblio = item.bibliographic.clone().unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO items (key, kind, parent_key, title, content_type, link_mode, path,
                               creators, year, publication, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                kind = excluded.kind,
                parent_key = excluded.parent_key,
                title = excluded.title,
                content_type = excluded.content_type,
                link_mode = excluded.link_mode,
                path = excluded.path,
                creators = excluded.creators,
                year = excluded.year,
                publication = excluded.publication,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.key.as_str())
        .bind(kind_to_str(item.kind))
        .bind(item.parent.as_ref().map(|p| p.as_str().to_string()))
        .bind(&item.title)
        .bind(&item.content_type)
        .bind(item.link_mode.map(|m| m.as_str()))
        .bind(item.path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(biblio.creators.join("\n"))
        .bind(&biblio.year)
        .bind(&biblio.publication)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to insert item: {}", e)))?;

        debug!(key = %item.key, "Stored item");
        Ok(())
    }
}

fn kind_to_str(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Regular => "regular",
        ItemKind::Attachment => "attachment",
        ItemKind::Note => "note",
    }
}

fn kind_from_str(value: &str) -> Result<ItemKind> {
    match value {
        "regular" => Ok(ItemKind::Regular),
        "attachment" => Ok(ItemKind::Attachment),
        "note" => Ok(ItemKind::Note),
        other => Err(BridgeError::DatabaseError(format!(
            "Unknown item kind: {}",
            other
        ))),
    }
}

#[async_trait]
impl LibraryStore for SqliteLibraryStore {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<ItemInfo>> {
        let row = sqlx::query(
            "SELECT kind, parent_key, title, content_type, link_mode FROM items WHERE key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to get item: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.get(0);
        let parent: Option<String> = row.get(1);
        let link_mode: Option<String> = row.get(4);

        Ok(Some(ItemInfo {
            key: key.clone(),
            kind: kind_from_str(&kind)?,
            parent: parent.map(ItemKey::new),
            title: row.get(2),
            content_type: row.get(3),
            link_mode: link_mode.as_deref().and_then(LinkMode::parse),
        }))
    }

    async fn parent_metadata(&self, key: &ItemKey) -> Result<Option<BibliographicInfo>> {
        let row = sqlx::query(
            r#"
            SELECT p.title, p.creators, p.year, p.publication
            FROM items c JOIN items p ON p.key = c.parent_key
            WHERE c.key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to get parent: {}", e)))?;

        Ok(row.map(|row| {
            let creators: String = row.get(1);
            BibliographicInfo {
                title: row.get(0),
                creators: creators
                    .lines()
                    .filter(|c| !c.trim().is_empty())
                    .map(str::to_string)
                    .collect(),
                year: row.get(2),
                publication: row.get(3),
            }
        }))
    }

    async fn content_path(&self, key: &ItemKey) -> Result<Option<PathBuf>> {
        let row = sqlx::query("SELECT path FROM items WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get path: {}", e)))?;

        Ok(row
            .and_then(|row| row.get::<Option<String>, _>(0))
            .map(PathBuf::from))
    }

    async fn storage_directory(&self, key: &ItemKey) -> Result<PathBuf> {
        Ok(self.storage_root.join(key.as_str()))
    }

    async fn sync_blob(&self, key: &ItemKey) -> Result<Option<String>> {
        let row = sqlx::query("SELECT sync_blob FROM items WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get sync blob: {}", e)))?;

        Ok(row.and_then(|row| row.get::<Option<String>, _>(0)))
    }

    async fn markers(&self, key: &ItemKey) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT marker FROM item_markers WHERE item_key = ? ORDER BY marker")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to list markers: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn items_with_marker(&self, marker: &str) -> Result<Vec<ItemKey>> {
        let rows = sqlx::query("SELECT item_key FROM item_markers WHERE marker = ? ORDER BY item_key")
            .bind(marker)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to query markers: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| ItemKey::new(row.get::<String, _>(0)))
            .collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn LibraryTransaction + Send>> {
        let tx = self.pool.begin().await.map_err(|e| {
            BridgeError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(SqliteLibraryTransaction { tx: Some(tx) }))
    }
}

/// SQLite library transaction
struct SqliteLibraryTransaction {
    tx: Option<sqlx::Transaction<'static, sqlx::Sqlite>>,
}

impl SqliteLibraryTransaction {
    fn tx(&mut self) -> Result<&mut sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.tx.as_mut().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already committed".to_string())
        })
    }
}

#[async_trait]
impl LibraryTransaction for SqliteLibraryTransaction {
    async fn set_sync_blob(&mut self, key: &ItemKey, blob: &str) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query("UPDATE items SET sync_blob = ?, updated_at = ? WHERE key = ?")
            .bind(blob)
            .bind(SqliteLibraryStore::now())
            .bind(key.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to set sync blob: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn clear_sync_blob(&mut self, key: &ItemKey) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query("UPDATE items SET sync_blob = NULL, updated_at = ? WHERE key = ?")
            .bind(SqliteLibraryStore::now())
            .bind(key.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                BridgeError::DatabaseError(format!("Failed to clear sync blob: {}", e))
            })?;
        Ok(())
    }

    async fn add_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query("INSERT OR IGNORE INTO item_markers (item_key, marker) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(marker)
            .execute(&mut **tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to add marker: {}", e)))?;
        Ok(())
    }

    async fn remove_marker(&mut self, key: &ItemKey, marker: &str) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query("DELETE FROM item_markers WHERE item_key = ? AND marker = ?")
            .bind(key.as_str())
            .bind(marker)
            .execute(&mut **tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to remove marker: {}", e)))?;
        Ok(())
    }

    async fn relink(&mut self, key: &ItemKey, path: &Path, link_mode: LinkMode) -> Result<()> {
        let tx = self.tx()?;
        let result =
            sqlx::query("UPDATE items SET path = ?, link_mode = ?, updated_at = ? WHERE key = ?")
                .bind(path.to_string_lossy().into_owned())
                .bind(link_mode.as_str())
                .bind(SqliteLibraryStore::now())
                .bind(key.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(format!("Failed to relink: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(key.to_string()));
        }
        debug!(key = %key, path = ?path, "Relinked attachment");
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already committed".to_string())
        })?;

        tx.commit()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to commit: {}", e)))?;

        debug!("Committed library transaction");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already committed".to_string())
        })?;

        tx.rollback()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to rollback: {}", e)))?;

        debug!("Rolled back library transaction");
        Ok(())
    }
}
