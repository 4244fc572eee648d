//! # Sync Metadata Store
//!
//! Persists [`SyncRecord`]s in the host item's free-text sync blob as JSON:
//!
//! ```json
//! { "location": "[BaseFolder]/thesis/Turing_1936.pdf", "lastModified": 1700000000000,
//!   "mode": "copy", "projectGroup": "thesis" }
//! ```
//!
//! Unknown fields are ignored and optional fields default, so blobs written
//! by older or newer versions still load. A blob that cannot be parsed is
//! logged and treated as absent.

use bridge_traits::{ItemKey, LibraryStore, LibraryTransaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::state::{ExternalLocation, SyncMode, SyncRecord};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    location: String,
    last_modified: i64,
    #[serde(default)]
    mode: SyncMode,
    #[serde(default)]
    project_group: Option<String>,
}

/// Result of reading a record, distinguishing a missing blob from a broken one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    Found(SyncRecord),
    Absent,
    Corrupt,
}

impl RecordLookup {
    pub fn into_record(self) -> Option<SyncRecord> {
        match self {
            RecordLookup::Found(record) => Some(record),
            RecordLookup::Absent | RecordLookup::Corrupt => None,
        }
    }
}

pub fn encode_record(record: &SyncRecord) -> Result<String> {
    let stored = StoredRecord {
        location: record.location.encode(),
        last_modified: record.last_modified,
        mode: record.mode,
        project_group: record.project_group.clone(),
    };
    serde_json::to_string(&stored).map_err(|e| SyncError::Metadata(e.to_string()))
}

pub fn decode_record(blob: &str) -> Result<SyncRecord> {
    let stored: StoredRecord =
        serde_json::from_str(blob).map_err(|e| SyncError::Metadata(e.to_string()))?;

    if stored.location.trim().is_empty() {
        return Err(SyncError::Metadata("empty location".to_string()));
    }

    Ok(SyncRecord {
        location: ExternalLocation::decode(&stored.location),
        last_modified: stored.last_modified,
        mode: stored.mode,
        project_group: stored.project_group,
    })
}

/// Reads and writes sync records through the host library
#[derive(Clone)]
pub struct SyncMetadataStore {
    library: Arc<dyn LibraryStore>,
}

impl SyncMetadataStore {
    pub fn new(library: Arc<dyn LibraryStore>) -> Self {
        Self { library }
    }

    /// Read a record; read failures and malformed blobs are logged and absent
    pub async fn get(&self, key: &ItemKey) -> Option<SyncRecord> {
        match self.lookup(key).await {
            Ok(lookup) => lookup.into_record(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read sync metadata");
                None
            }
        }
    }

    /// Read a record, keeping host read failures separate from bad blobs
    pub async fn lookup(&self, key: &ItemKey) -> Result<RecordLookup> {
        let blob = match self.library.sync_blob(key).await? {
            Some(blob) if !blob.trim().is_empty() => blob,
            _ => return Ok(RecordLookup::Absent),
        };

        match decode_record(&blob) {
            Ok(record) => Ok(RecordLookup::Found(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring malformed sync metadata");
                Ok(RecordLookup::Corrupt)
            }
        }
    }

    /// Upsert a record in its own transaction
    pub async fn set(&self, key: &ItemKey, record: &SyncRecord) -> Result<()> {
        let mut tx = self.library.begin_transaction().await?;
        if let Err(e) = Self::stage_set(tx.as_mut(), key, record).await {
            tx.rollback().await.ok();
            return Err(e);
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove a record in its own transaction
    pub async fn clear(&self, key: &ItemKey) -> Result<()> {
        let mut tx = self.library.begin_transaction().await?;
        if let Err(e) = Self::stage_clear(tx.as_mut(), key).await {
            tx.rollback().await.ok();
            return Err(e);
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn stage_set(
        tx: &mut (dyn LibraryTransaction + Send),
        key: &ItemKey,
        record: &SyncRecord,
    ) -> Result<()> {
        let blob = encode_record(record)?;
        tx.set_sync_blob(key, &blob).await?;
        debug!(key = %key, "Staged sync record");
        Ok(())
    }

    pub async fn stage_clear(tx: &mut (dyn LibraryTransaction + Send), key: &ItemKey) -> Result<()> {
        tx.clear_sync_blob(key).await?;
        debug!(key = %key, "Staged sync record removal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record() -> SyncRecord {
        SyncRecord {
            location: ExternalLocation::Relative(PathBuf::from("thesis/Turing_1936.pdf")),
            last_modified: 1_700_000_000_000,
            mode: SyncMode::Move,
            project_group: Some("thesis".to_string()),
        }
    }

    #[test]
    fn test_encoded_field_names() {
        let json = encode_record(&record()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["location"], "[BaseFolder]/thesis/Turing_1936.pdf");
        assert_eq!(value["lastModified"], 1_700_000_000_000i64);
        assert_eq!(value["mode"], "move");
        assert_eq!(value["projectGroup"], "thesis");
        assert_eq!(decode_record(&json).unwrap(), record());
    }

    #[test]
    fn test_decode_tolerates_unknown_and_missing_optional_fields() {
        let blob = r#"{"location":"[BaseFolder]/a.pdf","lastModified":5,"color":"red"}"#;
        let decoded = decode_record(blob).unwrap();

        assert_eq!(decoded.mode, SyncMode::Copy);
        assert_eq!(decoded.project_group, None);
        assert_eq!(
            decoded.location,
            ExternalLocation::Relative(PathBuf::from("a.pdf"))
        );
    }

    #[test]
    fn test_decode_rejects_malformed_blobs() {
        assert!(decode_record("not json").is_err());
        assert!(decode_record(r#"{"location":"x.pdf"}"#).is_err());
        assert!(decode_record(r#"{"location":"","lastModified":1}"#).is_err());
    }
}
