//! # Sync Engine
//!
//! Orchestrates send, retrieve and modification checks between the host
//! library and the external root.
//!
//! ## Workflow
//!
//! Every pass follows the same shape:
//! 1. Validate the selection against the current sync state
//! 2. Run file operations through the batch executor (parallel, bounded)
//! 3. Write records and markers in host transactions (sequential)
//! 4. Publish a summary on the event bus
//!
//! File operations always complete before any metadata write, so a crash
//! leaves files in place with stale metadata, which the next check or
//! retrieve observes and repairs.
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::SyncEngine;
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(settings, library, Arc::new(TokioFileSystem::new()))?
//!     .with_event_bus(event_bus.clone());
//!
//! let summary = engine.send(&keys, None).await?;
//! println!("{}", summary.message(5));
//! ```

use bridge_traits::{AnnotationExtractor, FileSystemAccess, ItemKey, LibraryStore};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, ReadingListEvent, SyncEvent, SyncPass};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::batch::run_batch;
use crate::error::{Result, SyncError};
use crate::metadata_store::{RecordLookup, SyncMetadataStore};
use crate::state::{StateMarkers, SyncRecord, SyncState};
use crate::status::FileStatus;
use crate::summary::{CheckSummary, SyncSummary, DEFAULT_MESSAGE_LIMIT};

/// Content type accepted for sending
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Why an item cannot take part in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NotFound,
    NotAnAttachment,
    UnsupportedType,
    AlreadyTracked,
    NotTracked,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidReason::NotFound => "item not found",
            InvalidReason::NotAnAttachment => "not a child attachment",
            InvalidReason::UnsupportedType => "not a PDF file",
            InvalidReason::AlreadyTracked => "already on the external folder",
            InvalidReason::NotTracked => "not on the external folder",
        };
        f.write_str(text)
    }
}

/// Partition of a selection into eligible and rejected items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub valid: Vec<ItemKey>,
    pub invalid: Vec<(ItemKey, InvalidReason)>,
}

/// A tracked file as listed by [`SyncEngine::tracked_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub key: ItemKey,
    pub state: SyncState,
    /// `None` when the record is missing or unreadable
    pub record: Option<SyncRecord>,
    /// External path resolved against the current root
    pub external_path: Option<PathBuf>,
}

/// Result of looking at one tracked file during a check
struct Observation {
    key: ItemKey,
    state: SyncState,
    /// `None` when the file carries the tracked marker but has no record
    modified: Option<bool>,
}

/// PDF sync engine
///
/// Holds no global state; hosts create one per library and external root.
pub struct SyncEngine {
    pub(crate) settings: SyncSettings,
    pub(crate) library: Arc<dyn LibraryStore>,
    pub(crate) fs: Arc<dyn FileSystemAccess>,
    pub(crate) metadata: SyncMetadataStore,
    pub(crate) markers: StateMarkers,
    events: Option<EventBus>,
    pub(crate) extractor: Option<Arc<dyn AnnotationExtractor>>,
}

impl SyncEngine {
    /// Create an engine; fails when the settings do not validate
    pub fn new(
        settings: SyncSettings,
        library: Arc<dyn LibraryStore>,
        fs: Arc<dyn FileSystemAccess>,
    ) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            markers: StateMarkers::new(&settings.markers),
            metadata: SyncMetadataStore::new(Arc::clone(&library)),
            settings,
            library,
            fs,
            events: None,
            extractor: None,
        })
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Forward retrieved files for annotation import when `extract_on_sync` is set
    pub fn with_annotation_extractor(mut self, extractor: Arc<dyn AnnotationExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn metadata(&self) -> &SyncMetadataStore {
        &self.metadata
    }

    pub(crate) fn root(&self) -> Result<&Path> {
        self.settings
            .root()
            .map(PathBuf::as_path)
            .ok_or(SyncError::ExternalRootNotConfigured)
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Sync(event)).ok();
        }
    }

    pub(crate) fn report_progress(&self, pass: SyncPass, completed: usize, total: usize) {
        self.emit(SyncEvent::Progress {
            pass,
            completed,
            total,
        });
    }

    pub(crate) fn finish_pass(&self, summary: &SyncSummary) {
        let message = summary.message(DEFAULT_MESSAGE_LIMIT);
        info!(
            pass = %summary.pass,
            succeeded = summary.succeeded.len(),
            cleaned = summary.cleaned.len(),
            failed = summary.errors.len(),
            "{}",
            message
        );

        self.emit(SyncEvent::PassCompleted {
            pass: summary.pass,
            succeeded: summary.succeeded.len(),
            cleaned: summary.cleaned.len(),
            failed: summary.errors.len(),
            message,
        });
    }

    /// Best human-readable name for an item: its file name, then its title
    pub(crate) async fn display_name(&self, key: &ItemKey) -> String {
        if let Ok(Some(path)) = self.library.content_path(key).await {
            if let Some(name) = path.file_name() {
                return name.to_string_lossy().into_owned();
            }
        }

        match self.library.get_item(key).await {
            Ok(Some(item)) if !item.title.is_empty() => item.title,
            _ => key.to_string(),
        }
    }

    /// Current sync state of an item, decoded from its markers
    pub async fn state_of(&self, key: &ItemKey) -> Result<SyncState> {
        let markers = self.library.markers(key).await?;
        Ok(self.markers.decode(&markers))
    }

    /// Check which items may be sent
    ///
    /// Eligible items are existing child attachments with PDF content that
    /// are not tracked yet. Duplicate keys are dropped.
    pub async fn validate_for_send(&self, keys: &[ItemKey]) -> Result<Validation> {
        let mut validation = Validation::default();

        for key in dedupe(keys) {
            let Some(item) = self.library.get_item(&key).await? else {
                validation.invalid.push((key, InvalidReason::NotFound));
                continue;
            };

            if !item.is_attachment() || item.is_top_level() {
                validation.invalid.push((key, InvalidReason::NotAnAttachment));
                continue;
            }

            let is_pdf = item
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE));
            let has_file = !matches!(item.link_mode, Some(bridge_traits::LinkMode::LinkedUrl));
            if !is_pdf || !has_file {
                validation.invalid.push((key, InvalidReason::UnsupportedType));
                continue;
            }

            if self.state_of(&key).await?.is_tracked() {
                validation.invalid.push((key, InvalidReason::AlreadyTracked));
                continue;
            }

            validation.valid.push(key);
        }

        Ok(validation)
    }

    /// Check which items may be retrieved: anything currently tracked
    pub async fn validate_for_get(&self, keys: &[ItemKey]) -> Result<Validation> {
        let mut validation = Validation::default();

        for key in dedupe(keys) {
            if self.state_of(&key).await?.is_tracked() {
                validation.valid.push(key);
            } else {
                validation.invalid.push((key, InvalidReason::NotTracked));
            }
        }

        Ok(validation)
    }

    /// Compare every tracked file against its recorded mtime
    #[instrument(skip(self))]
    pub async fn check_modifications(&self) -> Result<CheckSummary> {
        let keys = self.library.items_with_marker(self.markers.tracked()).await?;
        self.check_keys(keys).await
    }

    /// Same check restricted to a selection; untracked keys are ignored
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn check_modifications_for(&self, keys: &[ItemKey]) -> Result<CheckSummary> {
        let validation = self.validate_for_get(keys).await?;
        self.check_keys(validation.valid).await
    }

    async fn check_keys(&self, keys: Vec<ItemKey>) -> Result<CheckSummary> {
        let root = self.root()?;
        let total = keys.len();
        self.emit(SyncEvent::PassStarted {
            pass: SyncPass::Check,
            total,
        });

        info!("Phase 1: Observing {} tracked files", total);
        let engine = self;
        let outcome = run_batch(
            keys,
            self.settings.effective_concurrency(),
            move |key| engine.observe(key, root),
            |completed, total| engine.report_progress(SyncPass::Check, completed, total),
        )
        .await;

        for (key, error) in &outcome.errors {
            warn!(key = %key, error = %error, "Failed to check file");
        }

        info!("Phase 2: Updating markers");
        let mut summary = CheckSummary::default();
        let mut changes: Vec<(ItemKey, SyncState, bool)> = Vec::new();

        for observation in outcome.successes {
            match observation.modified {
                None => {
                    warn!(key = %observation.key, "Tracked file has no sync record, clearing markers");
                    summary.orphaned += 1;
                    changes.push((observation.key, SyncState::Untracked, true));
                }
                Some(modified) => {
                    summary.checked += 1;
                    match (observation.state, modified) {
                        (SyncState::OnExternal, true) => {
                            summary.newly_modified += 1;
                            changes.push((observation.key, SyncState::OnExternalModified, false));
                        }
                        (SyncState::OnExternalModified, false) => {
                            summary.reverted += 1;
                            changes.push((observation.key, SyncState::OnExternal, false));
                        }
                        _ => {}
                    }
                }
            }
        }

        if !changes.is_empty() {
            let mut tx = self.library.begin_transaction().await?;
            for (key, state, clear_record) in &changes {
                let staged = async {
                    if *clear_record {
                        SyncMetadataStore::stage_clear(tx.as_mut(), key).await?;
                    }
                    self.markers.stage(tx.as_mut(), key, *state).await
                }
                .await;

                if let Err(e) = staged {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
            tx.commit().await?;
        }

        info!(
            checked = summary.checked,
            newly_modified = summary.newly_modified,
            reverted = summary.reverted,
            orphaned = summary.orphaned,
            "{}",
            summary.message()
        );
        self.emit(SyncEvent::PassCompleted {
            pass: SyncPass::Check,
            succeeded: summary.checked,
            cleaned: summary.orphaned,
            failed: outcome.errors.len(),
            message: summary.message(),
        });

        Ok(summary)
    }

    async fn observe(
        &self,
        key: ItemKey,
        root: &Path,
    ) -> std::result::Result<Observation, (ItemKey, SyncError)> {
        match self.observe_inner(&key, root).await {
            Ok((state, modified)) => Ok(Observation {
                key,
                state,
                modified,
            }),
            Err(e) => Err((key, e)),
        }
    }

    async fn observe_inner(&self, key: &ItemKey, root: &Path) -> Result<(SyncState, Option<bool>)> {
        let state = self.state_of(key).await?;

        let record = match self.metadata.lookup(key).await? {
            RecordLookup::Found(record) => record,
            RecordLookup::Absent | RecordLookup::Corrupt => return Ok((state, None)),
        };

        let external = record.location.resolve(root);
        let modified = if self.fs.exists(&external).await? {
            self.fs.modified_millis(&external).await? > record.last_modified
        } else {
            false
        };

        debug!(key = %key, modified, "Observed external file");
        Ok((state, Some(modified)))
    }

    /// Put the top-level items of `keys` on the reading list
    ///
    /// Returns how many items changed.
    pub async fn add_to_reading_list(&self, keys: &[ItemKey]) -> Result<usize> {
        self.update_reading_list(keys, true).await
    }

    pub async fn remove_from_reading_list(&self, keys: &[ItemKey]) -> Result<usize> {
        self.update_reading_list(keys, false).await
    }

    async fn update_reading_list(&self, keys: &[ItemKey], add: bool) -> Result<usize> {
        let reading = self.settings.markers.reading.as_str();
        let mut targets: Vec<ItemKey> = Vec::new();

        for key in dedupe(keys) {
            let Some(item) = self.library.get_item(&key).await? else {
                warn!(key = %key, "Unknown item, skipping reading list update");
                continue;
            };

            let top = item.top_level_key().clone();
            if targets.contains(&top) {
                continue;
            }
            if self.library.has_marker(&top, reading).await? != add {
                targets.push(top);
            }
        }

        if targets.is_empty() {
            return Ok(0);
        }

        let mut tx = self.library.begin_transaction().await?;
        for key in &targets {
            let staged = if add {
                tx.add_marker(key, reading).await
            } else {
                tx.remove_marker(key, reading).await
            };

            if let Err(e) = staged {
                tx.rollback().await.ok();
                return Err(e.into());
            }
        }
        tx.commit().await?;

        info!(count = targets.len(), add, "Updated reading list");
        if let Some(events) = &self.events {
            events
                .emit(CoreEvent::ReadingList(ReadingListEvent::Changed {
                    added: add,
                    keys: targets.iter().map(ToString::to_string).collect(),
                }))
                .ok();
        }

        Ok(targets.len())
    }

    /// Every tracked file with its decoded state and record
    pub async fn tracked_files(&self) -> Result<Vec<TrackedFile>> {
        let root = self.settings.root().cloned();
        let keys = self.library.items_with_marker(self.markers.tracked()).await?;
        let mut files = Vec::with_capacity(keys.len());

        for key in keys {
            let state = self.state_of(&key).await?;
            let record = self.metadata.get(&key).await;
            let external_path = match (&record, &root) {
                (Some(record), Some(root)) => Some(record.location.resolve(root)),
                _ => None,
            };

            files.push(TrackedFile {
                key,
                state,
                record,
                external_path,
            });
        }

        Ok(files)
    }

    /// Status badge of an item, including its parent's reading marker
    pub async fn status_of(&self, key: &ItemKey) -> Result<FileStatus> {
        let Some(item) = self.library.get_item(key).await? else {
            return Ok(FileStatus::None);
        };

        let mut markers = self.library.markers(key).await?;
        if let Some(parent) = &item.parent {
            markers.extend(self.library.markers(parent).await?);
        }

        Ok(FileStatus::project(&markers, &self.settings.markers))
    }
}

/// Keep the first occurrence of every key
pub(crate) fn dedupe(keys: &[ItemKey]) -> Vec<ItemKey> {
    let mut seen = HashSet::new();
    keys.iter()
        .filter(|key| seen.insert((*key).clone()))
        .cloned()
        .collect()
}
