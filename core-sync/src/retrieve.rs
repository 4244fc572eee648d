//! Retrieve pass: bring external files back into the library
//!
//! Runs in three phases. Gathering reads records and mtimes in parallel
//! without side effects. Conflict resolution asks the resolver about each
//! conflicting file, one at a time. Applying performs the file I/O in
//! parallel, then commits all metadata changes in a single transaction and
//! cleans up the external root. External copies of relinked files are only
//! removed once the new link is committed.

use bridge_traits::{BridgeError, ItemKey, LinkMode};
use core_runtime::events::{SyncEvent, SyncPass};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::batch::run_batch;
use crate::conflict::{ConflictChoice, ConflictDescriptor, ConflictResolver};
use crate::engine::SyncEngine;
use crate::error::{FileError, FileErrorKind, Result, SyncError};
use crate::metadata_store::{RecordLookup, SyncMetadataStore};
use crate::paths::{prune_empty_ancestors, DestinationClaims};
use crate::state::{SyncMode, SyncState};
use crate::summary::SyncSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupReason {
    NoRecord,
    Corrupt,
    ExternalMissing,
}

#[derive(Debug)]
struct RetrieveJob {
    key: ItemKey,
    display: String,
    mode: SyncMode,
    external: PathBuf,
    /// Existing library copy (Copy mode only)
    internal: Option<PathBuf>,
    external_mtime: i64,
    internal_mtime: Option<i64>,
    last_synced: i64,
    external_modified: bool,
    internal_modified: bool,
}

impl RetrieveJob {
    fn is_conflict(&self) -> bool {
        self.mode == SyncMode::Copy && self.external_modified && self.internal_modified
    }
}

#[derive(Debug)]
enum Gathered {
    Cleanup { key: ItemKey, reason: CleanupReason },
    Ready(RetrieveJob),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Overwrite (or recreate) the library copy from the external file
    CopyBack,
    /// Library copy wins; only the external copy is removed
    KeepInternal,
    /// Move the canonical external file into library storage
    MoveBack,
}

#[derive(Debug)]
struct Applied {
    key: ItemKey,
    external: PathBuf,
    remove_external: bool,
    /// New imported-file path when the item has to be relinked
    relink: Option<PathBuf>,
}

/// The external file may vanish between gathering and applying
fn external_error(error: BridgeError, path: &Path) -> SyncError {
    if error.is_not_found() {
        SyncError::ExternalMissing(strip_path(&path.to_string_lossy()).to_string())
    } else {
        error.into()
    }
}

impl SyncEngine {
    /// Retrieve tracked files from the external root
    ///
    /// Untracked keys are skipped. Files whose record or external copy has
    /// vanished are cleaned up and reported in [`SyncSummary::cleaned`].
    #[instrument(skip(self, keys, resolver), fields(count = keys.len()))]
    pub async fn retrieve(
        &self,
        keys: &[ItemKey],
        resolver: &dyn ConflictResolver,
    ) -> Result<SyncSummary> {
        let root = self.root()?;
        let validation = self.validate_for_get(keys).await?;
        for (key, reason) in &validation.invalid {
            debug!(key = %key, reason = %reason, "Skipping file");
        }

        let mut summary = SyncSummary::new(SyncPass::Retrieve);
        self.emit(SyncEvent::PassStarted {
            pass: SyncPass::Retrieve,
            total: validation.valid.len(),
        });

        info!("Phase 1: Gathering {} tracked files", validation.valid.len());
        let engine = self;
        let gathered = run_batch(
            validation.valid,
            self.settings.effective_concurrency(),
            move |key| engine.gather(key, root),
            |_, _| {},
        )
        .await;
        summary.errors.extend(gathered.errors);

        let mut cleanups: Vec<(ItemKey, CleanupReason)> = Vec::new();
        let mut ready: Vec<RetrieveJob> = Vec::new();
        for item in gathered.successes {
            match item {
                Gathered::Cleanup { key, reason } => cleanups.push((key, reason)),
                Gathered::Ready(job) => ready.push(job),
            }
        }

        info!("Phase 2: Resolving conflicts");
        let mut jobs: Vec<(RetrieveJob, Action)> = Vec::with_capacity(ready.len());
        for job in ready {
            let action = if job.mode == SyncMode::Move {
                Action::MoveBack
            } else if job.is_conflict() {
                match self.resolve_conflict(&job, resolver).await {
                    Some(action) => action,
                    None => {
                        summary.errors.push(FileError::new(
                            job.key,
                            job.display,
                            FileErrorKind::ConflictUnresolved,
                        ));
                        continue;
                    }
                }
            } else if job.external_modified || job.internal.is_none() {
                Action::CopyBack
            } else {
                Action::KeepInternal
            };
            jobs.push((job, action));
        }

        info!("Phase 3: Applying {} files", jobs.len());
        let claims = DestinationClaims::new();
        let claims = &claims;
        let applied = run_batch(
            jobs,
            self.settings.effective_concurrency(),
            move |(job, action)| engine.apply(job, action, claims),
            |completed, total| engine.report_progress(SyncPass::Retrieve, completed, total),
        )
        .await;
        summary.errors.extend(applied.errors);

        // Relinked files keep their external copy until the link is committed.
        let (relinked, in_place): (Vec<&Applied>, Vec<&Applied>) = applied
            .successes
            .iter()
            .partition(|file| file.relink.is_some());
        for file in &in_place {
            self.clean_external(file, root).await;
        }

        if let Err(e) = self.commit_retrieved(&applied.successes, &cleanups).await {
            warn!(error = %e, "Failed to commit retrieve metadata, undoing transfers");
            for file in &relinked {
                self.undo_retrieved(file).await;
            }
            return Err(e);
        }

        for file in &relinked {
            self.clean_external(file, root).await;
        }

        summary.succeeded = applied.successes.into_iter().map(|file| file.key).collect();
        for (key, reason) in cleanups {
            match reason {
                CleanupReason::Corrupt => {
                    let name = self.display_name(&key).await;
                    summary
                        .errors
                        .push(FileError::new(key, name, FileErrorKind::MetadataCorrupt));
                }
                CleanupReason::NoRecord | CleanupReason::ExternalMissing => {
                    summary.cleaned.push(key)
                }
            }
        }

        self.extract_annotations(&summary.succeeded).await;
        self.finish_pass(&summary);
        Ok(summary)
    }

    async fn gather(
        &self,
        key: ItemKey,
        root: &Path,
    ) -> std::result::Result<Gathered, FileError> {
        match self.gather_inner(&key, root).await {
            Ok(gathered) => Ok(gathered),
            Err(e) => {
                let name = self.display_name(&key).await;
                warn!(key = %key, file = %name, error = %e, "Failed to inspect tracked file");
                Err(FileError::from_sync_error(key, name, &e))
            }
        }
    }

    async fn gather_inner(&self, key: &ItemKey, root: &Path) -> Result<Gathered> {
        let record = match self.metadata.lookup(key).await? {
            RecordLookup::Found(record) => record,
            RecordLookup::Absent => {
                return Ok(Gathered::Cleanup {
                    key: key.clone(),
                    reason: CleanupReason::NoRecord,
                })
            }
            RecordLookup::Corrupt => {
                return Ok(Gathered::Cleanup {
                    key: key.clone(),
                    reason: CleanupReason::Corrupt,
                })
            }
        };

        let external = record.location.resolve(root);
        if !self.fs.exists(&external).await? {
            debug!(key = %key, path = ?external, "External file is gone");
            return Ok(Gathered::Cleanup {
                key: key.clone(),
                reason: CleanupReason::ExternalMissing,
            });
        }

        let external_mtime = self.fs.modified_millis(&external).await?;

        // Move mode has a single canonical file, so only Copy mode can see
        // an internal modification.
        let (internal, internal_mtime) = match record.mode {
            SyncMode::Copy => match self.library.content_path(key).await? {
                Some(path) if self.fs.exists(&path).await? => {
                    let mtime = self.fs.modified_millis(&path).await?;
                    (Some(path), Some(mtime))
                }
                _ => (None, None),
            },
            SyncMode::Move => (None, None),
        };

        let file_name = external
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());

        Ok(Gathered::Ready(RetrieveJob {
            key: key.clone(),
            display: file_name,
            mode: record.mode,
            external_modified: external_mtime > record.last_modified,
            internal_modified: internal_mtime.is_some_and(|mtime| mtime > record.last_modified),
            external,
            internal,
            external_mtime,
            internal_mtime,
            last_synced: record.last_modified,
        }))
    }

    /// Ask the resolver; `None` means skip
    async fn resolve_conflict(
        &self,
        job: &RetrieveJob,
        resolver: &dyn ConflictResolver,
    ) -> Option<Action> {
        let internal_path = job.internal.clone()?;
        let descriptor = ConflictDescriptor {
            key: job.key.clone(),
            filename: job.display.clone(),
            internal_path,
            external_path: job.external.clone(),
            internal_modified: job.internal_mtime.unwrap_or_default(),
            external_modified: job.external_mtime,
            last_synced: job.last_synced,
        };

        self.emit(SyncEvent::ConflictDetected {
            key: job.key.to_string(),
            filename: job.display.clone(),
        });

        let choice = resolver.resolve(&descriptor).await;
        info!(key = %job.key, choice = ?choice, "Conflict resolved");

        match choice {
            ConflictChoice::UseExternal => Some(Action::CopyBack),
            ConflictChoice::UseInternal => Some(Action::KeepInternal),
            ConflictChoice::Skip => None,
        }
    }

    async fn apply(
        &self,
        job: RetrieveJob,
        action: Action,
        claims: &DestinationClaims,
    ) -> std::result::Result<Applied, FileError> {
        match self.apply_inner(&job, action, claims).await {
            Ok(applied) => Ok(applied),
            Err(e) => {
                warn!(key = %job.key, file = %job.display, error = %e, "Failed to retrieve file");
                Err(FileError::from_sync_error(job.key, job.display, &e))
            }
        }
    }

    async fn apply_inner(
        &self,
        job: &RetrieveJob,
        action: Action,
        claims: &DestinationClaims,
    ) -> Result<Applied> {
        let mut applied = Applied {
            key: job.key.clone(),
            external: job.external.clone(),
            remove_external: true,
            relink: None,
        };

        match (action, &job.internal) {
            (Action::CopyBack, Some(internal)) => {
                self.fs
                    .copy_file(&job.external, internal)
                    .await
                    .map_err(|e| external_error(e, &job.external))?;
            }
            (Action::CopyBack, None) => {
                let destination = self.storage_destination(job, claims).await?;
                self.fs
                    .copy_file(&job.external, &destination)
                    .await
                    .map_err(|e| external_error(e, &job.external))?;
                applied.relink = Some(destination);
            }
            (Action::KeepInternal, _) => {}
            (Action::MoveBack, _) => {
                let destination = self.storage_destination(job, claims).await?;
                self.fs
                    .move_file(&job.external, &destination)
                    .await
                    .map_err(|e| external_error(e, &job.external))?;
                applied.remove_external = false;
                applied.relink = Some(destination);
            }
        }

        debug!(
            key = %job.key,
            file = %strip_path(&job.external.to_string_lossy()),
            action = ?action,
            "Retrieved file"
        );
        Ok(applied)
    }

    /// Free path inside the item's library storage directory
    async fn storage_destination(
        &self,
        job: &RetrieveJob,
        claims: &DestinationClaims,
    ) -> Result<PathBuf> {
        let dir = self.library.storage_directory(&job.key).await?;
        self.fs.create_dir_all(&dir).await?;
        claims.claim(self.fs.as_ref(), &dir, &job.display).await
    }

    /// Remove the redundant external copy and prune empty folders; best effort
    async fn clean_external(&self, file: &Applied, root: &Path) {
        if file.remove_external {
            if let Err(e) = self.fs.delete_file(&file.external).await {
                if !e.is_not_found() {
                    warn!(path = ?file.external, error = %e, "Failed to delete external copy");
                }
            }
        }

        if let Some(parent) = file.external.parent() {
            prune_empty_ancestors(self.fs.as_ref(), parent, root).await;
        }
    }

    /// Drop the new library copy; a moved file goes back to the external root
    async fn undo_retrieved(&self, file: &Applied) {
        let Some(copy) = &file.relink else {
            return;
        };

        let result = if file.remove_external {
            self.fs.delete_file(copy).await
        } else {
            self.fs.move_file(copy, &file.external).await
        };

        if let Err(e) = result {
            warn!(
                key = %file.key,
                path = ?copy,
                error = %e,
                "Failed to undo retrieve"
            );
        }
    }

    /// Clear records and markers of every retrieved or cleaned file at once
    async fn commit_retrieved(
        &self,
        applied: &[Applied],
        cleanups: &[(ItemKey, CleanupReason)],
    ) -> Result<()> {
        if applied.is_empty() && cleanups.is_empty() {
            return Ok(());
        }

        let mut tx = self.library.begin_transaction().await?;
        let staged = async {
            for file in applied {
                SyncMetadataStore::stage_clear(tx.as_mut(), &file.key).await?;
                self.markers
                    .stage(tx.as_mut(), &file.key, SyncState::Untracked)
                    .await?;
                if let Some(path) = &file.relink {
                    tx.relink(&file.key, path, LinkMode::ImportedFile).await?;
                }
            }

            for (key, _) in cleanups {
                SyncMetadataStore::stage_clear(tx.as_mut(), key).await?;
                self.markers
                    .stage(tx.as_mut(), key, SyncState::Untracked)
                    .await?;
            }
            Ok::<(), SyncError>(())
        }
        .await;

        if let Err(e) = staged {
            tx.rollback().await.ok();
            return Err(e);
        }

        tx.commit().await?;
        info!(
            retrieved = applied.len(),
            cleaned = cleanups.len(),
            "Committed retrieve metadata"
        );
        Ok(())
    }

    async fn extract_annotations(&self, keys: &[ItemKey]) {
        if !self.settings.extract_on_sync || keys.is_empty() {
            return;
        }

        let Some(extractor) = &self.extractor else {
            debug!("Annotation extraction enabled but no extractor is configured");
            return;
        };

        match extractor.extract_annotations(keys).await {
            Ok(count) => info!(files = keys.len(), annotations = count, "Extracted annotations"),
            Err(e) => warn!(error = %e, "Annotation extraction failed"),
        }
    }
}
