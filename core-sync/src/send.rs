//! Send pass: copy or move attachments onto the external root

use bridge_traits::{ItemKey, LibraryTransaction, LinkMode};
use core_runtime::events::{SyncEvent, SyncPass};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::batch::run_batch;
use crate::engine::SyncEngine;
use crate::error::{FileError, Result, SyncError};
use crate::metadata_store::SyncMetadataStore;
use crate::naming::{render_file_name, render_subfolder};
use crate::paths::{extension_of, DestinationClaims};
use crate::state::{ExternalLocation, SyncMode, SyncRecord, SyncState};
use crate::summary::SyncSummary;

/// A file that reached the external root and still needs its record
#[derive(Debug)]
struct SentFile {
    key: ItemKey,
    display: String,
    source: PathBuf,
    destination: PathBuf,
    modified: i64,
}

impl SyncEngine {
    /// Send attachments to the external root
    ///
    /// Ineligible keys (see [`SyncEngine::validate_for_send`]) are skipped.
    /// Files land under the project folder when `project` names one.
    ///
    /// # Errors
    ///
    /// Fails before touching any file when the external root is not
    /// configured or the project label is unknown. Per-file failures are
    /// collected into the summary instead.
    #[instrument(skip(self, keys), fields(count = keys.len(), project = ?project))]
    pub async fn send(&self, keys: &[ItemKey], project: Option<&str>) -> Result<SyncSummary> {
        let root = self.root()?;
        let base_dir = match project {
            Some(label) => {
                let folder = self
                    .settings
                    .project_folder(label)
                    .ok_or_else(|| SyncError::UnknownProject(label.to_string()))?;
                root.join(&folder.path)
            }
            None => root.to_path_buf(),
        };

        let validation = self.validate_for_send(keys).await?;
        for (key, reason) in &validation.invalid {
            debug!(key = %key, reason = %reason, "Skipping file");
        }

        let total = validation.valid.len();
        let mut summary = SyncSummary::new(SyncPass::Send);
        self.emit(SyncEvent::PassStarted {
            pass: SyncPass::Send,
            total,
        });

        info!(
            "Phase 1: Transferring {} files ({} mode)",
            total, self.settings.mode
        );
        let claims = DestinationClaims::new();
        let engine = self;
        let claims = &claims;
        let base_dir = base_dir.as_path();
        let outcome = run_batch(
            validation.valid,
            self.settings.effective_concurrency(),
            move |key| engine.send_one(key, base_dir, claims),
            |completed, total| engine.report_progress(SyncPass::Send, completed, total),
        )
        .await;
        summary.errors.extend(outcome.errors);

        info!("Phase 2: Recording {} sent files", outcome.successes.len());
        for sent in outcome.successes {
            match self.record_sent(&sent, root, project).await {
                Ok(()) => summary.succeeded.push(sent.key),
                Err(e) => {
                    warn!(key = %sent.key, error = %e, "Failed to record sent file, undoing transfer");
                    self.undo_transfer(&sent).await;
                    summary
                        .errors
                        .push(FileError::from_sync_error(sent.key, sent.display, &e));
                }
            }
        }

        self.finish_pass(&summary);
        Ok(summary)
    }

    async fn send_one(
        &self,
        key: ItemKey,
        base_dir: &Path,
        claims: &DestinationClaims,
    ) -> std::result::Result<SentFile, FileError> {
        match self.transfer(&key, base_dir, claims).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                let name = self.display_name(&key).await;
                warn!(key = %key, file = %name, error = %e, "Failed to send file");
                Err(FileError::from_sync_error(key, name, &e))
            }
        }
    }

    async fn transfer(
        &self,
        key: &ItemKey,
        base_dir: &Path,
        claims: &DestinationClaims,
    ) -> Result<SentFile> {
        let source = self
            .library
            .content_path(key)
            .await?
            .ok_or_else(|| SyncError::SourceMissing(key.to_string()))?;

        if !self.fs.exists(&source).await? {
            return Err(SyncError::SourceMissing(
                strip_path(&source.to_string_lossy()).to_string(),
            ));
        }

        let source_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.pdf", key));

        let settings = &self.settings;
        let biblio = if settings.rename_enabled || settings.subfolder_enabled {
            self.library.parent_metadata(key).await?
        } else {
            None
        };

        let file_name = match (&biblio, settings.rename_enabled) {
            (Some(info), true) => {
                render_file_name(&settings.rename_template, info, &extension_of(&source))
                    .unwrap_or_else(|| source_name.clone())
            }
            _ => source_name,
        };

        let mut dir = base_dir.to_path_buf();
        if let (Some(info), true) = (&biblio, settings.subfolder_enabled) {
            let subfolder = render_subfolder(&settings.subfolder_template, info);
            if !subfolder.as_os_str().is_empty() {
                dir.push(subfolder);
            }
        }

        self.fs.create_dir_all(&dir).await?;
        let destination = claims.claim(self.fs.as_ref(), &dir, &file_name).await?;

        match settings.mode {
            SyncMode::Copy => self.fs.copy_file(&source, &destination).await?,
            SyncMode::Move => self.fs.move_file(&source, &destination).await?,
        }

        let modified = self.fs.modified_millis(&destination).await?;
        debug!(
            key = %key,
            file = %strip_path(&destination.to_string_lossy()),
            modified,
            "Transferred file"
        );

        Ok(SentFile {
            key: key.clone(),
            display: file_name,
            source,
            destination,
            modified,
        })
    }

    /// Write record, tracked marker and (Move mode) link in one transaction
    async fn record_sent(&self, sent: &SentFile, root: &Path, project: Option<&str>) -> Result<()> {
        let record = SyncRecord {
            location: ExternalLocation::from_path(&sent.destination, root),
            last_modified: sent.modified,
            mode: self.settings.mode,
            project_group: project.map(str::to_string),
        };

        let mut tx = self.library.begin_transaction().await?;
        if let Err(e) = self.stage_sent(tx.as_mut(), sent, &record).await {
            tx.rollback().await.ok();
            return Err(e);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn stage_sent(
        &self,
        tx: &mut (dyn LibraryTransaction + Send),
        sent: &SentFile,
        record: &SyncRecord,
    ) -> Result<()> {
        SyncMetadataStore::stage_set(tx, &sent.key, record).await?;
        self.markers
            .stage(tx, &sent.key, SyncState::OnExternal)
            .await?;

        if record.mode == SyncMode::Move {
            tx.relink(&sent.key, &sent.destination, LinkMode::LinkedFile)
                .await?;
        }
        Ok(())
    }

    /// Put things back after the record could not be written
    async fn undo_transfer(&self, sent: &SentFile) {
        let result = match self.settings.mode {
            SyncMode::Copy => self.fs.delete_file(&sent.destination).await,
            SyncMode::Move => self.fs.move_file(&sent.destination, &sent.source).await,
        };

        if let Err(e) = result {
            warn!(
                key = %sent.key,
                path = ?sent.destination,
                error = %e,
                "Failed to undo transfer"
            );
        }
    }
}
