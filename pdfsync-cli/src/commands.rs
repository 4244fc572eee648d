//! Command implementations

use anyhow::{bail, Context, Result};
use bridge_desktop::{NewItem, SqliteLibraryStore, TokioFileSystem};
use bridge_traits::{BibliographicInfo, FileSystemAccess, ItemKey, ItemKind, LinkMode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
use core_sync::{SyncEngine, DEFAULT_MESSAGE_LIMIT, PDF_CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::{Command, GlobalArgs, ReadingAction};
use crate::prompt::{CliResolver, Prompt};

const CONFIG_FILE: &str = "config.toml";

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pdfsync").join(CONFIG_FILE))
}

fn config_path(global: &GlobalArgs) -> Option<PathBuf> {
    global.config.clone().or_else(default_config_path)
}

/// Load settings from `--config`, the default location, or built-in defaults
pub async fn load_settings(global: &GlobalArgs) -> Result<SyncSettings> {
    let fs = TokioFileSystem::new();
    let path = match &global.config {
        Some(path) => Some(path.clone()),
        None => match default_config_path() {
            Some(path) if fs.exists(&path).await? => Some(path),
            _ => None,
        },
    };

    let mut settings = match path {
        Some(path) => {
            let bytes = fs
                .read_file(&path)
                .await
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let source = String::from_utf8(bytes.to_vec())
                .with_context(|| format!("Settings file {} is not UTF-8", path.display()))?;
            debug!(path = ?path, "Loaded settings");
            SyncSettings::from_toml(&source)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        }
        None => SyncSettings::default(),
    };

    if let Some(root) = &global.root {
        settings.external_root = Some(root.clone());
    }
    settings.validate()?;
    Ok(settings)
}

async fn save_settings(path: &Path, rendered: String) -> Result<()> {
    TokioFileSystem::new()
        .write_file(path, Bytes::from(rendered))
        .await
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    info!(path = ?path, "Saved settings");
    Ok(())
}

struct App {
    settings: SyncSettings,
    library: Arc<SqliteLibraryStore>,
    engine: SyncEngine,
    events: EventBus,
    prompt: Prompt,
    global: GlobalArgs,
}

impl App {
    async fn open(global: GlobalArgs) -> Result<Self> {
        let settings = load_settings(&global).await?;

        let db_path = global
            .library
            .clone()
            .unwrap_or_else(SqliteLibraryStore::default_database_path);
        let storage = match &global.storage {
            Some(storage) => storage.clone(),
            None => db_path
                .parent()
                .map(|dir| dir.join("storage"))
                .unwrap_or_else(|| PathBuf::from("storage")),
        };

        let library = Arc::new(
            SqliteLibraryStore::new(db_path.clone(), storage)
                .await
                .with_context(|| format!("Failed to open library {}", db_path.display()))?,
        );
        let events = EventBus::default();
        let engine = SyncEngine::new(
            settings.clone(),
            library.clone(),
            Arc::new(TokioFileSystem::new()),
        )?
        .with_event_bus(events.clone());

        Ok(Self {
            settings,
            library,
            engine,
            events,
            prompt: Prompt::new(),
            global,
        })
    }

    /// Ask before batches above the confirmation threshold
    async fn confirm_batch(&self, verb: &str, count: usize) -> Result<bool> {
        if self.global.yes || !self.settings.requires_confirmation(count) {
            return Ok(true);
        }
        Ok(self
            .prompt
            .confirm(&format!("{} {} files?", verb, count))
            .await?)
    }

    /// Render pass progress on stderr until the pass completes; off with `-v`
    fn show_progress(&self) -> Option<JoinHandle<()>> {
        if self.global.verbose > 0 {
            return None;
        }

        let mut stream = EventStream::new(self.events.subscribe())
            .filter(|event| matches!(event, CoreEvent::Sync(_)));

        Some(tokio::spawn(async move {
            let mut shown = false;
            while let Ok(event) = stream.recv().await {
                match event {
                    CoreEvent::Sync(SyncEvent::Progress {
                        pass,
                        completed,
                        total,
                    }) => {
                        shown = true;
                        eprint!("\r{}: {}/{}", pass, completed, total);
                    }
                    CoreEvent::Sync(SyncEvent::ConflictDetected { .. }) => eprintln!(),
                    CoreEvent::Sync(SyncEvent::PassCompleted { .. }) => {
                        if shown {
                            eprintln!();
                        }
                        break;
                    }
                    other => debug!("{}", other.description()),
                }
            }
        }))
    }
}

async fn finish_progress(progress: Option<JoinHandle<()>>) {
    if let Some(handle) = progress {
        handle.await.ok();
    }
}

fn keys(raw: &[String]) -> Vec<ItemKey> {
    raw.iter().map(|key| ItemKey::new(key.as_str())).collect()
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn run(global: GlobalArgs, command: Command) -> Result<()> {
    if let Command::Config { save } = command {
        let settings = load_settings(&global).await?;
        let rendered = settings.to_toml()?;
        print!("{}", rendered);
        if save {
            let path = config_path(&global).context("No configuration directory available")?;
            save_settings(&path, rendered).await?;
            eprintln!("Saved settings to {}", path.display());
        }
        return Ok(());
    }

    let app = App::open(global).await?;

    match command {
        Command::Add {
            file,
            title,
            authors,
            year,
            publication,
        } => {
            let info = BibliographicInfo {
                title: title.unwrap_or_default(),
                creators: authors,
                year,
                publication,
            };
            let key = add(&app, &file, info).await?;
            println!("{}", key);
        }
        Command::Send { keys: raw, project } => {
            let keys = keys(&raw);
            if !app.confirm_batch("Send", keys.len()).await? {
                bail!("Cancelled");
            }
            let progress = app.show_progress();
            let summary = app.engine.send(&keys, project.as_deref()).await?;
            finish_progress(progress).await;
            println!("{}", summary.message(DEFAULT_MESSAGE_LIMIT));
            for error in &summary.errors {
                eprintln!("  {}", error);
            }
        }
        Command::Get { keys: raw } => {
            let keys = if raw.is_empty() {
                app.engine
                    .tracked_files()
                    .await?
                    .into_iter()
                    .map(|file| file.key)
                    .collect()
            } else {
                keys(&raw)
            };
            if keys.is_empty() {
                println!("Nothing to retrieve");
                return Ok(());
            }
            if !app.confirm_batch("Retrieve", keys.len()).await? {
                bail!("Cancelled");
            }

            let resolver = CliResolver::new(app.global.on_conflict, &app.prompt);
            let progress = app.show_progress();
            let summary = app.engine.retrieve(&keys, &resolver).await?;
            finish_progress(progress).await;
            println!("{}", summary.message(DEFAULT_MESSAGE_LIMIT));
            for error in &summary.errors {
                eprintln!("  {}", error);
            }
        }
        Command::Check { keys: raw } => {
            let progress = app.show_progress();
            let summary = if raw.is_empty() {
                app.engine.check_modifications().await?
            } else {
                app.engine.check_modifications_for(&keys(&raw)).await?
            };
            finish_progress(progress).await;
            println!("{}", summary.message());
            if summary.orphaned > 0 {
                println!("Cleared {} files without sync records", summary.orphaned);
            }
        }
        Command::Status { keys: raw } => status(&app, &raw).await?,
        Command::Reading { action } => {
            let (count, verb) = match action {
                ReadingAction::Add { keys: raw } => {
                    (app.engine.add_to_reading_list(&keys(&raw)).await?, "Added")
                }
                ReadingAction::Remove { keys: raw } => (
                    app.engine.remove_from_reading_list(&keys(&raw)).await?,
                    "Removed",
                ),
            };
            println!("{} {} items", verb, count);
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

/// Copy a PDF into library storage and register it under a new parent item
async fn add(app: &App, file: &Path, info: BibliographicInfo) -> Result<ItemKey> {
    let fs = TokioFileSystem::new();
    if !fs.exists(file).await? {
        bail!("No such file: {}", file.display());
    }
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("Path has no file name")?;

    let stamp = Utc::now().timestamp_millis();
    let parent = ItemKey::new(format!("P{:X}", stamp));
    let key = ItemKey::new(format!("A{:X}", stamp));
    let destination = app.library.storage_root().join(key.as_str()).join(&file_name);
    fs.copy_file(file, &destination).await?;

    let title = if info.title.is_empty() {
        file_name.clone()
    } else {
        info.title.clone()
    };

    app.library
        .insert_item(&NewItem {
            key: parent.clone(),
            kind: ItemKind::Regular,
            parent: None,
            title,
            content_type: None,
            link_mode: None,
            path: None,
            bibliographic: Some(info),
        })
        .await?;
    app.library
        .insert_item(&NewItem {
            key: key.clone(),
            kind: ItemKind::Attachment,
            parent: Some(parent),
            title: file_name,
            content_type: Some(PDF_CONTENT_TYPE.to_string()),
            link_mode: Some(LinkMode::ImportedFile),
            path: Some(destination),
            bibliographic: None,
        })
        .await?;

    info!(key = %key, "Imported file");
    Ok(key)
}

async fn status(app: &App, raw: &[String]) -> Result<()> {
    if !raw.is_empty() {
        for key in keys(raw) {
            let status = app.engine.status_of(&key).await?;
            println!("{:<16} {}", key.as_str(), status.label());
        }
        return Ok(());
    }

    let files = app.engine.tracked_files().await?;
    if files.is_empty() {
        println!("No files on the external folder");
        return Ok(());
    }

    for file in files {
        let status = app.engine.status_of(&file.key).await?;
        let synced = file
            .record
            .as_ref()
            .map(|record| format_millis(record.last_modified))
            .unwrap_or_else(|| "-".to_string());
        let path = file
            .external_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(no record)".to_string());
        println!(
            "{:<16} {:<10} {:<16} {}",
            file.key.as_str(),
            status.label(),
            synced,
            path
        );
    }
    Ok(())
}
