//! # Sync Configuration
//!
//! [`SyncSettings`] carries every user-facing knob of the sync core: the
//! external root, copy/move mode, naming templates, marker strings, project
//! folders and batch concurrency.
//!
//! Settings deserialize from TOML (or any serde format) with every field
//! optional, and can be built in code with [`SyncSettings::builder`]:
//!
//! ```
//! use core_runtime::config::{SyncMode, SyncSettings};
//!
//! let settings = SyncSettings::builder()
//!     .external_root("/mnt/tablet/papers")
//!     .mode(SyncMode::Copy)
//!     .rename_enabled(true)
//!     .project_folder("thesis", "projects/thesis")
//!     .build()
//!     .expect("valid settings");
//!
//! assert_eq!(settings.concurrency, 3);
//! ```
//!
//! `build()` runs [`SyncSettings::validate`]; invalid settings surface as
//! [`Error::Config`] with an actionable message.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default number of file operations in flight per batch window
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Whether the library keeps its copy after a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Original stays in library storage, a duplicate lives externally
    #[default]
    Copy,
    /// External path becomes canonical and the library holds a link
    Move,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Copy => "copy",
            SyncMode::Move => "move",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker strings written to host items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerNames {
    /// File is on the external root
    pub tracked: String,
    /// External copy changed since the last sync
    pub modified: String,
    /// Top-level item is on the reading list
    pub reading: String,
}

impl Default for MarkerNames {
    fn default() -> Self {
        Self {
            tracked: "_tablet".to_string(),
            modified: "_tablet_modified".to_string(),
            reading: "_reading".to_string(),
        }
    }
}

/// Named destination folder under the external root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFolder {
    pub label: String,
    /// Path relative to the external root
    pub path: PathBuf,
}

/// Sync core settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Root of the external folder; `None` until the user picks one
    pub external_root: Option<PathBuf>,
    pub mode: SyncMode,
    /// Render `rename_template` from parent metadata when sending
    pub rename_enabled: bool,
    /// Wildcards: `%a` author, `%y` year, `%t` title, `%j` journal
    pub rename_template: String,
    pub subfolder_enabled: bool,
    /// Wildcards: `%a`, `%y`, `%j`; `/` separates folder levels
    pub subfolder_template: String,
    /// Import annotations from retrieved files
    pub extract_on_sync: bool,
    /// Ask before acting on more files than this
    pub confirmation_threshold: usize,
    /// How long hosts should show the completion notification
    pub notification_secs: u64,
    /// File operations in flight per batch window
    pub concurrency: usize,
    // Tables last so the TOML form stays readable.
    pub markers: MarkerNames,
    pub project_folders: Vec<ProjectFolder>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            external_root: None,
            mode: SyncMode::Copy,
            rename_enabled: false,
            rename_template: "%a_%y_%t".to_string(),
            subfolder_enabled: false,
            subfolder_template: "%a".to_string(),
            extract_on_sync: false,
            confirmation_threshold: 5,
            notification_secs: 5,
            concurrency: DEFAULT_CONCURRENCY,
            markers: MarkerNames::default(),
            project_folders: Vec::new(),
        }
    }
}

impl SyncSettings {
    /// Creates a new builder seeded with defaults.
    pub fn builder() -> SyncSettingsBuilder {
        SyncSettingsBuilder::default()
    }

    /// Validates the settings.
    ///
    /// This checks:
    /// - Marker strings are non-empty and distinct
    /// - Concurrency is at least 1
    /// - Project folder labels are unique and paths are relative
    /// - A rename template is present when renaming is enabled
    ///
    /// A missing external root is not an error here; sending reports it.
    pub fn validate(&self) -> Result<()> {
        let markers = [
            ("tracked", &self.markers.tracked),
            ("modified", &self.markers.modified),
            ("reading", &self.markers.reading),
        ];

        for (name, value) in markers {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "The {} marker cannot be empty",
                    name
                )));
            }
        }

        if self.markers.tracked == self.markers.modified
            || self.markers.tracked == self.markers.reading
            || self.markers.modified == self.markers.reading
        {
            return Err(Error::Config(
                "Tracked, modified and reading markers must be distinct".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(Error::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        if self.rename_enabled && self.rename_template.trim().is_empty() {
            return Err(Error::Config(
                "Renaming is enabled but the rename template is empty".to_string(),
            ));
        }

        for (index, folder) in self.project_folders.iter().enumerate() {
            if folder.label.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Project folder #{} has an empty label",
                    index + 1
                )));
            }

            if folder.path.is_absolute() {
                return Err(Error::Config(format!(
                    "Project folder '{}' must be relative to the external root, got {}",
                    folder.label,
                    folder.path.display()
                )));
            }

            if self.project_folders[..index]
                .iter()
                .any(|other| other.label == folder.label)
            {
                return Err(Error::Config(format!(
                    "Project folder '{}' is defined more than once",
                    folder.label
                )));
            }
        }

        Ok(())
    }

    /// Parse and validate settings from TOML
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings: SyncSettings =
            toml::from_str(source).map_err(|e| Error::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Configured external root, treating an empty path as unset
    pub fn root(&self) -> Option<&PathBuf> {
        self.external_root
            .as_ref()
            .filter(|root| !root.as_os_str().is_empty())
    }

    /// Look up a project folder by label
    pub fn project_folder(&self, label: &str) -> Option<&ProjectFolder> {
        self.project_folders.iter().find(|f| f.label == label)
    }

    /// Whether a batch of `count` files needs user confirmation
    pub fn requires_confirmation(&self, count: usize) -> bool {
        count > self.confirmation_threshold
    }

    /// Concurrency with 0 treated as 1
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Builder for [`SyncSettings`]
#[derive(Debug, Clone, Default)]
pub struct SyncSettingsBuilder {
    settings: SyncSettings,
}

impl SyncSettingsBuilder {
    pub fn external_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.settings.external_root = Some(root.into());
        self
    }

    pub fn mode(mut self, mode: SyncMode) -> Self {
        self.settings.mode = mode;
        self
    }

    pub fn rename_enabled(mut self, enabled: bool) -> Self {
        self.settings.rename_enabled = enabled;
        self
    }

    pub fn rename_template(mut self, template: impl Into<String>) -> Self {
        self.settings.rename_template = template.into();
        self
    }

    pub fn subfolder_enabled(mut self, enabled: bool) -> Self {
        self.settings.subfolder_enabled = enabled;
        self
    }

    pub fn subfolder_template(mut self, template: impl Into<String>) -> Self {
        self.settings.subfolder_template = template.into();
        self
    }

    pub fn extract_on_sync(mut self, enabled: bool) -> Self {
        self.settings.extract_on_sync = enabled;
        self
    }

    pub fn confirmation_threshold(mut self, threshold: usize) -> Self {
        self.settings.confirmation_threshold = threshold;
        self
    }

    pub fn notification_secs(mut self, secs: u64) -> Self {
        self.settings.notification_secs = secs;
        self
    }

    pub fn markers(mut self, markers: MarkerNames) -> Self {
        self.settings.markers = markers;
        self
    }

    /// Adds a project folder.
    pub fn project_folder(mut self, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.settings.project_folders.push(ProjectFolder {
            label: label.into(),
            path: path.into(),
        });
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.settings.concurrency = concurrency;
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> Result<SyncSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.markers.tracked, "_tablet");
        assert_eq!(settings.mode, SyncMode::Copy);
        assert!(settings.root().is_none());
    }

    #[test]
    fn test_builder_sets_fields() {
        let settings = SyncSettings::builder()
            .external_root("/mnt/tablet")
            .mode(SyncMode::Move)
            .rename_enabled(true)
            .rename_template("%y-%t")
            .subfolder_enabled(true)
            .subfolder_template("%j/%y")
            .project_folder("thesis", "projects/thesis")
            .concurrency(5)
            .build()
            .unwrap();

        assert_eq!(settings.root(), Some(&PathBuf::from("/mnt/tablet")));
        assert_eq!(settings.mode, SyncMode::Move);
        assert_eq!(settings.concurrency, 5);
        assert_eq!(
            settings.project_folder("thesis").map(|f| f.path.clone()),
            Some(PathBuf::from("projects/thesis"))
        );
        assert!(settings.project_folder("other").is_none());
    }

    #[test]
    fn test_empty_root_is_unset() {
        let settings = SyncSettings::builder().external_root("").build().unwrap();
        assert!(settings.root().is_none());
    }

    #[test]
    fn test_duplicate_markers_rejected() {
        let result = SyncSettings::builder()
            .markers(MarkerNames {
                tracked: "_t".to_string(),
                modified: "_t".to_string(),
                reading: "_r".to_string(),
            })
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("distinct")));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let mut settings = SyncSettings::default();
        settings.markers.reading = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected_but_effective_is_one() {
        let settings = SyncSettings {
            concurrency: 0,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
        assert_eq!(settings.effective_concurrency(), 1);
    }

    #[test]
    fn test_absolute_project_path_rejected() {
        let result = SyncSettings::builder()
            .project_folder("abs", "/etc/papers")
            .build();
        assert!(result.is_err());

        let result = SyncSettings::builder()
            .project_folder("a", "one")
            .project_folder("a", "two")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rename_template_required_when_renaming() {
        let result = SyncSettings::builder()
            .rename_enabled(true)
            .rename_template("")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_requires_confirmation() {
        let settings = SyncSettings::builder()
            .confirmation_threshold(2)
            .build()
            .unwrap();
        assert!(!settings.requires_confirmation(2));
        assert!(settings.requires_confirmation(3));
    }

    #[test]
    fn test_from_toml() {
        let source = r#"
            external_root = "/mnt/tablet"
            mode = "move"
            rename_enabled = true

            [markers]
            reading = "_to_read"

            [[project_folders]]
            label = "thesis"
            path = "projects/thesis"
        "#;

        let settings = SyncSettings::from_toml(source).unwrap();
        assert_eq!(settings.mode, SyncMode::Move);
        assert!(settings.rename_enabled);
        assert_eq!(settings.rename_template, "%a_%y_%t");
        assert_eq!(settings.markers.reading, "_to_read");
        assert_eq!(settings.markers.tracked, "_tablet");
        assert!(settings.project_folder("thesis").is_some());
    }

    #[test]
    fn test_from_toml_reports_parse_and_validation_errors() {
        assert!(matches!(
            SyncSettings::from_toml("mode = \"teleport\""),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            SyncSettings::from_toml("concurrency = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_preserves_projects() {
        let settings = SyncSettings::builder()
            .external_root("/mnt/tablet")
            .project_folder("reading-group", "groups/reading")
            .build()
            .unwrap();

        let text = settings.to_toml().unwrap();
        assert_eq!(SyncSettings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "external_root": "/mnt/tablet", "mode": "move", "markers": { "tracked": "_ext" } }"#;
        let settings: SyncSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.mode, SyncMode::Move);
        assert_eq!(settings.markers.tracked, "_ext");
        assert_eq!(settings.markers.modified, "_tablet_modified");
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
    }
}
