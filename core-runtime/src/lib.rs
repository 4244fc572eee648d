//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the PDF sync core:
//! - Sync settings with builder and validation
//! - Logging and tracing initialization
//! - Event bus for pass progress and completion
//!
//! Other crates depend on this one for configuration and ambient concerns;
//! it holds no sync logic itself.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{MarkerNames, ProjectFolder, SyncMode, SyncSettings, SyncSettingsBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, ReadingListEvent, SyncEvent, SyncPass};
