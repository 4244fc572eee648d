//! # Status Projection
//!
//! Maps an item's markers to the single badge a host shows next to it.

use core_runtime::config::MarkerNames;
use std::fmt;

/// Display status of a managed file, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Modified,
    OnTablet,
    Reading,
    None,
}

impl FileStatus {
    /// Project markers onto a status: Modified > OnTablet > Reading > None
    ///
    /// The modified marker only counts together with the tracked marker.
    pub fn project(markers: &[String], names: &MarkerNames) -> Self {
        let has = |name: &str| markers.iter().any(|m| m == name);

        if has(&names.tracked) {
            if has(&names.modified) {
                FileStatus::Modified
            } else {
                FileStatus::OnTablet
            }
        } else if has(&names.reading) {
            FileStatus::Reading
        } else {
            FileStatus::None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Modified => "modified",
            FileStatus::OnTablet => "on tablet",
            FileStatus::Reading => "reading",
            FileStatus::None => "-",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
