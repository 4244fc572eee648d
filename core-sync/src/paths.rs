//! Collision-safe destination naming and empty-directory pruning

use bridge_traits::FileSystemAccess;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Attempts per destination, counting the unsuffixed name
pub const MAX_COLLISION_ATTEMPTS: usize = 100;

/// Destination paths handed out during one pass
///
/// Two files of the same pass rendering to the same name must not race for
/// it, so a path is claimed before the file operation starts.
#[derive(Debug, Default)]
pub struct DestinationClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DestinationClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the first free `name`, `name_2`, `name_3`, ... in `dir`
    pub async fn claim(
        &self,
        fs: &dyn FileSystemAccess,
        dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf> {
        let (stem, extension) = split_extension(file_name);
        let mut claimed = self.claimed.lock().await;

        for attempt in 1..=MAX_COLLISION_ATTEMPTS {
            let candidate = if attempt == 1 {
                dir.join(file_name)
            } else {
                dir.join(format!("{}_{}{}", stem, attempt, extension))
            };

            if claimed.contains(&candidate) || fs.exists(&candidate).await? {
                continue;
            }

            debug!(path = ?candidate, attempt, "Claimed destination");
            claimed.insert(candidate.clone());
            return Ok(candidate);
        }

        Err(SyncError::TooManyCollisions(file_name.to_string()))
    }
}

/// Split `name.ext` into `("name", ".ext")`; dotfiles keep their dot in the stem
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => file_name.split_at(index),
        _ => (file_name, ""),
    }
}

/// Extension of a path including the dot, or empty
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Remove characters that are unsafe in file names on common filesystems
///
/// Runs of whitespace collapse to a single `_`.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('.')
        .to_string()
}

/// Delete `start` and its ancestors while they are empty, stopping before `root`
///
/// Failures are logged and end the walk.
pub async fn prune_empty_ancestors(fs: &dyn FileSystemAccess, start: &Path, root: &Path) {
    if start
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        warn!(path = ?start, "Refusing to prune a path with parent segments");
        return;
    }

    let mut current = start.to_path_buf();

    while current != root && current.starts_with(root) {
        match fs.list_directory(&current).await {
            Ok(entries) if entries.is_empty() => {}
            Ok(_) => break,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(path = ?current, error = %e, "Failed to inspect directory");
                }
                break;
            }
        }

        if let Err(e) = fs.delete_empty_dir(&current).await {
            warn!(path = ?current, error = %e, "Failed to remove empty directory");
            break;
        }
        debug!(path = ?current, "Removed empty directory");

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}
