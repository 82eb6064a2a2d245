//! Plugin directory resolution.
//!
//! The configured directory (or `plugins/` next to the executable) is tried
//! first, then `plugins/` under the data directory, then a temp directory.
//! The first one that exists or can be created wins.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{DeckError, Result};

/// Directories to try, most preferred first.
pub fn candidate_dirs(configured: Option<&Path>, data_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    match configured {
        Some(dir) => dirs.push(dir.to_path_buf()),
        None => {
            if let Some(exe_dir) = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
            {
                dirs.push(exe_dir.join("plugins"));
            }
        }
    }

    dirs.push(data_dir.join("plugins"));
    dirs.push(std::env::temp_dir().join("deckhand").join("plugins"));
    dirs
}

/// Pick the first usable directory, creating it if needed.
pub fn resolve_plugin_dir(candidates: &[PathBuf]) -> Result<PathBuf> {
    for dir in candidates {
        if dir.is_dir() {
            info!(dir = %dir.display(), "using plugin directory");
            return Ok(dir.clone());
        }

        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                info!(dir = %dir.display(), "created plugin directory");
                return Ok(dir.clone());
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "plugin directory unusable, trying next"),
        }
    }

    debug!(tried = candidates.len(), "no plugin directory candidate worked");
    Err(DeckError::PluginDir(format!(
        "tried {}",
        candidates
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}
