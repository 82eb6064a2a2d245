//! Watches the plugin directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bridge::PluginBridge;
use super::loader::{is_candidate, PluginLoader};
use super::PluginChange;

/// Translate one filesystem event into plugin changes.
///
/// Removals unregister the affected providers before being reported.
pub fn handle_fs_event(loader: &PluginLoader, event: &Event) -> Vec<PluginChange> {
    let mut changes = Vec::new();

    let none: &[PathBuf] = &[];
    let paths = event.paths.as_slice();
    let (removed, reloaded) = match &event.kind {
        EventKind::Create(_) => (none, paths),
        EventKind::Remove(_) => (paths, none),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => (paths, none),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            (&paths[..1], &paths[1..])
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => (none, none),
        EventKind::Modify(_) => (none, paths),
        _ => (none, none),
    };

    for path in removed.iter().filter(|p| is_candidate(p)) {
        let names = loader.unregister_file(path);
        info!(file = %path.display(), providers = ?names, "plugin removed");
        changes.push(PluginChange::Removed {
            path: path.clone(),
            names,
        });
    }

    for path in reloaded.iter().filter(|p| is_candidate(p)) {
        info!(file = %path.display(), "plugin changed, reload required");
        changes.push(PluginChange::ReloadRequired { path: path.clone() });
    }

    changes
}

/// Forwards plugin changes to a channel until dropped.
pub struct PluginWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl PluginWatcher {
    /// Watch the bridge's directory. Must be called from inside tokio.
    pub fn spawn(bridge: Arc<PluginBridge>, changes: mpsc::UnboundedSender<PluginChange>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .context("Failed to create plugin directory watcher")?;
        watcher
            .watch(bridge.dir(), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", bridge.dir().display()))?;
        info!(dir = %bridge.dir().display(), "watching plugin directory");

        let task = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        debug!(kind = ?event.kind, paths = ?event.paths, "plugin directory event");
                        // the current loader, which may have been reset since the last event
                        let loader = bridge.loader();
                        for change in handle_fs_event(&loader, &event) {
                            if changes.send(change).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "plugin watcher error"),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for PluginWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
