//! External capability providers written in Lua.
//!
//! Plugins live as `*.lua` files in one directory. Each file runs in its own
//! sandboxed VM and registers providers through `deck.register{...}`; the
//! [`PluginBridge`] exposes all of them to the main registry as a single
//! lowest-priority provider. Files are watched: a change asks the host to
//! reload, a removal unregisters right away.

pub mod bridge;
pub mod dirs;
pub mod error;
pub mod host_bridge;
pub mod loader;
pub mod provider;
pub mod sandbox;
pub mod watcher;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use bridge::PluginBridge;
pub use error::{parse_error, PluginError, PluginErrorKind};
pub use loader::PluginLoader;
pub use provider::LuaProvider;
pub use sandbox::SandboxConfig;
pub use watcher::PluginWatcher;

/// Something happened to a file in the plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PluginChange {
    /// A plugin was added or edited. Loaded VMs can't be patched in place,
    /// so the host has to rebuild its plugin set.
    ReloadRequired { path: PathBuf },
    /// A plugin was deleted; the providers it registered are already gone.
    Removed { path: PathBuf, names: Vec<String> },
}
