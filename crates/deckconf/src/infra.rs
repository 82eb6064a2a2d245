//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote session endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket endpoint of the production tool.
    /// Default: ws://localhost:4455
    #[serde(default = "RemoteConfig::default_endpoint")]
    pub endpoint: String,

    /// Session password. Empty means no authentication.
    #[serde(default)]
    pub password: String,
}

impl RemoteConfig {
    fn default_endpoint() -> String {
        "ws://localhost:4455".to_string()
    }

    /// The password as an optional credential.
    pub fn credential(&self) -> Option<&str> {
        if self.password.is_empty() {
            None
        } else {
            Some(&self.password)
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            password: String::new(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Primary plugin directory.
    /// Default: unset, which resolves to `<exe dir>/plugins` at startup.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,

    /// Per-user data directory, also the second plugin dir candidate.
    /// Default: ~/.local/share/deckhand
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("deckhand"))
            .unwrap_or_else(|| PathBuf::from(".local/share/deckhand"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            data_dir: Self::default_data_dir(),
        }
    }
}

/// External capability provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Load Lua plugins at all.
    #[serde(default = "PluginsConfig::default_enabled")]
    pub enabled: bool,

    /// Per-call budget for plugin code, e.g. "5s" or "500ms".
    #[serde(default = "PluginsConfig::default_lua_timeout")]
    pub lua_timeout: String,

    /// Watch the plugin directory for changes.
    #[serde(default = "PluginsConfig::default_watch")]
    pub watch: bool,
}

impl PluginsConfig {
    fn default_enabled() -> bool {
        true
    }

    pub(crate) fn default_lua_timeout() -> String {
        "5s".to_string()
    }

    fn default_watch() -> bool {
        true
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            lua_timeout: Self::default_lua_timeout(),
            watch: Self::default_watch(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, or an EnvFilter string).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// All infrastructure configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
