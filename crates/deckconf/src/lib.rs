//! Layered configuration loading for Deckhand.
//!
//! Every Deckhand crate reads its settings through this crate, so it keeps
//! its dependency list short.
//!
//! # Configuration Layout
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): the remote endpoint, filesystem
//!   paths, plugin sandbox limits and logging.
//!
//! - **Surface** (`SurfaceConfig`): how remote items are filtered, named
//!   and classified into roles for the built-in capability providers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use deckconf::DeckConfig;
//!
//! let config = DeckConfig::load().expect("Failed to load config");
//!
//! println!("Remote: {}", config.infra.remote.endpoint);
//! println!("Prefix: {}", config.surface.mirror.prefix);
//! println!("Context max age: {:?}", config.context_max_age());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/deckhand/config.toml` (system)
//! 2. `~/.config/deckhand/config.toml` (user)
//! 3. `./deckhand.toml` (local override, or `--config`)
//! 4. Environment variables (`DECKHAND_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [remote]
//! endpoint = "ws://localhost:4455"
//! password = ""
//!
//! [paths]
//! plugin_dir = "~/deckhand/plugins"
//!
//! [plugins]
//! lua_timeout = "5s"
//!
//! [mirror]
//! prefix = "_"
//! context_max_age = "10s"
//!
//! [classification]
//! browser_kinds = ["browser_source"]
//! ```

pub mod duration;
pub mod infra;
pub mod loader;
pub mod surface;

pub use duration::parse_duration;
pub use infra::{InfraConfig, PathsConfig, PluginsConfig, RemoteConfig, TelemetryConfig};
pub use loader::{config_files, expand_path, ConfigSources};
pub use surface::{ClassificationConfig, MirrorConfig, SurfaceConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Complete Deckhand configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeckConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(flatten)]
    pub surface: SurfaceConfig,
}

impl DeckConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an optional explicit file, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./deckhand.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = DeckConfig::default();

        for path in loader::config_files(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        config.validate()?;
        Ok((config, sources))
    }

    /// Reject values that only fail once they are used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("mirror.context_max_age", &self.surface.mirror.context_max_age),
            ("plugins.lua_timeout", &self.infra.plugins.lua_timeout),
        ];
        for (key, value) in durations {
            parse_duration(value).map_err(|message| ConfigError::Invalid {
                key: key.to_string(),
                message,
            })?;
        }
        Ok(())
    }

    /// How long a classification context stays fresh.
    pub fn context_max_age(&self) -> Duration {
        parse_duration(&self.surface.mirror.context_max_age).unwrap_or_else(|_| {
            parse_duration(&MirrorConfig::default_context_max_age()).unwrap_or_default()
        })
    }

    /// Per-call budget for sandboxed plugin code.
    pub fn lua_timeout(&self) -> Duration {
        parse_duration(&self.infra.plugins.lua_timeout).unwrap_or_else(|_| {
            parse_duration(&PluginsConfig::default_lua_timeout()).unwrap_or_default()
        })
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so unset options show up as comments
        let mut output = String::new();
        let infra = &self.infra;
        let surface = &self.surface;

        output.push_str("# Deckhand Configuration\n\n");

        output.push_str("[remote]\n");
        output.push_str(&format!("endpoint = \"{}\"\n", infra.remote.endpoint));
        if infra.remote.password.is_empty() {
            output.push_str("# password = \"\"\n");
        } else {
            output.push_str("password = \"********\"\n");
        }

        output.push_str("\n[paths]\n");
        match &infra.paths.plugin_dir {
            Some(dir) => output.push_str(&format!("plugin_dir = \"{}\"\n", dir.display())),
            None => output.push_str("# plugin_dir = \"<exe dir>/plugins\"\n"),
        }
        output.push_str(&format!("data_dir = \"{}\"\n", infra.paths.data_dir.display()));

        output.push_str("\n[plugins]\n");
        output.push_str(&format!("enabled = {}\n", infra.plugins.enabled));
        output.push_str(&format!("lua_timeout = \"{}\"\n", infra.plugins.lua_timeout));
        output.push_str(&format!("watch = {}\n", infra.plugins.watch));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", infra.telemetry.log_level));

        output.push_str("\n[mirror]\n");
        output.push_str(&format!("prefix = \"{}\"\n", surface.mirror.prefix));
        output.push_str(&format!("strip_prefix = {}\n", surface.mirror.strip_prefix));
        output.push_str(&format!(
            "context_max_age = \"{}\"\n",
            surface.mirror.context_max_age
        ));

        let c = &surface.classification;
        output.push_str("\n[classification]\n");
        output.push_str(&format!(
            "microphone_name_hint = \"{}\"\n",
            c.microphone_name_hint
        ));
        for (key, kinds) in [
            ("microphone_kinds", &c.microphone_kinds),
            ("audio_output_kinds", &c.audio_output_kinds),
            ("browser_kinds", &c.browser_kinds),
            ("text_kinds", &c.text_kinds),
            ("media_kinds", &c.media_kinds),
        ] {
            let quoted: Vec<String> = kinds.iter().map(|k| format!("\"{}\"", k)).collect();
            output.push_str(&format!("{} = [{}]\n", key, quoted.join(", ")));
        }

        output
    }
}
