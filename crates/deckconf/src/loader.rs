//! Config file discovery, loading, and environment variable overlay.

use crate::infra::{PathsConfig, PluginsConfig, RemoteConfig, TelemetryConfig};
use crate::surface::{ClassificationConfig, MirrorConfig};
use crate::{ConfigError, DeckConfig, InfraConfig, SurfaceConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Where the effective config came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Files merged, lowest precedence first
    pub files: Vec<PathBuf>,
    /// Variables that replaced a file value
    pub env_overrides: Vec<String>,
}

const SYSTEM_CONFIG: &str = "/etc/deckhand/config.toml";
const LOCAL_CONFIG: &str = "deckhand.toml";

/// Existing config files in merge order: system, user, then either the
/// `--config` path or `./deckhand.toml`.
pub fn config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let user = directories::ProjectDirs::from("", "", "deckhand")
        .map(|dirs| dirs.config_dir().join("config.toml"));
    let last = match cli_path {
        Some(path) if path.exists() => path.to_path_buf(),
        _ => PathBuf::from(LOCAL_CONFIG),
    };

    [Some(PathBuf::from(SYSTEM_CONFIG)), user, Some(last)]
        .into_iter()
        .flatten()
        .filter(|path| path.exists())
        .collect()
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<DeckConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from a TOML string. Missing sections and keys take defaults.
pub(crate) fn parse_toml(contents: &str, path: &Path) -> Result<DeckConfig, ConfigError> {
    let mut config: DeckConfig =
        toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    // Paths are written by humans; expand ~ and $VAR the same way env vars are.
    if let Some(dir) = config.infra.paths.plugin_dir.take() {
        config.infra.paths.plugin_dir = Some(expand_path(&dir.to_string_lossy()));
    }
    config.infra.paths.data_dir = expand_path(&config.infra.paths.data_dir.to_string_lossy());

    Ok(config)
}

/// Take `overlay` when it differs from the compiled default, else keep `base`.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configs field by field, with `overlay` taking precedence.
pub fn merge_configs(base: DeckConfig, overlay: DeckConfig) -> DeckConfig {
    let remote = RemoteConfig::default();
    let paths = PathsConfig::default();
    let plugins = PluginsConfig::default();
    let telemetry = TelemetryConfig::default();
    let mirror = MirrorConfig::default();
    let classification = ClassificationConfig::default();

    let (b, o) = (base.infra, overlay.infra);
    let infra = InfraConfig {
        remote: RemoteConfig {
            endpoint: pick(b.remote.endpoint, o.remote.endpoint, remote.endpoint),
            password: pick(b.remote.password, o.remote.password, remote.password),
        },
        paths: PathsConfig {
            plugin_dir: pick(b.paths.plugin_dir, o.paths.plugin_dir, paths.plugin_dir),
            data_dir: pick(b.paths.data_dir, o.paths.data_dir, paths.data_dir),
        },
        plugins: PluginsConfig {
            enabled: pick(b.plugins.enabled, o.plugins.enabled, plugins.enabled),
            lua_timeout: pick(b.plugins.lua_timeout, o.plugins.lua_timeout, plugins.lua_timeout),
            watch: pick(b.plugins.watch, o.plugins.watch, plugins.watch),
        },
        telemetry: TelemetryConfig {
            log_level: pick(b.telemetry.log_level, o.telemetry.log_level, telemetry.log_level),
        },
    };

    let (b, o) = (base.surface, overlay.surface);
    let surface = SurfaceConfig {
        mirror: MirrorConfig {
            prefix: pick(b.mirror.prefix, o.mirror.prefix, mirror.prefix),
            strip_prefix: pick(b.mirror.strip_prefix, o.mirror.strip_prefix, mirror.strip_prefix),
            context_max_age: pick(
                b.mirror.context_max_age,
                o.mirror.context_max_age,
                mirror.context_max_age,
            ),
        },
        classification: ClassificationConfig {
            microphone_kinds: pick(
                b.classification.microphone_kinds,
                o.classification.microphone_kinds,
                classification.microphone_kinds,
            ),
            microphone_name_hint: pick(
                b.classification.microphone_name_hint,
                o.classification.microphone_name_hint,
                classification.microphone_name_hint,
            ),
            audio_output_kinds: pick(
                b.classification.audio_output_kinds,
                o.classification.audio_output_kinds,
                classification.audio_output_kinds,
            ),
            browser_kinds: pick(
                b.classification.browser_kinds,
                o.classification.browser_kinds,
                classification.browser_kinds,
            ),
            text_kinds: pick(
                b.classification.text_kinds,
                o.classification.text_kinds,
                classification.text_kinds,
            ),
            media_kinds: pick(
                b.classification.media_kinds,
                o.classification.media_kinds,
                classification.media_kinds,
            ),
        },
    };

    DeckConfig { infra, surface }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut DeckConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables. Split out so tests
/// don't have to mutate the process environment.
pub(crate) fn apply_overrides_from(
    config: &mut DeckConfig,
    sources: &mut ConfigSources,
    vars: impl IntoIterator<Item = (String, String)>,
) {
    for (key, value) in vars {
        let applied = match key.as_str() {
            "DECKHAND_REMOTE_ENDPOINT" => {
                config.infra.remote.endpoint = value;
                true
            }
            "DECKHAND_REMOTE_PASSWORD" => {
                config.infra.remote.password = value;
                true
            }
            "DECKHAND_PLUGIN_DIR" => {
                config.infra.paths.plugin_dir = Some(expand_path(&value));
                true
            }
            "DECKHAND_DATA_DIR" => {
                config.infra.paths.data_dir = expand_path(&value);
                true
            }
            "DECKHAND_PLUGINS_ENABLED" => match parse_bool(&value) {
                Some(enabled) => {
                    config.infra.plugins.enabled = enabled;
                    true
                }
                None => false,
            },
            "DECKHAND_LUA_TIMEOUT" => {
                config.infra.plugins.lua_timeout = value;
                true
            }
            "DECKHAND_MIRROR_PREFIX" => {
                config.surface.mirror.prefix = value;
                true
            }
            "DECKHAND_CONTEXT_MAX_AGE" => {
                config.surface.mirror.context_max_age = value;
                true
            }
            "DECKHAND_LOG_LEVEL" | "RUST_LOG" => {
                config.infra.telemetry.log_level = value;
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

/// Expand a leading `~/` or `$VAR`. Anything that can't be resolved is
/// returned unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(base) => base.home_dir().join(rest),
            None => PathBuf::from(path),
        };
    }

    let Some(var) = path.strip_prefix('$') else {
        return PathBuf::from(path);
    };
    let (name, rest) = var.split_once('/').unwrap_or((var, ""));
    match env::var(name) {
        Ok(value) if rest.is_empty() => PathBuf::from(value),
        Ok(value) => Path::new(&value).join(rest),
        Err(_) => PathBuf::from(path),
    }
}
