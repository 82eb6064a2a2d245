//! Plugin discovery and loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use mlua::{Lua, Table, Value as LuaValue};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::error::parse_error;
use super::host_bridge::HostBridgeContext;
use super::provider::{LuaProvider, Registration};
use super::sandbox::{create_sandboxed_lua, with_deadline, SandboxConfig};
use crate::capability::{CapabilityRegistry, ProviderInfo};
use crate::host::Host;

/// Words a plugin file must mention before it is worth starting a VM.
const REQUIRED_WORDS: [&str; 3] = ["register", "can_handle", "execute"];

const DEFAULT_PLUGIN_VERSION: &str = "1.0.0";

/// Loads every plugin in one directory into its own registry.
///
/// Loading happens once; concurrent callers of [`load_all`](Self::load_all)
/// share the same in-flight load. Picking up changed files means building a
/// new loader.
pub struct PluginLoader {
    dir: PathBuf,
    registry: Arc<CapabilityRegistry>,
    host: Option<Arc<Host>>,
    sandbox: SandboxConfig,
    loaded: OnceCell<Vec<ProviderInfo>>,
    /// Provider names registered by each file, keyed by file name.
    files: Mutex<HashMap<String, Vec<String>>>,
}

impl PluginLoader {
    pub fn new(dir: impl Into<PathBuf>, host: Option<Arc<Host>>, sandbox: SandboxConfig) -> Self {
        Self {
            dir: dir.into(),
            registry: Arc::new(CapabilityRegistry::new()),
            host,
            sandbox,
            loaded: OnceCell::new(),
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The registry external providers land in.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the directory once and report what got registered.
    pub async fn load_all(&self) -> Vec<ProviderInfo> {
        self.loaded
            .get_or_init(|| async {
                self.load_dir().await;
                self.registry.list()
            })
            .await
            .clone()
    }

    async fn load_dir(&self) {
        let candidates = match discover(&self.dir) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot read plugin directory");
                return;
            }
        };
        info!(dir = %self.dir.display(), candidates = candidates.len(), "loading plugins");

        for path in candidates {
            match self.load_file(&path).await {
                Ok(names) => info!(file = %path.display(), providers = ?names, "plugin loaded"),
                Err(e) => {
                    let diagnosis = parse_error(&e);
                    warn!(
                        file = %path.display(),
                        kind = ?diagnosis.kind,
                        error = %diagnosis.summary(),
                        "plugin skipped"
                    );
                    debug!("{}", diagnosis.format());
                }
            }
        }
    }

    /// Load one file. Either every provider it registers is committed, or none.
    pub async fn load_file(&self, path: &Path) -> Result<Vec<String>> {
        let file_name = file_name(path);
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        check_structure(&source, &file_name)?;

        let bridge = self.host.clone().map(HostBridgeContext::current);
        let chunk = file_name.clone();
        let limit = self.sandbox.timeout;
        let (lua, registrations) = self
            .sandbox
            .run(&format!("loading {}", file_name), move || {
                evaluate(&source, &chunk, bridge.as_ref(), limit)
            })
            .await?;

        let lua = Arc::new(lua);
        let names: Vec<String> = registrations.iter().map(|r| r.name.clone()).collect();
        for registration in registrations {
            let provider = LuaProvider::new(registration, &file_name, lua.clone(), self.sandbox.clone());
            self.registry.register(Arc::new(provider));
        }
        self.files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(file_name, names.clone());
        Ok(names)
    }

    /// Unregister whatever `path` registered.
    ///
    /// Falls back to the file stem when the file was never tracked (for
    /// example because it failed to load under another name).
    pub fn unregister_file(&self, path: &Path) -> Vec<String> {
        let tracked = self
            .files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&file_name(path));
        let names = tracked.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| vec![s.to_string_lossy().into_owned()])
                .unwrap_or_default()
        });

        for name in &names {
            self.registry.unregister(name);
        }
        names
    }
}

/// `*.lua` files in `dir`, dotfiles excluded, in name order.
pub fn discover(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_candidate(&path) && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Whether a path looks like a plugin file, judging by name alone.
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && path.extension().is_some_and(|ext| ext == "lua")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn check_structure(source: &str, file_name: &str) -> Result<()> {
    for word in REQUIRED_WORDS {
        if !source.contains(word) {
            bail!("invalid registration: {} never mentions '{}'", file_name, word);
        }
    }
    Ok(())
}

/// Run a plugin chunk and collect its staged registrations.
fn evaluate(
    source: &str,
    chunk: &str,
    bridge: Option<&HostBridgeContext>,
    limit: Duration,
) -> Result<(Lua, Vec<Registration>)> {
    let lua = create_sandboxed_lua(bridge)?;

    let staged: Arc<Mutex<Vec<Registration>>> = Arc::new(Mutex::new(Vec::new()));
    let rejected = Arc::new(AtomicBool::new(false));

    let deck = lua.create_table()?;
    let sink = staged.clone();
    let flag = rejected.clone();
    deck.set(
        "register",
        lua.create_function(move |lua, reg: Table| match validate(lua, reg) {
            Ok(registration) => {
                sink.lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(registration);
                Ok(true)
            }
            Err(e) => {
                flag.store(true, Ordering::SeqCst);
                Err(e)
            }
        })?,
    )?;
    lua.globals().set("deck", deck)?;

    with_deadline(&lua, limit, || lua.load(source).set_name(chunk).exec())
        .with_context(|| format!("Failed to load {}", chunk))?;

    // A rejected registration swallowed by pcall still sinks the whole file
    if rejected.load(Ordering::SeqCst) {
        bail!("invalid registration: {} made a rejected deck.register call", chunk);
    }

    let registrations = std::mem::take(&mut *staged.lock().unwrap_or_else(|p| p.into_inner()));
    if registrations.is_empty() {
        bail!("invalid registration: {} never called deck.register", chunk);
    }
    Ok((lua, registrations))
}

fn invalid(message: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("invalid registration: {}", message))
}

fn require_function(reg: &Table, field: &str, required: bool) -> mlua::Result<()> {
    match reg.get::<LuaValue>(field)? {
        LuaValue::Function(_) => Ok(()),
        LuaValue::Nil if !required => Ok(()),
        _ => Err(invalid(&format!("{} must be a function", field))),
    }
}

fn priority_from_int(value: i64) -> mlua::Result<i32> {
    i32::try_from(value).map_err(|_| invalid(&format!("priority {} is out of range", value)))
}

fn priority_from_float(value: f64) -> mlua::Result<i32> {
    if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(invalid(&format!("priority {} is out of range", value)));
    }
    Ok(value as i32)
}

fn validate(lua: &Lua, reg: Table) -> mlua::Result<Registration> {
    let name = match reg.get::<LuaValue>("name")? {
        LuaValue::String(s) => s.to_str()?.trim().to_string(),
        _ => String::new(),
    };
    if name.is_empty() {
        return Err(invalid("name must be a non-empty string"));
    }

    require_function(&reg, "can_handle", true)?;
    require_function(&reg, "execute", true)?;
    require_function(&reg, "cleanup", false)?;
    require_function(&reg, "on_remote_update", false)?;

    let version = reg
        .get::<Option<String>>("version")?
        .unwrap_or_else(|| DEFAULT_PLUGIN_VERSION.to_string());

    // Evaluated once; dispatch order is fixed at registration
    let priority = match reg.get::<LuaValue>("priority")? {
        LuaValue::Nil => 0,
        LuaValue::Integer(i) => priority_from_int(i)?,
        LuaValue::Number(n) => priority_from_float(n)?,
        LuaValue::Function(f) => match f.call::<LuaValue>(())? {
            LuaValue::Integer(i) => priority_from_int(i)?,
            LuaValue::Number(n) => priority_from_float(n)?,
            _ => return Err(invalid("priority function must return a number")),
        },
        _ => return Err(invalid("priority must be a number or a function returning one")),
    };

    Ok(Registration {
        name,
        version,
        priority,
        key: lua.create_registry_value(reg)?,
    })
}
