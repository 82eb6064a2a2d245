//! Capability providers backed by a Lua registration table.
//!
//! A plugin file calls `deck.register{...}` once per provider. The table is
//! kept in the VM's registry and its functions are called on the blocking
//! pool under the sandbox timeout:
//!
//! ```lua
//! deck.register {
//!     name = "media_keys",
//!     priority = 20,
//!     can_handle = function(kind, source, ctx) return kind == "ffmpeg_source" end,
//!     execute = function(panel, source, display_name, ctx)
//!         panel:add { kind = "button", id = "restart", label = "Restart",
//!                     binding = { op = "TriggerMediaInputAction",
//!                                 params = { inputName = source,
//!                                            mediaAction = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART" } } }
//!     end,
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use async_trait::async_trait;
use deckproto::RemoteEvent;
use mlua::{AnyUserData, Function, Lua, LuaSerdeExt, RegistryKey, Table, UserData, UserDataMethods};
use serde::Serialize;
use tracing::{debug, warn};

use super::sandbox::{json_to_lua, with_deadline, SandboxConfig};
use crate::capability::{CapabilityProvider, Origin};
use crate::context::{Context, Role};
use crate::model::{Item, ItemId};
use crate::panel::{Control, Panel};

/// What a plugin sees as its third/fourth argument.
#[derive(Debug, Clone, Serialize)]
struct PluginContext {
    id: ItemId,
    kind: String,
    enabled: bool,
    roles: Vec<Role>,
}

impl PluginContext {
    fn new(item: &Item, ctx: &Context) -> Self {
        Self {
            id: item.id,
            kind: item.kind.clone(),
            enabled: item.enabled,
            roles: ctx
                .roles
                .iter()
                .filter(|(_, names)| names.contains(&item.raw_name))
                .map(|(role, _)| *role)
                .collect(),
        }
    }
}

/// The `panel` argument handed to `execute`.
#[derive(Default)]
struct LuaPanel(Panel);

impl UserData for LuaPanel {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("add", |lua, this, control: Table| {
            let control: Control = lua.from_value(mlua::Value::Table(control))?;
            this.0.add(control);
            Ok(())
        });
        methods.add_method_mut("set_background", |_, this, color: String| {
            this.0.set_background(color);
            Ok(())
        });
        methods.add_method_mut("set_icon", |_, this, icon: String| {
            this.0.set_icon(icon);
            Ok(())
        });
    }
}

/// Fields read from a validated `deck.register` table.
pub(crate) struct Registration {
    pub name: String,
    pub version: String,
    pub priority: i32,
    pub key: RegistryKey,
}

/// A provider defined by a plugin file.
///
/// A call that overruns the sandbox timeout faults the provider: it is
/// skipped from then on until its file is reloaded.
pub struct LuaProvider {
    name: String,
    version: String,
    priority: i32,
    file: String,
    lua: Arc<Lua>,
    key: Arc<RegistryKey>,
    sandbox: SandboxConfig,
    faulted: AtomicBool,
}

impl LuaProvider {
    pub(crate) fn new(
        registration: Registration,
        file: &str,
        lua: Arc<Lua>,
        sandbox: SandboxConfig,
    ) -> Self {
        Self {
            name: registration.name,
            version: registration.version,
            priority: registration.priority,
            file: file.to_string(),
            lua,
            key: Arc::new(registration.key),
            sandbox,
            faulted: AtomicBool::new(false),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Run `f` against the registration table on the blocking pool, under
    /// the VM's call deadline.
    async fn call<R, F>(&self, what: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Lua, &Table) -> mlua::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let label = format!("{}.{}", self.name, what);
        if self.is_faulted() {
            bail!("{} skipped: provider faulted after a timeout", label);
        }

        let lua = self.lua.clone();
        let key = self.key.clone();
        let limit = self.sandbox.timeout;
        let started = Instant::now();
        let result = self
            .sandbox
            .run(&label, move || {
                let reg: Table = lua.registry_value(&key)?;
                Ok(with_deadline(&lua, limit, || f(&lua, &reg))?)
            })
            .await;

        if result.is_err() && started.elapsed() >= limit {
            self.faulted.store(true, Ordering::SeqCst);
            warn!(plugin = %self.name, file = %self.file, "plugin call timed out, provider disabled");
        }
        result
    }
}

#[async_trait]
impl CapabilityProvider for LuaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn origin(&self) -> Origin {
        Origin::External {
            file: self.file.clone(),
        }
    }

    async fn is_applicable(&self, item: &Item, ctx: &Context) -> Result<bool> {
        if self.is_faulted() {
            return Ok(false);
        }
        let kind = item.kind.clone();
        let source = item.raw_name.clone();
        let plugin_ctx = PluginContext::new(item, ctx);
        self.call("can_handle", move |lua, reg| {
            let can_handle: Function = reg.get("can_handle")?;
            can_handle.call::<bool>((kind, source, lua.to_value(&plugin_ctx)?))
        })
        .await
    }

    async fn apply(&self, panel: &mut Panel, item: &Item, ctx: &Context) -> Result<()> {
        let source = item.raw_name.clone();
        let display_name = item.display_name.clone();
        let plugin_ctx = PluginContext::new(item, ctx);
        let section = self
            .call("execute", move |lua, reg| {
                let execute: Function = reg.get("execute")?;
                let ud: AnyUserData = lua.create_userdata(LuaPanel::default())?;
                execute.call::<()>((ud.clone(), source, display_name, lua.to_value(&plugin_ctx)?))?;
                let built = ud.borrow::<LuaPanel>()?.0.clone();
                Ok(built)
            })
            .await?;

        debug!(plugin = %self.name, controls = section.controls.len(), "plugin panel built");
        panel.merge(section);
        Ok(())
    }

    async fn cleanup(&self, source: &str) -> Result<()> {
        if self.is_faulted() {
            return Ok(());
        }
        let source = source.to_string();
        self.call("cleanup", move |_, reg| {
            match reg.get::<Option<Function>>("cleanup")? {
                Some(cleanup) => cleanup.call::<()>(source),
                None => Ok(()),
            }
        })
        .await
    }

    async fn on_remote_event(&self, source: &str, event: &RemoteEvent) -> Result<()> {
        if self.is_faulted() {
            return Ok(());
        }
        let source = source.to_string();
        let topic = event.kind().topic();
        let data = event.data();
        self.call("on_remote_update", move |lua, reg| {
            match reg.get::<Option<Function>>("on_remote_update")? {
                Some(handler) => handler.call::<()>((source, topic, json_to_lua(lua, &data)?)),
                None => Ok(()),
            }
        })
        .await
    }
}
