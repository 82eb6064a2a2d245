//! Bridge between plugin Lua code and the remote host.
//!
//! Registers a whitelisted `host.*` table. Every function blocks the calling
//! (blocking-pool) thread on the async [`Host`] operation:
//!
//! ```lua
//! if host.get_mute(source) then
//!     host.set_mute(source, false)
//! end
//! ```

use mlua::{Lua, Table, Value as LuaValue};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::sandbox::{json_to_lua, lua_to_json};
use crate::error::DeckError;
use crate::host::Host;

/// Context captured by the `host.*` functions.
#[derive(Clone)]
pub struct HostBridgeContext {
    pub host: Arc<Host>,

    /// Tokio runtime handle for running async code from blocking context.
    pub runtime_handle: Handle,
}

impl HostBridgeContext {
    pub fn new(host: Arc<Host>, runtime_handle: Handle) -> Self {
        Self {
            host,
            runtime_handle,
        }
    }

    /// Bridge for the current runtime. Must be called from inside tokio.
    pub fn current(host: Arc<Host>) -> Self {
        Self::new(host, Handle::current())
    }

    fn block_on<T>(&self, fut: impl Future<Output = Result<T, DeckError>>) -> mlua::Result<T> {
        self.runtime_handle
            .block_on(fut)
            .map_err(mlua::Error::external)
    }
}

/// Register the `host` global table.
pub fn register_host_globals(lua: &Lua, ctx: HostBridgeContext) -> mlua::Result<()> {
    let host_table = lua.create_table()?;

    let c = ctx.clone();
    host_table.set(
        "list_items",
        lua.create_function(move |lua, scene: String| {
            let list = c.block_on(c.host.list_items(&scene))?;
            let items: Vec<_> = list
                .scene_items
                .iter()
                .map(|i| {
                    json!({
                        "id": i.scene_item_id,
                        "name": i.source_name,
                        "enabled": i.scene_item_enabled,
                        "kind": i.input_kind,
                    })
                })
                .collect();
            json_to_lua(lua, &serde_json::Value::Array(items))
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "set_item_enabled",
        lua.create_function(move |_, (scene, id, enabled): (String, i64, bool)| {
            c.block_on(c.host.set_item_enabled(&scene, id, enabled))
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "get_settings",
        lua.create_function(move |lua, input: String| {
            let settings = c.block_on(c.host.get_settings(&input))?;
            json_to_lua(lua, &settings.input_settings)
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "set_settings",
        lua.create_function(move |lua, (input, settings): (String, Table)| {
            let settings = lua_to_json(lua, LuaValue::Table(settings))?;
            c.block_on(c.host.set_settings(&input, settings))
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "get_mute",
        lua.create_function(move |_, input: String| c.block_on(c.host.get_mute(&input)))?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "set_mute",
        lua.create_function(move |_, (input, muted): (String, bool)| {
            c.block_on(c.host.set_mute(&input, muted))
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "get_volume",
        lua.create_function(move |_, input: String| c.block_on(c.host.get_volume(&input)))?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "set_volume",
        lua.create_function(move |_, (input, volume): (String, f64)| {
            c.block_on(c.host.set_volume(&input, volume))
        })?,
    )?;

    let c = ctx.clone();
    host_table.set(
        "press_button",
        lua.create_function(move |_, (input, property): (String, String)| {
            c.block_on(c.host.press_button(&input, &property))
        })?,
    )?;

    let c = ctx;
    host_table.set(
        "trigger_media",
        lua.create_function(move |_, (input, action): (String, String)| {
            c.block_on(c.host.trigger_media(&input, &action))
        })?,
    )?;

    lua.globals().set("host", host_table)?;
    Ok(())
}
