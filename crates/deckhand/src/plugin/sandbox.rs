//! Sandboxed Lua VMs for plugins.

use anyhow::{Context, Result};
use mlua::{
    DeserializeOptions, HookTriggers, Lua, LuaSerdeExt, SerializeOptions, Table, Value as LuaValue,
    VmState,
};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::Level;

use super::host_bridge::{register_host_globals, HostBridgeContext};

/// Configuration for the Lua sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum time a single plugin call may take.
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl SandboxConfig {
    /// Run blocking Lua work on the blocking pool, bounded by the timeout.
    ///
    /// On timeout the caller gets an error. The blocking thread stops at the
    /// next instruction hook once the VM's call deadline (see
    /// [`with_deadline`]) has passed.
    pub async fn run<F, R>(&self, what: &str, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        run_bounded(self.timeout, what, async move {
            tokio::task::spawn_blocking(f)
                .await
                .context("Lua task panicked")?
        })
        .await
    }
}

async fn run_bounded<R>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<R>>,
) -> Result<R> {
    timeout(limit, fut)
        .await
        .with_context(|| format!("{} timed out after {:?}", what, limit))?
}

/// Globals a plugin never gets: file loading, module loading, raw I/O,
/// introspection and GC control.
const REMOVED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "require",
    "package",
    "collectgarbage",
    "debug",
    "io",
];

/// `os` keeps only `clock`, `date`, `difftime` and `time`.
const REMOVED_OS_FUNCTIONS: &[&str] = &[
    "execute", "exit", "getenv", "remove", "rename", "setlocale", "tmpname",
];

/// How often the deadline hook runs, in VM instructions.
const DEADLINE_CHECK_INSTRUCTIONS: u32 = 10_000;

/// Message carried by the error a VM raises once its call deadline passes.
pub const DEADLINE_EXCEEDED: &str = "plugin call exceeded its time limit";

/// When the call currently running on a VM must stop. `None` while idle.
#[derive(Debug, Clone, Copy, Default)]
struct CallDeadline(Option<Instant>);

/// Run `f` against `lua` with a deadline `limit` from now. Lua code still
/// running at the deadline fails with [`DEADLINE_EXCEEDED`].
pub fn with_deadline<R>(
    lua: &Lua,
    limit: Duration,
    f: impl FnOnce() -> mlua::Result<R>,
) -> mlua::Result<R> {
    lua.set_app_data(CallDeadline(Some(Instant::now() + limit)));
    let result = f();
    lua.set_app_data(CallDeadline(None));
    result
}

fn install_deadline_hook(lua: &Lua) {
    lua.set_app_data(CallDeadline::default());
    let triggers = HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INSTRUCTIONS);
    lua.set_hook(triggers, |lua, _| {
        let deadline = lua.app_data_ref::<CallDeadline>().and_then(|d| d.0);
        match deadline {
            Some(at) if Instant::now() >= at => Err(mlua::Error::runtime(DEADLINE_EXCEEDED)),
            _ => Ok(VmState::Continue),
        }
    });
}

/// Target for everything plugins write through `log.*`.
pub const PLUGIN_LOG_TARGET: &str = "deckhand.plugin";

/// A fresh VM with the restricted globals, `log.*`, and (given a bridge
/// context) `host.*`.
pub fn create_sandboxed_lua(bridge: Option<&HostBridgeContext>) -> Result<Lua> {
    let lua = Lua::new();
    let globals = lua.globals();

    for name in REMOVED_GLOBALS {
        globals.raw_set(*name, LuaValue::Nil)?;
    }
    let os: Table = globals.get("os")?;
    for name in REMOVED_OS_FUNCTIONS {
        os.raw_set(*name, LuaValue::Nil)?;
    }

    install_log(&lua)?;
    install_deadline_hook(&lua);
    if let Some(ctx) = bridge {
        register_host_globals(&lua, ctx.clone()).context("Failed to register host globals")?;
    }

    Ok(lua)
}

fn install_log(lua: &Lua) -> Result<()> {
    let log = lua.create_table()?;
    for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG] {
        let emit = lua.create_function(move |_, message: String| {
            match level {
                Level::ERROR => tracing::error!(target: PLUGIN_LOG_TARGET, "{}", message),
                Level::WARN => tracing::warn!(target: PLUGIN_LOG_TARGET, "{}", message),
                Level::INFO => tracing::info!(target: PLUGIN_LOG_TARGET, "{}", message),
                _ => tracing::debug!(target: PLUGIN_LOG_TARGET, "{}", message),
            }
            Ok(())
        })?;
        log.set(level.as_str().to_ascii_lowercase(), emit)?;
    }
    lua.globals().set("log", log)?;
    Ok(())
}

/// JSON into Lua. `null` becomes `nil`, arrays become sequences.
pub fn json_to_lua(lua: &Lua, json: &JsonValue) -> mlua::Result<LuaValue> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(json, options)
}

/// Lua into JSON. Sequences become arrays, other tables objects; functions
/// and other opaque values are dropped to `null`.
pub fn lua_to_json(lua: &Lua, value: LuaValue) -> mlua::Result<JsonValue> {
    lua.from_value_with(value, DeserializeOptions::new().deny_unsupported_types(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(code: &str) -> Result<JsonValue> {
        let lua = create_sandboxed_lua(None)?;
        let value: LuaValue = lua.load(code).eval()?;
        Ok(lua_to_json(&lua, value)?)
    }

    #[test]
    fn test_eval_simple() {
        assert_eq!(eval("return 2 + 2").unwrap(), json!(4));
    }

    #[test]
    fn test_table_conversion() {
        let value = eval(r#"return { greeting = "hi", items = {1, 2, 3} }"#).unwrap();
        assert_eq!(value, json!({"greeting": "hi", "items": [1, 2, 3]}));
    }

    #[test]
    fn test_json_round_trip_through_lua() {
        let lua = create_sandboxed_lua(None).unwrap();
        let original = json!({"inputName": "_mic1", "levels": [0.5, 1], "muted": false});
        let value = json_to_lua(&lua, &original).unwrap();
        assert_eq!(lua_to_json(&lua, value).unwrap(), original);
    }

    #[test]
    fn test_empty_table_is_an_object() {
        assert_eq!(eval("return {}").unwrap(), json!({}));
    }

    #[test]
    fn test_logging_available() {
        assert_eq!(eval(r#"log.info("hello"); log.debug("x"); return true"#).unwrap(), json!(true));
    }

    #[test]
    fn test_sandbox_blocks_os_execute() {
        assert!(eval(r#"os.execute("echo dangerous")"#).is_err());
    }

    #[test]
    fn test_sandbox_blocks_io() {
        assert!(eval(r#"return io.open("/etc/passwd", "r")"#).is_err());
    }

    #[test]
    fn test_sandbox_blocks_file_loading() {
        assert!(eval(r#"return dofile("/etc/passwd")"#).is_err());
        assert!(eval(r#"return require("os")"#).is_err());
    }

    #[test]
    fn test_safe_os_functions_remain() {
        assert_eq!(eval("return type(os.time())").unwrap(), json!("number"));
    }

    #[test]
    fn test_deadline_stops_endless_loop() {
        let lua = create_sandboxed_lua(None).unwrap();
        let started = Instant::now();
        let err = with_deadline(&lua, Duration::from_millis(50), || {
            lua.load("while true do end").exec()
        })
        .unwrap_err();

        assert!(err.to_string().contains(DEADLINE_EXCEEDED));
        assert!(started.elapsed() < Duration::from_secs(5));
        // The VM is idle again and usable
        assert_eq!(lua.load("return 1 + 1").eval::<i64>().unwrap(), 2);
    }

    #[test]
    fn test_no_deadline_outside_calls() {
        let lua = create_sandboxed_lua(None).unwrap();
        let count: i64 = lua
            .load("local n = 0 for i = 1, 200000 do n = n + 1 end return n")
            .eval()
            .unwrap();
        assert_eq!(count, 200000);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let config = SandboxConfig {
            timeout: Duration::from_millis(50),
        };
        let err = config
            .run("slow call", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
