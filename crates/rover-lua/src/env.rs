//! Capability environments for user modules.
//!
//! Every user module executes inside its own environment table, never the
//! VM's real globals. The environment carries exactly the injected surface:
//! a whitelisted slice of the Lua stdlib, `console`, `print`, `fetch`, the
//! custom `require`, and the engine API (`game`, `Robot`, `readline`) when
//! registered. `io`, `load`, `dofile` and the process-facing parts of `os`
//! are simply absent.
//!
//! Closures stored in the VM capture the run context weakly; a dead context
//! (run torn down) makes blocking capabilities report cancellation.

use crate::context::RunContext;
use crate::error::to_lua_err;
use crate::modules::ModuleLoader;
use mlua::{Lua, Table, Value, Variadic};
use rover_core::{LogKind, SimError};
use std::rc::{Rc, Weak};

/// Stdlib globals copied verbatim into every module environment.
const SAFE_GLOBALS: [&str; 20] = [
    "assert",
    "error",
    "ipairs",
    "pairs",
    "next",
    "pcall",
    "xpcall",
    "select",
    "tonumber",
    "tostring",
    "type",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "setmetatable",
    "getmetatable",
    "string",
    "table",
    "math",
];

/// Time-only subset of `os` exposed to scripts.
const SAFE_OS: [&str; 3] = ["time", "clock", "date"];

pub(crate) fn upgrade(ctx: &Weak<RunContext>) -> mlua::Result<Rc<RunContext>> {
    ctx.upgrade().ok_or_else(|| to_lua_err(SimError::Cancelled))
}

/// Builds a fresh capability environment for one module execution.
///
/// # Errors
///
/// VM errors while constructing tables or closures.
pub fn build_env(ctx: &Rc<RunContext>, loader: &Rc<ModuleLoader>) -> mlua::Result<Table> {
    let lua = ctx.lua().clone();
    let env = lua.create_table()?;
    let globals = lua.globals();

    for name in SAFE_GLOBALS {
        let value: Value = globals.get(name)?;
        if !value.is_nil() {
            env.set(name, value)?;
        }
    }

    let real_os: Table = globals.get("os")?;
    let os = lua.create_table()?;
    for name in SAFE_OS {
        let value: Value = real_os.get(name)?;
        if !value.is_nil() {
            os.set(name, value)?;
        }
    }
    env.set("os", os)?;

    let console = build_console(&lua, ctx)?;
    env.set("print", console.get::<Value>("log")?)?;
    env.set("console", console)?;
    env.set("fetch", build_fetch(&lua)?)?;
    env.set("require", build_require(&lua, ctx, loader)?)?;

    // Engine API doubles as plain globals so scripts can skip the require.
    if let Some(Value::Table(rover)) = loader.builtin("rover") {
        env.set("game", rover.get::<Value>("game")?)?;
        env.set("Robot", rover.get::<Value>("Robot")?)?;
    }
    if let Some(readline) = loader.builtin("readline") {
        env.set("readline", readline)?;
    }

    env.set("_G", env.clone())?;
    Ok(env)
}

/// `console.log` / `console.error`, both routed to the host's user log.
fn build_console(lua: &Lua, ctx: &Rc<RunContext>) -> mlua::Result<Table> {
    let console = lua.create_table()?;
    for (name, prefix) in [("log", ""), ("error", "ERROR: ")] {
        let weak = Rc::downgrade(ctx);
        let log = lua.create_function(move |_, args: Variadic<Value>| {
            if let Some(ctx) = weak.upgrade() {
                let line = format_values(&args)?;
                ctx.host().log(LogKind::User, &format!("{prefix}{line}"));
            }
            Ok(())
        })?;
        console.set(name, log)?;
    }
    Ok(console)
}

fn format_values(values: &[Value]) -> mlua::Result<String> {
    let parts: Vec<String> = values
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.to_string_lossy().to_string()),
            other => other.to_string(),
        })
        .collect::<mlua::Result<_>>()?;
    Ok(parts.join(" "))
}

/// `fetch(url)` → `{ ok, status, body }`. Network errors are data, not
/// exceptions, mirroring how lock rejection is reported.
fn build_fetch(lua: &Lua) -> mlua::Result<mlua::Function> {
    lua.create_async_function(|lua, url: String| async move {
        let (ok, status, body) = tokio::task::spawn_blocking(move || {
            match ureq::get(&url).call() {
                Ok(response) => {
                    let status = response.status();
                    let body = response.into_string().unwrap_or_default();
                    (true, status, body)
                }
                Err(ureq::Error::Status(code, response)) => {
                    (false, code, response.into_string().unwrap_or_default())
                }
                Err(err) => (false, 0, err.to_string()),
            }
        })
        .await
        .map_err(mlua::Error::external)?;

        let result = lua.create_table()?;
        result.set("ok", ok)?;
        result.set("status", status)?;
        result.set("body", body)?;
        Ok(result)
    })
}

fn build_require(
    lua: &Lua,
    ctx: &Rc<RunContext>,
    loader: &Rc<ModuleLoader>,
) -> mlua::Result<mlua::Function> {
    let weak = Rc::downgrade(ctx);
    let loader = Rc::clone(loader);
    lua.create_async_function(move |_, name: String| {
        let weak = weak.clone();
        let loader = Rc::clone(&loader);
        async move {
            let ctx = upgrade(&weak)?;
            loader.require(&ctx, &name).await
        }
    })
}
