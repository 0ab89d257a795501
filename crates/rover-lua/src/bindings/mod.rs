//! Script-facing API surface.
//!
//! Each submodule builds one capability: the `Robot` userdata and
//! constructor, the `game` table, door/item/plate object wrappers, and the
//! `readline` input API. Everything here translates between
//! [`RobotController`](rover_sim::RobotController) outcome values and Lua
//! tables; physics never lives on this side.

pub mod game;
pub mod objects;
pub mod readline;
pub mod robot;

use mlua::{Lua, Table};
use rover_core::{Item, Position, SimError};

/// Boundary wrapper for every actor-facing command: cancellation is
/// swallowed into a future that never resolves, freezing the calling script
/// thread; every other failure propagates so script `pcall` works.
pub(crate) async fn command<T>(result: Result<T, SimError>) -> mlua::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(SimError::Cancelled) => std::future::pending().await,
        Err(err) => Err(crate::error::to_lua_err(err)),
    }
}

pub(crate) fn position_table(lua: &Lua, pos: Position) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("x", pos.x)?;
    table.set("y", pos.y)?;
    Ok(table)
}

/// Serializes an item for script consumption; `extra` properties appear as
/// plain fields.
pub(crate) fn item_table(lua: &Lua, item: &Item) -> mlua::Result<Table> {
    use mlua::LuaSerdeExt;
    match lua.to_value(item)? {
        mlua::Value::Table(table) => Ok(table),
        other => Err(mlua::Error::RuntimeError(format!(
            "item serialized to {}",
            other.type_name()
        ))),
    }
}
