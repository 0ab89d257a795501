//! World-object wrappers: items, doors and pressure plates.
//!
//! These are live views keyed by entity id — reads always reflect the
//! current maze/world state. Items additionally accept script-written custom
//! properties, which land in the item's `extra` bag and round-trip through
//! serialization unchanged.

use super::position_table;
use crate::context::RunContext;
use crate::env::upgrade;
use mlua::{FromLua, Lua, MetaMethod, UserData, UserDataMethods, Value};
use std::rc::{Rc, Weak};

/// Item fields that scripts may not overwrite.
const ITEM_RESERVED: [&str; 3] = ["id", "position", "isRevealed"];

#[derive(Clone)]
pub struct ItemRef {
    pub id: String,
    pub ctx: Weak<RunContext>,
}

impl ItemRef {
    pub(crate) fn new(ctx: &Rc<RunContext>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctx: Rc::downgrade(ctx),
        }
    }
}

impl UserData for ItemRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("on", |_, this, (event, handler): (String, mlua::Function)| {
            let ctx = upgrade(&this.ctx)?;
            ctx.on_entity_event("item", &this.id, &event, handler);
            Ok(())
        });

        methods.add_method("position", |lua, this, ()| {
            let ctx = upgrade(&this.ctx)?;
            let maze = ctx.maze();
            let maze = maze.borrow();
            match maze.item(&this.id).and_then(|i| i.position) {
                Some(pos) => Ok(Value::Table(position_table(lua, pos)?)),
                None => Ok(Value::Nil),
            }
        });

        methods.add_method("isRevealed", |_, this, ()| {
            let ctx = upgrade(&this.ctx)?;
            let maze = ctx.maze();
            let maze = maze.borrow();
            let item = maze
                .item(&this.id)
                .ok_or_else(|| unknown("item", &this.id))?;
            Ok(ctx.world().borrow().is_revealed(item))
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let ctx = upgrade(&this.ctx)?;
            let maze = ctx.maze();
            let maze = maze.borrow();
            let item = maze
                .item(&this.id)
                .ok_or_else(|| unknown("item", &this.id))?;
            match key.as_str() {
                "id" => Ok(Value::String(lua.create_string(&item.id)?)),
                "name" => Ok(Value::String(lua.create_string(&item.name)?)),
                "icon" => option_string(lua, item.icon.as_deref()),
                "image" => option_string(lua, item.image.as_deref()),
                "tags" => {
                    let tags = lua.create_table()?;
                    for (i, tag) in item.tags.iter().enumerate() {
                        tags.set(i + 1, tag.as_str())?;
                    }
                    Ok(Value::Table(tags))
                }
                "position" => match item.position {
                    Some(pos) => Ok(Value::Table(position_table(lua, pos)?)),
                    None => Ok(Value::Nil),
                },
                "isRevealed" => Ok(Value::Boolean(ctx.world().borrow().is_revealed(item))),
                custom => match item.extra.get(custom) {
                    Some(json) => {
                        use mlua::LuaSerdeExt;
                        lua.to_value(json)
                    }
                    None => Ok(Value::Nil),
                },
            }
        });

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |lua, this, (key, value): (String, Value)| {
                let ctx = upgrade(&this.ctx)?;
                if ITEM_RESERVED.contains(&key.as_str()) {
                    return Err(mlua::Error::RuntimeError(format!(
                        "item field '{key}' is read-only"
                    )));
                }
                {
                    let maze = ctx.maze();
                    let mut maze = maze.borrow_mut();
                    let item = maze
                        .item_mut(&this.id)
                        .ok_or_else(|| unknown("item", &this.id))?;
                    match key.as_str() {
                        "name" => item.name = String::from_lua(value, lua)?,
                        "icon" => item.icon = Option::<String>::from_lua(value, lua)?,
                        "image" => item.image = Option::<String>::from_lua(value, lua)?,
                        custom => {
                            use mlua::LuaSerdeExt;
                            let json: serde_json::Value = lua.from_value(value)?;
                            item.extra.insert(custom.to_string(), json);
                        }
                    }
                }
                let world = ctx.world();
                let mut world = world.borrow_mut();
                world.mark_dirty();
                world.flush_updates(ctx.host().as_ref());
                Ok(())
            },
        );
    }
}

#[derive(Clone)]
pub struct DoorRef {
    pub id: String,
    pub ctx: Weak<RunContext>,
}

impl DoorRef {
    pub(crate) fn new(ctx: &Rc<RunContext>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctx: Rc::downgrade(ctx),
        }
    }
}

impl UserData for DoorRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("isOpen", |_, this, ()| {
            let ctx = upgrade(&this.ctx)?;
            Ok(ctx.world().borrow().is_door_open(&this.id))
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let ctx = upgrade(&this.ctx)?;
            match key.as_str() {
                "id" => Ok(Value::String(lua.create_string(&this.id)?)),
                "open" => Ok(Value::Boolean(ctx.world().borrow().is_door_open(&this.id))),
                "position" => {
                    let maze = ctx.maze();
                    let maze = maze.borrow();
                    let door = maze.door(&this.id).ok_or_else(|| unknown("door", &this.id))?;
                    Ok(Value::Table(position_table(lua, door.position)?))
                }
                _ => Ok(Value::Nil),
            }
        });
    }
}

#[derive(Clone)]
pub struct PlateRef {
    pub id: String,
    pub ctx: Weak<RunContext>,
}

impl PlateRef {
    pub(crate) fn new(ctx: &Rc<RunContext>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctx: Rc::downgrade(ctx),
        }
    }
}

impl UserData for PlateRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("on", |_, this, (event, handler): (String, mlua::Function)| {
            let ctx = upgrade(&this.ctx)?;
            ctx.on_entity_event("plate", &this.id, &event, handler);
            Ok(())
        });

        // Derived, never stored: a robot or an uncollected item on the cell.
        methods.add_method("isActive", |_, this, ()| {
            let ctx = upgrade(&this.ctx)?;
            let maze = ctx.maze();
            let maze = maze.borrow();
            let plate = maze
                .plate(&this.id)
                .ok_or_else(|| unknown("pressure plate", &this.id))?;
            Ok(ctx.world().borrow().plate_active(
                &maze,
                plate.position,
                &ctx.robot_positions(),
            ))
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let ctx = upgrade(&this.ctx)?;
            match key.as_str() {
                "id" => Ok(Value::String(lua.create_string(&this.id)?)),
                "position" => {
                    let maze = ctx.maze();
                    let maze = maze.borrow();
                    let plate = maze
                        .plate(&this.id)
                        .ok_or_else(|| unknown("pressure plate", &this.id))?;
                    Ok(Value::Table(position_table(lua, plate.position)?))
                }
                _ => Ok(Value::Nil),
            }
        });
    }
}

fn option_string(lua: &Lua, value: Option<&str>) -> mlua::Result<Value> {
    match value {
        Some(s) => Ok(Value::String(lua.create_string(s)?)),
        None => Ok(Value::Nil),
    }
}

fn unknown(kind: &str, id: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("unknown {kind} '{id}'"))
}
