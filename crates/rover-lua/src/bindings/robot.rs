//! The `Robot` userdata: script-facing wrapper over one actor.
//!
//! Async methods go through [`command`], so a cancelled run freezes the
//! calling script thread instead of raising a catchable error; crashes and
//! health depletion propagate and are catchable with `pcall`.

use super::{command, item_table, position_table};
use crate::context::RobotHandle;
use mlua::{Lua, MultiValue, Table, UserData, UserDataMethods, Value};
use rover_core::Pen;
use rover_sim::{CloseOutcome, DoorCredential, DoorOutcome, DropOutcome, EchoHit, MoveOutcome, ScanResult};
use std::rc::Rc;

/// Lua handle to one robot. Cheap to clone; all clones share the actor.
#[derive(Clone)]
pub struct RobotRef(pub Rc<RobotHandle>);

pub(crate) fn robot_value(lua: &Lua, handle: &Rc<RobotHandle>) -> mlua::Result<Value> {
    Ok(Value::UserData(
        lua.create_userdata(RobotRef(Rc::clone(handle)))?,
    ))
}

impl UserData for RobotRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // --- Movement ---

        methods.add_async_method("moveForward", |lua, this, ()| async move {
            let handle = Rc::clone(&this.0);
            let outcome = command(handle.ctrl.move_forward().await).await?;
            fire_move_events(&lua, &handle, &outcome)?;
            position_table(&lua, outcome.to)
        });

        methods.add_async_method("canMoveForward", |_, this, ()| async move {
            let handle = Rc::clone(&this.0);
            command(handle.ctrl.can_move_forward().await).await
        });

        methods.add_async_method("turnLeft", |_, this, ()| async move {
            let handle = Rc::clone(&this.0);
            command(handle.ctrl.turn_left().await).await
        });

        methods.add_async_method("turnRight", |_, this, ()| async move {
            let handle = Rc::clone(&this.0);
            command(handle.ctrl.turn_right().await).await
        });

        // --- Items ---

        methods.add_async_method("pickUp", |lua, this, ()| async move {
            let handle = Rc::clone(&this.0);
            match command(handle.ctrl.pick_up().await).await? {
                Some(item) => {
                    let table = item_table(&lua, &item)?;
                    fire_item_events(&lua, &handle, &item.id, "pickup")?;
                    Ok(Value::Table(table))
                }
                None => Ok(Value::Nil),
            }
        });

        methods.add_async_method("drop", |lua, this, target: Value| async move {
            let handle = Rc::clone(&this.0);
            let id = item_id_from(&target)?;
            match command(handle.ctrl.drop_item(&id).await).await? {
                DropOutcome::Dropped(item) => {
                    let table = item_table(&lua, &item)?;
                    fire_item_events(&lua, &handle, &item.id, "drop")?;
                    Ok(Value::Table(table))
                }
                DropOutcome::NotHeld | DropOutcome::CellOccupied => Ok(Value::Nil),
            }
        });

        // --- Sensing ---

        methods.add_async_method("scan", |lua, this, ()| async move {
            let handle = Rc::clone(&this.0);
            match command(handle.ctrl.scan().await).await? {
                ScanResult::Door { id, open } => {
                    let table = lua.create_table()?;
                    table.set("type", "door")?;
                    table.set("id", id)?;
                    table.set("open", open)?;
                    Ok(Value::Table(table))
                }
                ScanResult::Item(item) => {
                    let table = item_table(&lua, &item)?;
                    table.set("type", "item")?;
                    Ok(Value::Table(table))
                }
                ScanResult::Nothing => Ok(Value::Nil),
            }
        });

        methods.add_async_method("echo", |lua, this, ()| async move {
            let handle = Rc::clone(&this.0);
            let report = command(handle.ctrl.echo().await).await?;
            let table = lua.create_table()?;
            table.set("distance", report.distance)?;
            table.set(
                "hit",
                match report.hit {
                    EchoHit::Wall => "wall",
                    EchoHit::Door => "door",
                    EchoHit::Item => "item",
                    EchoHit::Nothing => "none",
                },
            )?;
            Ok(table)
        });

        // --- Doors ---

        methods.add_async_method("openDoor", |lua, this, credential: Value| async move {
            let handle = Rc::clone(&this.0);
            let credential = parse_credential(credential)?;
            let outcome = command(handle.ctrl.open_door(credential).await).await?;
            open_result(&lua, outcome)
        });

        methods.add_async_method("closeDoor", |lua, this, ()| async move {
            let handle = Rc::clone(&this.0);
            let outcome = command(handle.ctrl.close_door().await).await?;
            close_result(&lua, outcome)
        });

        // --- Health ---

        methods.add_async_method("damage", |_, this, amount: u32| async move {
            let handle = Rc::clone(&this.0);
            command(handle.ctrl.damage(amount).await).await
        });

        methods.add_async_method("destroy", |_, this, ()| async move {
            let handle = Rc::clone(&this.0);
            command(handle.ctrl.destroy().await).await
        });

        // --- Pure setters ---

        methods.add_method("setSpeed", |_, this, ms: u64| {
            this.0.ctrl.set_speed(ms);
            Ok(())
        });

        methods.add_method("setPen", |_, this, pen: Option<Table>| {
            let pen = match pen {
                Some(table) => Some(Pen {
                    color: table.get("color")?,
                }),
                None => None,
            };
            this.0.ctrl.set_pen(pen);
            Ok(())
        });

        methods.add_method("setAppearance", |_, this, appearance: Option<String>| {
            this.0.ctrl.set_appearance(appearance);
            Ok(())
        });

        // --- Read accessors ---

        methods.add_method("position", |lua, this, ()| {
            position_table(lua, this.0.ctrl.position())
        });

        methods.add_method("direction", |_, this, ()| {
            Ok(this.0.ctrl.direction().to_string())
        });

        methods.add_method("health", |_, this, ()| Ok(this.0.ctrl.snapshot().health));

        methods.add_method("inventory", |lua, this, ()| {
            let inventory = this.0.ctrl.snapshot().inventory;
            let list = lua.create_table()?;
            for (i, item) in inventory.iter().enumerate() {
                list.set(i + 1, item_table(lua, item)?)?;
            }
            Ok(list)
        });

        methods.add_method("isDestroyed", |_, this, ()| Ok(this.0.ctrl.is_destroyed()));

        methods.add_method("name", |_, this, ()| Ok(this.0.ctrl.name()));

        // --- Events ---

        methods.add_method("on", |_, this, (event, handler): (String, mlua::Function)| {
            this.0.on(&event, handler);
            Ok(())
        });
    }
}

/// Accepts an item id string or an item table (anything with an `id`).
fn item_id_from(value: &Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Table(table) => table.get::<Option<String>>("id")?.ok_or_else(|| {
            mlua::Error::RuntimeError("expected an item or an item id".into())
        }),
        other => Err(mlua::Error::RuntimeError(format!(
            "expected an item or an item id, got {}",
            other.type_name()
        ))),
    }
}

/// Accepts nil, a password string, an item table, or a list of items/ids.
fn parse_credential(value: Value) -> mlua::Result<Option<DoorCredential>> {
    match value {
        Value::Nil => Ok(None),
        Value::String(s) => Ok(Some(DoorCredential::Password(s.to_str()?.to_string()))),
        Value::Table(table) => {
            if let Some(id) = table.get::<Option<String>>("id")? {
                return Ok(Some(DoorCredential::Items(vec![id])));
            }
            let mut ids = Vec::new();
            for entry in table.sequence_values::<Value>() {
                ids.push(item_id_from(&entry?)?);
            }
            Ok(Some(DoorCredential::Items(ids)))
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "expected a password or items, got {}",
            other.type_name()
        ))),
    }
}

fn open_result(lua: &Lua, outcome: DoorOutcome) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    match outcome {
        DoorOutcome::Opened { id } => {
            table.set("ok", true)?;
            table.set("status", "opened")?;
            table.set("id", id)?;
        }
        DoorOutcome::AlreadyOpen { id } => {
            table.set("ok", true)?;
            table.set("status", "already-open")?;
            table.set("id", id)?;
        }
        DoorOutcome::Rejected { reason, missing } => {
            table.set("ok", false)?;
            table.set("status", "locked")?;
            table.set("reason", reason.code())?;
            if !missing.is_empty() {
                table.set("missing", missing)?;
            }
        }
    }
    Ok(table)
}

fn close_result(lua: &Lua, outcome: CloseOutcome) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    match outcome {
        CloseOutcome::Closed { id } => {
            table.set("ok", true)?;
            table.set("status", "closed")?;
            table.set("id", id)?;
        }
        CloseOutcome::AlreadyClosed { id } => {
            table.set("ok", true)?;
            table.set("status", "already-closed")?;
            table.set("id", id)?;
        }
        CloseOutcome::Refused { reason } => {
            table.set("ok", false)?;
            table.set("status", "refused")?;
            table.set("reason", reason.code())?;
        }
    }
    Ok(table)
}

/// Fires `moved` on the robot plus enter/leave on items and plates at the
/// cells the robot left and entered.
fn fire_move_events(lua: &Lua, handle: &Rc<RobotHandle>, outcome: &MoveOutcome) -> mlua::Result<()> {
    let Some(ctx) = handle.context() else {
        return Ok(());
    };

    let robot = robot_value(lua, handle)?;
    let position = position_table(lua, outcome.to)?;
    ctx.dispatch(
        handle.handlers("moved"),
        MultiValue::from_iter([Value::Table(position)]),
    );

    let maze = ctx.maze();
    let world = ctx.world();
    let maze = maze.borrow();
    let world = world.borrow();

    if let Some(item) = maze
        .item_at(outcome.to)
        .filter(|i| !world.is_collected(&i.id))
    {
        ctx.dispatch(
            ctx.entity_handlers("item", &item.id, "enter"),
            MultiValue::from_iter([robot.clone()]),
        );
    }
    if let Some(item) = maze
        .item_at(outcome.from)
        .filter(|i| !world.is_collected(&i.id))
    {
        ctx.dispatch(
            ctx.entity_handlers("item", &item.id, "leave"),
            MultiValue::from_iter([robot.clone()]),
        );
    }
    for plate in maze.plates_at(outcome.to) {
        ctx.dispatch(
            ctx.entity_handlers("plate", &plate.id, "enter"),
            MultiValue::from_iter([robot.clone()]),
        );
    }
    for plate in maze.plates_at(outcome.from) {
        ctx.dispatch(
            ctx.entity_handlers("plate", &plate.id, "leave"),
            MultiValue::from_iter([robot.clone()]),
        );
    }
    Ok(())
}

/// Fires a pickup/drop event on both the robot and the item object.
fn fire_item_events(
    lua: &Lua,
    handle: &Rc<RobotHandle>,
    item_id: &str,
    event: &str,
) -> mlua::Result<()> {
    let Some(ctx) = handle.context() else {
        return Ok(());
    };
    let robot = robot_value(lua, handle)?;
    ctx.dispatch(
        handle.handlers(event),
        MultiValue::from_iter([robot.clone()]),
    );
    ctx.dispatch(
        ctx.entity_handlers("item", item_id, event),
        MultiValue::from_iter([robot]),
    );
    Ok(())
}
