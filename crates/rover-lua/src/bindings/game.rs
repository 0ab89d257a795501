//! The `game` table and the `Robot` constructor.
//!
//! Both are rebuilt fresh for every run and bound to that run's context;
//! nothing here survives a reset. `require("rover")` returns
//! `{ game = ..., Robot = ... }`; the environment builder also injects both
//! as plain globals.

use super::objects::{DoorRef, ItemRef, PlateRef};
use super::robot::robot_value;
use crate::context::RunContext;
use crate::env::upgrade;
use mlua::{Function, Lua, MultiValue, Table, Value};
use rover_core::{Direction, Position};
use std::rc::Rc;

/// Builds the `rover` builtin module: `{ game, Robot }`.
///
/// # Errors
///
/// VM errors while constructing the tables.
pub fn build(ctx: &Rc<RunContext>) -> mlua::Result<Table> {
    let lua = ctx.lua().clone();
    let rover = lua.create_table()?;
    rover.set("game", build_game(&lua, ctx)?)?;
    rover.set("Robot", build_robot_constructor(&lua, ctx)?)?;
    Ok(rover)
}

fn build_game(lua: &Lua, ctx: &Rc<RunContext>) -> mlua::Result<Table> {
    let game = lua.create_table()?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "win",
        lua.create_function(move |_, message: Option<String>| {
            let ctx = upgrade(&weak)?;
            ctx.complete(true, message.as_deref().unwrap_or("You win!"));
            Ok(())
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "fail",
        lua.create_function(move |_, message: Option<String>| {
            let ctx = upgrade(&weak)?;
            ctx.complete(false, message.as_deref().unwrap_or("You failed!"));
            Ok(())
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "getRobot",
        lua.create_function(move |lua, name: String| {
            let ctx = upgrade(&weak)?;
            match ctx.robot(&name) {
                Some(handle) => robot_value(lua, &handle),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "getDoor",
        lua.create_function(move |_, id: String| {
            let ctx = upgrade(&weak)?;
            if ctx.maze().borrow().door(&id).is_none() {
                return Ok(None);
            }
            Ok(Some(DoorRef::new(&ctx, id)))
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "getItem",
        lua.create_function(move |_, id: String| {
            let ctx = upgrade(&weak)?;
            if ctx.maze().borrow().item(&id).is_none() {
                return Ok(None);
            }
            Ok(Some(ItemRef::new(&ctx, id)))
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "getItemOnPosition",
        lua.create_function(move |_, (x, y): (i32, i32)| {
            let ctx = upgrade(&weak)?;
            let id = {
                let maze = ctx.maze();
                let maze = maze.borrow();
                let world = ctx.world();
                let world = world.borrow();
                maze.item_at(Position::new(x, y))
                    .filter(|i| !world.is_collected(&i.id))
                    .map(|i| i.id.clone())
            };
            Ok(id.map(|id| ItemRef::new(&ctx, id)))
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "getPressurePlate",
        lua.create_function(move |_, id: String| {
            let ctx = upgrade(&weak)?;
            if ctx.maze().borrow().plate(&id).is_none() {
                return Ok(None);
            }
            Ok(Some(PlateRef::new(&ctx, id)))
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "createRobot",
        lua.create_function(move |lua, spec: Table| {
            let ctx = upgrade(&weak)?;
            create_robot(lua, &ctx, &spec)
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "isRunning",
        lua.create_function(move |_, ()| match weak.upgrade() {
            Some(ctx) => Ok(ctx.is_running()),
            None => Ok(false),
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "robots",
        lua.create_function(move |lua, ()| {
            let ctx = upgrade(&weak)?;
            let list = lua.create_table()?;
            for (i, handle) in ctx.robots().iter().enumerate() {
                list.set(i + 1, robot_value(lua, handle)?)?;
            }
            Ok(list)
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    game.set(
        "on",
        lua.create_function(move |_, (event, handler): (String, Function)| {
            let ctx = upgrade(&weak)?;
            ctx.on_game_event(&event, handler);
            Ok(())
        })?,
    )?;

    Ok(game)
}

fn build_robot_constructor(lua: &Lua, ctx: &Rc<RunContext>) -> mlua::Result<Table> {
    let robot = lua.create_table()?;
    let weak = Rc::downgrade(ctx);
    robot.set(
        "new",
        lua.create_function(move |lua, spec: Table| {
            let ctx = upgrade(&weak)?;
            create_robot(lua, &ctx, &spec)
        })?,
    )?;
    Ok(robot)
}

/// Shared by `Robot.new` and `game.createRobot`: validates the spawn,
/// registers the actor, and notifies `robotCreated` listeners.
fn create_robot(lua: &Lua, ctx: &Rc<RunContext>, spec: &Table) -> mlua::Result<Value> {
    let name: String = spec.get("name")?;
    let x: i32 = spec.get("x")?;
    let y: i32 = spec.get("y")?;
    let direction = match spec.get::<Option<String>>("direction")? {
        Some(name) => parse_direction(&name)?,
        None => Direction::North,
    };
    let color: Option<String> = spec.get("color")?;

    let handle = ctx
        .spawn_robot(&name, Position::new(x, y), direction, color)
        .map_err(mlua::Error::RuntimeError)?;

    let robot = robot_value(lua, &handle)?;
    ctx.dispatch(
        ctx.game_handlers("robotCreated"),
        MultiValue::from_iter([robot.clone()]),
    );
    Ok(robot)
}

fn parse_direction(name: &str) -> mlua::Result<Direction> {
    Direction::parse(name)
        .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown direction '{name}'")))
}
