//! The `readline` builtin: a synchronous-looking input API.
//!
//! `question` blocks the calling script until the host delivers an answer
//! through the orchestrator's `resolve_input`; the typed variants re-prompt
//! until the answer parses.

use super::command;
use crate::context::RunContext;
use crate::env::upgrade;
use mlua::Table;
use rover_core::LogKind;
use std::rc::{Rc, Weak};
use std::str::FromStr;

/// Builds the `readline` builtin module table.
///
/// # Errors
///
/// VM errors while constructing the table.
pub fn build(ctx: &Rc<RunContext>) -> mlua::Result<Table> {
    let lua = ctx.lua().clone();
    let readline = lua.create_table()?;

    let weak = Rc::downgrade(ctx);
    readline.set(
        "question",
        lua.create_async_function(move |_, prompt: String| {
            let weak = weak.clone();
            async move {
                let ctx = upgrade(&weak)?;
                command(ctx.request_input(&prompt).await).await
            }
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    readline.set(
        "questionInt",
        lua.create_async_function(move |_, prompt: String| {
            let weak = weak.clone();
            async move { question_parsed::<i64>(&weak, &prompt, "a whole number").await }
        })?,
    )?;

    let weak = Rc::downgrade(ctx);
    readline.set(
        "questionFloat",
        lua.create_async_function(move |_, prompt: String| {
            let weak = weak.clone();
            async move { question_parsed::<f64>(&weak, &prompt, "a number").await }
        })?,
    )?;

    Ok(readline)
}

/// Loops until the answer parses as `T`, telling the user what went wrong
/// in between.
async fn question_parsed<T: FromStr>(
    weak: &Weak<RunContext>,
    prompt: &str,
    expected: &str,
) -> mlua::Result<T> {
    loop {
        let ctx = upgrade(weak)?;
        let answer = command(ctx.request_input(prompt).await).await?;
        match answer.trim().parse::<T>() {
            Ok(value) => return Ok(value),
            Err(_) => {
                ctx.host().log(
                    LogKind::User,
                    &format!("'{}' is not {expected}, try again", answer.trim()),
                );
            }
        }
    }
}
