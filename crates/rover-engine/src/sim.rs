//! The simulation orchestrator.
//!
//! A [`Simulation`] is constructed once with a maze and a host, then driven
//! through `run` / `stop` / `reset` / `resolve_input`. Every `run` builds
//! the whole sandbox fresh — a new VM, a deep copy of the maze, new world
//! state, a new abort signal — so nothing persists across runs. `run`
//! resolves when the run definitively ends (win, fail, uncaught fatal
//! error, or stop); event-driven scripts whose entry returns immediately
//! keep the run alive until then.

use crate::error::EngineError;
use indexmap::IndexMap;
use mlua::Lua;
use rover_core::{MazeConfig, Position, RunHost, SimError};
use rover_lua::bindings::{game, readline};
use rover_lua::env::build_env;
use rover_lua::{
    precompile, prefetch, scan_package_requires, to_lua_err, HttpPackageSource, ModuleLoader,
    PackageSource, RunContext, ENTRY_FILE, GLOBAL_MODULE_NAME,
};
use rover_sim::WorldState;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// File-name → source-text map supplied to `run`.
pub type ScriptFiles = IndexMap<String, String>;

/// Top-level run/reset/stop/resolve-input lifecycle.
pub struct Simulation {
    original: MazeConfig,
    host: Rc<dyn RunHost>,
    package_source: Arc<dyn PackageSource>,
    current: RefCell<Option<Rc<RunContext>>>,
}

impl Simulation {
    /// Validates the maze and builds an idle simulation.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidMaze`] when the maze violates a structural
    /// invariant.
    pub fn new(maze: MazeConfig, host: Rc<dyn RunHost>) -> Result<Self, EngineError> {
        maze.validate().map_err(EngineError::InvalidMaze)?;
        Ok(Self {
            original: maze,
            host,
            package_source: Arc::new(HttpPackageSource::default()),
            current: RefCell::new(None),
        })
    }

    /// Replaces the third-party package source (tests, offline runs).
    #[must_use]
    pub fn with_package_source(mut self, source: Arc<dyn PackageSource>) -> Self {
        self.package_source = source;
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.is_running())
    }

    /// Prompt of the input request a script is currently blocked on.
    #[must_use]
    pub fn pending_prompt(&self) -> Option<String> {
        self.current.borrow().as_ref()?.pending_prompt()
    }

    /// Answers a pending input request. Returns false if nothing waits.
    pub fn resolve_input(&self, value: &str) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.resolve_input(value))
    }

    /// Aborts the active run, releasing every in-flight timer and input
    /// wait. No completion callback fires for a plain stop.
    pub fn stop(&self) {
        if let Some(ctx) = self.current.borrow().as_ref() {
            ctx.stop();
        }
    }

    /// Stops any active run. World state, actors and module caches are
    /// rebuilt from the pristine maze on the next `run`, so stopping is all
    /// the restoration there is to do.
    pub fn reset(&self) {
        self.stop();
    }

    /// Compiles, wires and executes the user program, resolving when the
    /// run definitively ends.
    ///
    /// Script failures (compile errors included) are reported through the
    /// host's completion callback, not as an `Err` here.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyRunning`] if a run is in progress;
    /// [`EngineError::Lua`] if the VM fails while building the API surface.
    pub async fn run(&self, files: ScriptFiles) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        let maze = Rc::new(RefCell::new(self.original.clone()));
        let world = Rc::new(RefCell::new(WorldState::from_maze(&self.original)));
        let ctx = RunContext::new(Lua::new(), Rc::clone(&maze), world, Rc::clone(&self.host));
        *self.current.borrow_mut() = Some(Rc::clone(&ctx));

        let result = self.drive(&ctx, files).await;

        // Always release input waits and timers on the way out.
        ctx.stop();
        *self.current.borrow_mut() = None;
        result
    }

    async fn drive(&self, ctx: &Rc<RunContext>, files: ScriptFiles) -> Result<(), EngineError> {
        let global_module = self.original.global_module.clone();

        if let Err(err) = precompile(ctx.lua(), &files, global_module.as_deref()) {
            ctx.report_fatal(&to_lua_err(err));
            return Ok(());
        }
        if !files.contains_key(ENTRY_FILE) {
            ctx.report_fatal(&to_lua_err(SimError::Generic(format!(
                "entry file '{ENTRY_FILE}' not found"
            ))));
            return Ok(());
        }

        for spawn in self.original.initial_robots.clone() {
            let position = Position::new(spawn.x, spawn.y);
            if let Err(message) =
                ctx.spawn_robot(&spawn.name, position, spawn.direction, spawn.color)
            {
                ctx.report_fatal(&mlua::Error::RuntimeError(message));
                return Ok(());
            }
        }

        let package_names = scan_package_requires(&files);
        let packages = if package_names.is_empty() {
            HashMap::new()
        } else {
            prefetch(
                &package_names,
                Arc::clone(&self.package_source),
                self.host.as_ref(),
            )
            .await
        };

        let loader = ModuleLoader::new(files, packages);
        loader.register_builtin("rover", mlua::Value::Table(game::build(ctx)?));
        loader.register_builtin("readline", mlua::Value::Table(readline::build(ctx)?));

        tracing::debug!("starting script execution");
        let abort = ctx.abort_handle();
        let outcome = tokio::select! {
            result = execute_scripts(ctx, &loader, global_module.as_deref()) => result,
            () = abort.cancelled() => Ok(()),
        };

        match outcome {
            Err(err) => ctx.report_fatal(&err),
            Ok(()) if !abort.is_aborted() => {
                // Entry finished cleanly; listeners keep the run alive until
                // an explicit win/fail/stop.
                abort.cancelled().await;
            }
            Ok(()) => {}
        }
        Ok(())
    }
}

/// Global module first, then the entry file's top-level code, then its
/// `main` function if the entry defined one.
async fn execute_scripts(
    ctx: &Rc<RunContext>,
    loader: &Rc<ModuleLoader>,
    global_module: Option<&str>,
) -> mlua::Result<()> {
    if let Some(source) = global_module {
        let env = build_env(ctx, loader)?;
        ctx.lua()
            .load(source)
            .set_name(format!("@{GLOBAL_MODULE_NAME}"))
            .set_environment(env)
            .exec_async()
            .await?;
    }

    let source = loader
        .file_source(ENTRY_FILE)
        .ok_or_else(|| to_lua_err(SimError::ModuleNotFound(ENTRY_FILE.to_string())))?;
    // The entry runs outside the loader; seed its cache slot so a
    // require("main") from another file resolves instead of executing the
    // entry's top-level code a second time.
    loader.mark_loaded(ENTRY_FILE, mlua::Value::Boolean(true));
    let env = build_env(ctx, loader)?;
    ctx.lua()
        .load(&source)
        .set_name(format!("@{ENTRY_FILE}"))
        .set_environment(env.clone())
        .exec_async()
        .await?;

    if let Some(main) = env.get::<Option<mlua::Function>>("main")? {
        main.call_async::<()>(()).await?;
    }
    Ok(())
}
