//! Per-run shared state behind the script API.
//!
//! A [`RunContext`] is created fresh for every `run()` and discarded when
//! the run ends. It owns the abort signal, the live-actor registry, the
//! pending-input slot and the listener registries; the binding layer and the
//! orchestrator both act through it. Everything is `Rc`-shared on the
//! single-threaded event loop; actor handles hold a `Weak` back-reference so
//! the context tears down cleanly when the run is dropped.

use indexmap::IndexMap;
use mlua::{Function, Lua, MultiValue};
use rover_core::{Direction, LogKind, Position, RobotState, RunHost, SimError};
use rover_sim::{AbortHandle, AbortSignal, RobotController, SharedMaze, SharedWorld};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tokio::sync::oneshot;

/// Marker prefixed to fatal script errors in the host log.
pub const SCRIPT_ERROR_MARKER: &str = "[script error]";

struct PendingInput {
    prompt: String,
    tx: oneshot::Sender<String>,
}

/// One actor: its physics controller plus script-facing listener registry.
pub struct RobotHandle {
    pub ctrl: RobotController,
    ctx: Weak<RunContext>,
    listeners: RefCell<HashMap<String, Vec<Function>>>,
}

impl RobotHandle {
    /// Upgrades the back-reference; `None` means the run is already gone.
    #[must_use]
    pub fn context(&self) -> Option<Rc<RunContext>> {
        self.ctx.upgrade()
    }

    /// Event names are case-insensitive (`"pickUp"` and `"pickup"` are the
    /// same listener key).
    pub fn on(&self, event: &str, handler: Function) {
        self.listeners
            .borrow_mut()
            .entry(event.to_ascii_lowercase())
            .or_default()
            .push(handler);
    }

    #[must_use]
    pub fn handlers(&self, event: &str) -> Vec<Function> {
        self.listeners
            .borrow()
            .get(&event.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RobotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotHandle")
            .field("robot", &self.ctrl.name())
            .field("position", &self.ctrl.position())
            .finish_non_exhaustive()
    }
}

/// Run-scoped engine state shared between the orchestrator and the script
/// bindings.
pub struct RunContext {
    lua: Lua,
    maze: SharedMaze,
    world: SharedWorld,
    host: Rc<dyn RunHost>,
    abort: AbortSignal,
    robots: RefCell<IndexMap<String, Rc<RobotHandle>>>,
    running: Cell<bool>,
    completed: Cell<bool>,
    pending_input: RefCell<Option<PendingInput>>,
    /// `game.on` listeners, keyed by event name (`robotCreated`).
    game_listeners: RefCell<HashMap<String, Vec<Function>>>,
    /// Door/item/plate listeners, keyed `"{kind}:{id}:{event}"`.
    entity_listeners: RefCell<HashMap<String, Vec<Function>>>,
}

impl RunContext {
    #[must_use]
    pub fn new(lua: Lua, maze: SharedMaze, world: SharedWorld, host: Rc<dyn RunHost>) -> Rc<Self> {
        Rc::new(Self {
            lua,
            maze,
            world,
            host,
            abort: AbortSignal::new(),
            robots: RefCell::new(IndexMap::new()),
            running: Cell::new(true),
            completed: Cell::new(false),
            pending_input: RefCell::new(None),
            game_listeners: RefCell::new(HashMap::new()),
            entity_listeners: RefCell::new(HashMap::new()),
        })
    }

    // --- Accessors ---

    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    #[must_use]
    pub fn maze(&self) -> SharedMaze {
        Rc::clone(&self.maze)
    }

    #[must_use]
    pub fn world(&self) -> SharedWorld {
        Rc::clone(&self.world)
    }

    #[must_use]
    pub fn host(&self) -> Rc<dyn RunHost> {
        Rc::clone(&self.host)
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.handle()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.get() && !self.abort.is_aborted()
    }

    // --- Lifecycle ---

    /// Definitively ends the run: fires the completion callback (first call
    /// wins) and aborts every in-flight wait.
    pub fn complete(&self, success: bool, message: &str) {
        if !self.completed.replace(true) {
            self.host.completed(success, message);
        }
        self.shutdown();
    }

    /// Ends the run without a completion callback (a plain stop).
    pub fn stop(&self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        self.running.set(false);
        // Dropping the sender wakes any blocked input wait via abort below.
        self.pending_input.borrow_mut().take();
        self.abort.abort();
    }

    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.completed.get()
    }

    /// Logs a fatal script error with a distinct marker and, unless it is
    /// plain cancellation, reports a failed completion.
    pub fn report_fatal(&self, err: &mlua::Error) {
        let message = match crate::error::sim_error_from(err) {
            Some(SimError::Cancelled) => return,
            Some(sim) => sim.to_string(),
            None => err.to_string(),
        };
        self.host
            .log(LogKind::User, &format!("{SCRIPT_ERROR_MARKER} {message}"));
        self.complete(false, &message);
    }

    // --- Input handshake ---

    /// Blocks the calling script until the host answers via
    /// [`resolve_input`](Self::resolve_input), or the run is aborted.
    ///
    /// # Errors
    ///
    /// [`SimError::Cancelled`] if the run ends before an answer arrives.
    pub async fn request_input(&self, prompt: &str) -> Result<String, SimError> {
        if self.abort.is_aborted() {
            return Err(SimError::Cancelled);
        }
        let (tx, rx) = oneshot::channel();
        *self.pending_input.borrow_mut() = Some(PendingInput {
            prompt: prompt.to_string(),
            tx,
        });
        self.host.input_requested(prompt);

        let handle = self.abort.handle();
        tokio::select! {
            () = handle.cancelled() => Err(SimError::Cancelled),
            answer = rx => answer.map_err(|_| SimError::Cancelled),
        }
    }

    /// Delivers the pending input answer. Returns false if nothing was
    /// waiting.
    pub fn resolve_input(&self, value: &str) -> bool {
        match self.pending_input.borrow_mut().take() {
            Some(pending) => pending.tx.send(value.to_string()).is_ok(),
            None => false,
        }
    }

    /// Prompt text of the blocked input request, if one is pending.
    #[must_use]
    pub fn pending_prompt(&self) -> Option<String> {
        self.pending_input
            .borrow()
            .as_ref()
            .map(|p| p.prompt.clone())
    }

    // --- Actor registry ---

    /// Registers a new actor. The spawn cell must be in-bounds and the name
    /// unused.
    ///
    /// # Errors
    ///
    /// A human-readable validation message; surfaced to scripts as a normal
    /// runtime error.
    pub fn spawn_robot(
        self: &Rc<Self>,
        name: &str,
        position: Position,
        direction: Direction,
        color: Option<String>,
    ) -> Result<Rc<RobotHandle>, String> {
        if !self.maze.borrow().in_bounds(position) {
            return Err(format!(
                "robot '{name}' spawn cell {position} is out of bounds"
            ));
        }
        if self.robots.borrow().contains_key(name) {
            return Err(format!("a robot named '{name}' already exists"));
        }

        let state = RobotState::new(name, position, direction).with_color(color);
        let state = Rc::new(RefCell::new(state));

        let weak = Rc::downgrade(self);
        let destroyed_name = name.to_string();
        let on_destroyed = Rc::new(move || {
            if let Some(ctx) = weak.upgrade() {
                ctx.robot_destroyed(&destroyed_name);
            }
        });

        let ctrl = RobotController::new(
            Rc::clone(&state),
            self.maze(),
            self.world(),
            self.host(),
            self.abort_handle(),
            on_destroyed,
        );
        let handle = Rc::new(RobotHandle {
            ctrl,
            ctx: Rc::downgrade(self),
            listeners: RefCell::new(HashMap::new()),
        });
        self.robots
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&handle));

        self.host.robot_update(name, &state.borrow());
        tracing::debug!(robot = %name, %position, "robot registered");
        Ok(handle)
    }

    fn robot_destroyed(&self, name: &str) {
        let all_gone = self
            .robots
            .borrow()
            .values()
            .all(|h| h.ctrl.is_destroyed());
        tracing::debug!(robot = %name, all_gone, "robot destroyed");
        if all_gone {
            self.complete(false, "all robots were destroyed");
        }
    }

    #[must_use]
    pub fn robot(&self, name: &str) -> Option<Rc<RobotHandle>> {
        self.robots.borrow().get(name).cloned()
    }

    /// Live actor list in registration order. Destroyed actors stay listed.
    #[must_use]
    pub fn robots(&self) -> Vec<Rc<RobotHandle>> {
        self.robots.borrow().values().cloned().collect()
    }

    /// Positions of all non-destroyed actors, for plate activation.
    #[must_use]
    pub fn robot_positions(&self) -> Vec<Position> {
        self.robots
            .borrow()
            .values()
            .filter(|h| !h.ctrl.is_destroyed())
            .map(|h| h.ctrl.position())
            .collect()
    }

    // --- Listeners ---

    pub fn on_game_event(&self, event: &str, handler: Function) {
        self.game_listeners
            .borrow_mut()
            .entry(event.to_ascii_lowercase())
            .or_default()
            .push(handler);
    }

    #[must_use]
    pub fn game_handlers(&self, event: &str) -> Vec<Function> {
        self.game_listeners
            .borrow()
            .get(&event.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn on_entity_event(&self, kind: &str, id: &str, event: &str, handler: Function) {
        self.entity_listeners
            .borrow_mut()
            .entry(format!("{kind}:{id}:{}", event.to_ascii_lowercase()))
            .or_default()
            .push(handler);
    }

    #[must_use]
    pub fn entity_handlers(&self, kind: &str, id: &str, event: &str) -> Vec<Function> {
        self.entity_listeners
            .borrow()
            .get(&format!("{kind}:{id}:{}", event.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_default()
    }

    /// Invokes handlers fire-and-forget on the local task set. A handler
    /// error ends the run like any uncaught script error; cancellation is
    /// ignored.
    pub fn dispatch(self: &Rc<Self>, handlers: Vec<Function>, args: MultiValue) {
        for handler in handlers {
            let ctx = Rc::clone(self);
            let args = args.clone();
            tokio::task::spawn_local(async move {
                if let Err(err) = handler.call_async::<()>(args).await {
                    ctx.report_fatal(&err);
                }
            });
        }
    }
}
