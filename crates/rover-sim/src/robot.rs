//! Per-actor state machine and command physics.
//!
//! Every observable operation follows the same pattern: compute the effect,
//! notify the host (state snapshot plus a human-readable log line), then
//! await a cancellable per-robot timer equal to the current speed setting.
//! Peeking operations (`can_move_forward`, `scan`) cost half a timer.
//!
//! The controller is script-agnostic: operations return outcome values
//! ([`MoveOutcome`], [`ScanResult`], ...) and the scripting layer turns them
//! into events. Batch tests drive the controller directly and observe the
//! same results.

use crate::signal::AbortHandle;
use crate::world::WorldState;
use rover_core::{
    Direction, Item, Lock, LogKind, MazeConfig, Position, RobotAnim, RobotState, RunHost, SimError,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Visual delay after an explosion, before the actor's thread is parked.
pub const DESTROY_DELAY_MS: u64 = 1_000;

pub type SharedMaze = Rc<RefCell<MazeConfig>>;
pub type SharedWorld = Rc<RefCell<WorldState>>;

/// Result of a successful `move_forward`, consumed by the event layer.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub from: Position,
    pub to: Position,
    /// Hidden item revealed by standing on its cell.
    pub revealed_item: Option<String>,
}

/// What `scan` saw in the cell ahead.
#[derive(Debug, Clone)]
pub enum ScanResult {
    Door { id: String, open: bool },
    Item(Item),
    Nothing,
}

/// What an echo ray hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoHit {
    Wall,
    Door,
    Item,
    Nothing,
}

/// Deterministic echo result: hit kind plus distance in cells.
///
/// For [`EchoHit::Nothing`] the distance is the number of in-bounds cells the
/// ray crossed before leaving the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReport {
    pub distance: u32,
    pub hit: EchoHit,
}

/// Credential supplied to `open_door`.
#[derive(Debug, Clone)]
pub enum DoorCredential {
    Password(String),
    Items(Vec<String>),
}

/// Machine-readable reason for a refused door operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    NoDoor,
    MissingPassword,
    WrongPassword,
    MissingItems,
    StandingInside,
}

impl LockReason {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NoDoor => "no-door",
            Self::MissingPassword => "missing-password",
            Self::WrongPassword => "wrong-password",
            Self::MissingItems => "missing-items",
            Self::StandingInside => "standing-inside",
        }
    }
}

/// Outcome of `open_door`. Lock rejection is data, not an error, because
/// doors are expected to be probed repeatedly by normal script logic.
#[derive(Debug, Clone)]
pub enum DoorOutcome {
    Opened { id: String },
    AlreadyOpen { id: String },
    Rejected { reason: LockReason, missing: Vec<String> },
}

/// Outcome of `close_door`.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Closed { id: String },
    AlreadyClosed { id: String },
    Refused { reason: LockReason },
}

/// Outcome of `drop_item`.
#[derive(Debug, Clone)]
pub enum DropOutcome {
    Dropped(Item),
    NotHeld,
    CellOccupied,
}

/// Called after an actor finished its destruction sequence; the orchestrator
/// uses it for game-over detection.
pub type DestroyedHook = Rc<dyn Fn()>;

/// Command executor for one robot.
pub struct RobotController {
    state: Rc<RefCell<RobotState>>,
    maze: SharedMaze,
    world: SharedWorld,
    host: Rc<dyn RunHost>,
    abort: AbortHandle,
    on_destroyed: DestroyedHook,
}

impl RobotController {
    pub fn new(
        state: Rc<RefCell<RobotState>>,
        maze: SharedMaze,
        world: SharedWorld,
        host: Rc<dyn RunHost>,
        abort: AbortHandle,
        on_destroyed: DestroyedHook,
    ) -> Self {
        Self {
            state,
            maze,
            world,
            host,
            abort,
            on_destroyed,
        }
    }

    // --- Accessors ---

    #[must_use]
    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> RobotState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.state.borrow().position
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.state.borrow().direction
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().is_destroyed
    }

    #[must_use]
    pub fn state_cell(&self) -> Rc<RefCell<RobotState>> {
        Rc::clone(&self.state)
    }

    // --- Internals ---

    fn guard(&self) -> Result<(), SimError> {
        if self.abort.is_aborted() || self.state.borrow().is_destroyed {
            return Err(SimError::Cancelled);
        }
        self.state.borrow_mut().anim = None;
        Ok(())
    }

    fn speed(&self) -> u64 {
        self.state.borrow().speed_ms
    }

    fn notify(&self) {
        let state = self.state.borrow();
        tracing::trace!(robot = %state.name, position = %state.position, "state update");
        self.host.robot_update(&state.name, &state);
    }

    fn log(&self, message: &str) {
        self.host.log(LogKind::Robot, message);
    }

    fn flush_world(&self) {
        self.world.borrow_mut().flush_updates(self.host.as_ref());
    }

    /// A cell is impassable if it is out of bounds, a grid wall, or a closed
    /// door. Returns the obstacle description for bump messages.
    fn obstacle_at(&self, pos: Position) -> Option<&'static str> {
        let maze = self.maze.borrow();
        if !maze.in_bounds(pos) {
            return Some("the edge of the maze");
        }
        if maze.is_wall(pos) {
            return Some("a wall");
        }
        if let Some(door) = maze.door_at(pos) {
            if !self.world.borrow().is_door_open(&door.id) {
                return Some("a closed door");
            }
        }
        None
    }

    // --- Movement ---

    /// Peeks the cell ahead without moving. Costs half a timer.
    pub async fn can_move_forward(&self) -> Result<bool, SimError> {
        self.guard()?;
        let ahead = self.position().step(self.direction());
        let passable = self.obstacle_at(ahead).is_none();
        self.abort.wait(self.speed() / 2).await?;
        Ok(passable)
    }

    /// Moves one cell forward.
    ///
    /// # Errors
    ///
    /// [`SimError::Crash`] if the cell ahead is impassable; the position is
    /// unchanged. [`SimError::HealthDepleted`] if health is zero after the
    /// move. [`SimError::Cancelled`] on abort.
    pub async fn move_forward(&self) -> Result<MoveOutcome, SimError> {
        self.guard()?;
        let from = self.position();
        let target = from.step(self.direction());

        if let Some(obstacle) = self.obstacle_at(target) {
            let name = self.name();
            let message = format!("{name} bumped into {obstacle} at {target}");
            self.log(&message);
            self.notify();
            self.abort.wait(self.speed()).await?;
            return Err(SimError::Crash(message));
        }

        let revealed_item = {
            let mut state = self.state.borrow_mut();
            state.position = target;
            if let Some(pen) = state.pen.clone() {
                state.trail.push(rover_core::TrailSegment {
                    from,
                    to: target,
                    color: pen.color,
                });
            }
            drop(state);

            // Standing on a hidden item reveals it.
            let maze = self.maze.borrow();
            let mut world = self.world.borrow_mut();
            maze.item_at(target)
                .filter(|item| item.starts_hidden() && !world.is_revealed(item))
                .map(|item| {
                    world.reveal(&item.id);
                    item.id.clone()
                })
        };

        self.log(&format!("{} moved to {target}", self.name()));
        self.notify();
        self.flush_world();
        self.abort.wait(self.speed()).await?;

        if self.state.borrow().health == 0 {
            let message = format!("{} ran out of health", self.name());
            self.log(&message);
            return Err(SimError::HealthDepleted(message));
        }

        Ok(MoveOutcome {
            from,
            to: target,
            revealed_item,
        })
    }

    pub async fn turn_left(&self) -> Result<(), SimError> {
        self.turn(Direction::left, "left").await
    }

    pub async fn turn_right(&self) -> Result<(), SimError> {
        self.turn(Direction::right, "right").await
    }

    async fn turn(&self, rotate: fn(Direction) -> Direction, label: &str) -> Result<(), SimError> {
        self.guard()?;
        let facing = {
            let mut state = self.state.borrow_mut();
            state.direction = rotate(state.direction);
            state.direction
        };
        self.log(&format!("{} turned {label}, now facing {facing}", self.name()));
        self.notify();
        self.abort.wait(self.speed()).await
    }

    // --- Items ---

    /// Picks up the uncollected item on the current cell, if any.
    pub async fn pick_up(&self) -> Result<Option<Item>, SimError> {
        self.guard()?;
        let pos = self.position();

        let picked = {
            let mut maze = self.maze.borrow_mut();
            let mut world = self.world.borrow_mut();
            let found = maze
                .items
                .iter_mut()
                .find(|i| i.position == Some(pos) && !world.is_collected(&i.id));
            match found {
                Some(item) => {
                    world.collect(&item.id);
                    world.reveal(&item.id);
                    item.position = None;
                    let mut held = item.clone();
                    held.position = None;
                    Some(held)
                }
                None => None,
            }
        };

        match picked {
            Some(item) => {
                self.state.borrow_mut().inventory.push(item.clone());
                self.log(&format!("{} picked up {}", self.name(), item.name));
                self.notify();
                self.flush_world();
                self.abort.wait(self.speed()).await?;
                Ok(Some(item))
            }
            None => {
                self.log(&format!("{} found nothing to pick up", self.name()));
                self.abort.wait(self.speed()).await?;
                Ok(None)
            }
        }
    }

    /// Drops a held item onto the current cell.
    ///
    /// Fails as a reported no-op (not an error) when the item is not held or
    /// another item already occupies the cell.
    pub async fn drop_item(&self, item_id: &str) -> Result<DropOutcome, SimError> {
        self.guard()?;
        let pos = self.position();

        if !self.state.borrow().holds(item_id) {
            self.log(&format!("{} is not holding '{item_id}'", self.name()));
            self.abort.wait(self.speed()).await?;
            return Ok(DropOutcome::NotHeld);
        }
        if self.world.borrow().occupied_by_item(&self.maze.borrow(), pos) {
            self.log(&format!(
                "{} cannot drop '{item_id}': another item occupies {pos}",
                self.name()
            ));
            self.abort.wait(self.speed()).await?;
            return Ok(DropOutcome::CellOccupied);
        }

        let mut item = self
            .state
            .borrow_mut()
            .take_item(item_id)
            .expect("holds() checked above");
        item.position = Some(pos);
        {
            let mut maze = self.maze.borrow_mut();
            if let Some(record) = maze.item_mut(item_id) {
                record.position = Some(pos);
            }
            self.world.borrow_mut().drop_at(item_id, pos);
        }

        self.log(&format!("{} dropped {} at {pos}", self.name(), item.name));
        self.notify();
        self.flush_world();
        self.abort.wait(self.speed()).await?;
        Ok(DropOutcome::Dropped(item))
    }

    // --- Sensing ---

    /// Inspects the single cell ahead without moving. Half a timer.
    pub async fn scan(&self) -> Result<ScanResult, SimError> {
        self.guard()?;
        let ahead = self.position().step(self.direction());

        let result = {
            let maze = self.maze.borrow();
            let mut world = self.world.borrow_mut();
            if let Some(door) = maze.door_at(ahead) {
                ScanResult::Door {
                    id: door.id.clone(),
                    open: world.is_door_open(&door.id),
                }
            } else if let Some(item) = maze
                .item_at(ahead)
                .filter(|i| !world.is_collected(&i.id))
            {
                // Scanning implicitly reveals a hidden item.
                world.reveal(&item.id);
                ScanResult::Item(item.clone())
            } else {
                ScanResult::Nothing
            }
        };

        let described = match &result {
            ScanResult::Door { id, open } => {
                format!("a door '{id}' ({})", if *open { "open" } else { "closed" })
            }
            ScanResult::Item(item) => format!("{}", item.name),
            ScanResult::Nothing => "nothing".to_string(),
        };
        self.log(&format!("{} scanned ahead: {described}", self.name()));
        self.flush_world();
        self.abort.wait(self.speed() / 2).await?;
        Ok(result)
    }

    /// Pre-computes the echo ray hit for the current position and facing.
    /// Deterministic and independent of elapsed wall-clock time.
    #[must_use]
    pub fn compute_echo(&self) -> EchoReport {
        let maze = self.maze.borrow();
        let world = self.world.borrow();
        let direction = self.direction();
        let mut cell = self.position();
        let mut distance = 0u32;
        loop {
            cell = cell.step(direction);
            distance += 1;
            if !maze.in_bounds(cell) {
                return EchoReport {
                    distance: distance - 1,
                    hit: EchoHit::Nothing,
                };
            }
            if maze.is_wall(cell) {
                return EchoReport { distance, hit: EchoHit::Wall };
            }
            if let Some(door) = maze.door_at(cell) {
                if !world.is_door_open(&door.id) {
                    return EchoReport { distance, hit: EchoHit::Door };
                }
            }
            if maze
                .item_at(cell)
                .is_some_and(|i| !world.is_collected(&i.id))
            {
                return EchoReport { distance, hit: EchoHit::Item };
            }
        }
    }

    /// Casts a sonar ray: wave launch notification, a full timer delay, then
    /// the hit / no-hit report.
    pub async fn echo(&self) -> Result<EchoReport, SimError> {
        self.guard()?;
        let report = self.compute_echo();

        self.state.borrow_mut().anim = Some(RobotAnim::EchoWave);
        self.log(&format!("{} sent out an echo", self.name()));
        self.notify();
        self.abort.wait(self.speed()).await?;

        match report.hit {
            EchoHit::Nothing => {
                self.state.borrow_mut().anim = None;
                self.log(&format!("{}'s echo faded into the distance", self.name()));
            }
            hit => {
                self.state.borrow_mut().anim = Some(RobotAnim::EchoHit);
                let what = match hit {
                    EchoHit::Wall => "a wall",
                    EchoHit::Door => "a closed door",
                    EchoHit::Item => "an item",
                    EchoHit::Nothing => unreachable!(),
                };
                self.log(&format!(
                    "{}'s echo hit {what} after {} cells",
                    self.name(),
                    report.distance
                ));
            }
        }
        self.notify();
        Ok(report)
    }

    // --- Doors ---

    fn door_ahead(&self) -> Option<rover_core::Door> {
        let maze = self.maze.borrow();
        maze.door_at(self.position().step(self.direction())).cloned()
    }

    /// Opens the door directly ahead, validating any lock.
    pub async fn open_door(
        &self,
        credential: Option<DoorCredential>,
    ) -> Result<DoorOutcome, SimError> {
        self.guard()?;
        let Some(door) = self.door_ahead() else {
            self.log(&format!("{} sees no door to open", self.name()));
            self.abort.wait(self.speed()).await?;
            return Ok(DoorOutcome::Rejected {
                reason: LockReason::NoDoor,
                missing: vec![],
            });
        };

        if self.world.borrow().is_door_open(&door.id) {
            self.log(&format!("door '{}' is already open", door.id));
            self.abort.wait(self.speed()).await?;
            return Ok(DoorOutcome::AlreadyOpen { id: door.id });
        }

        if let Some(rejection) = self.check_lock(&door, credential.as_ref()) {
            let (reason, missing) = rejection;
            match reason {
                LockReason::MissingItems => self.log(&format!(
                    "door '{}' stays locked: missing required items: {}",
                    door.id,
                    missing.join(", ")
                )),
                LockReason::WrongPassword => {
                    self.log(&format!("door '{}' stays locked: wrong password", door.id));
                }
                LockReason::MissingPassword => {
                    self.log(&format!("door '{}' is password-locked", door.id));
                }
                _ => self.log(&format!("door '{}' stays locked", door.id)),
            }
            self.abort.wait(self.speed()).await?;
            return Ok(DoorOutcome::Rejected { reason, missing });
        }

        self.world.borrow_mut().set_door_open(&door, true);
        self.log(&format!("{} opened door '{}'", self.name(), door.id));
        self.notify();
        self.flush_world();
        self.abort.wait(self.speed()).await?;
        Ok(DoorOutcome::Opened { id: door.id })
    }

    /// Lock validation. `None` means the door may open.
    fn check_lock(
        &self,
        door: &rover_core::Door,
        credential: Option<&DoorCredential>,
    ) -> Option<(LockReason, Vec<String>)> {
        match &door.lock {
            None => None,
            Some(Lock::Password { secret }) => match credential {
                Some(DoorCredential::Password(given)) if given == secret => None,
                Some(DoorCredential::Password(_)) => Some((LockReason::WrongPassword, vec![])),
                _ => Some((LockReason::MissingPassword, vec![])),
            },
            Some(Lock::Items { required }) => {
                let supplied: &[String] = match credential {
                    Some(DoorCredential::Items(ids)) => ids,
                    _ => &[],
                };
                let state = self.state.borrow();
                let missing: Vec<String> = required
                    .iter()
                    .filter(|id| !supplied.contains(id) || !state.holds(id))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some((LockReason::MissingItems, missing))
                }
            }
        }
    }

    /// Closes the door ahead. Refused while the actor stands inside a door,
    /// to avoid self-trapping.
    pub async fn close_door(&self) -> Result<CloseOutcome, SimError> {
        self.guard()?;
        let standing_in_door = {
            let maze = self.maze.borrow();
            maze.door_at(self.position()).is_some()
        };
        if standing_in_door {
            self.log(&format!(
                "{} cannot close a door while standing in it",
                self.name()
            ));
            self.abort.wait(self.speed()).await?;
            return Ok(CloseOutcome::Refused {
                reason: LockReason::StandingInside,
            });
        }

        let Some(door) = self.door_ahead() else {
            self.log(&format!("{} sees no door to close", self.name()));
            self.abort.wait(self.speed()).await?;
            return Ok(CloseOutcome::Refused {
                reason: LockReason::NoDoor,
            });
        };

        if !self.world.borrow().is_door_open(&door.id) {
            self.log(&format!("door '{}' is already closed", door.id));
            self.abort.wait(self.speed()).await?;
            return Ok(CloseOutcome::AlreadyClosed { id: door.id });
        }

        self.world.borrow_mut().set_door_open(&door, false);
        self.log(&format!("{} closed door '{}'", self.name(), door.id));
        self.notify();
        self.flush_world();
        self.abort.wait(self.speed()).await?;
        Ok(CloseOutcome::Closed { id: door.id })
    }

    // --- Health ---

    /// Reduces health, clamped at zero; zero health triggers destruction.
    pub async fn damage(&self, amount: u32) -> Result<(), SimError> {
        self.guard()?;
        let left = self.state.borrow_mut().apply_damage(amount);
        self.log(&format!(
            "{} took {amount} damage ({left} health left)",
            self.name()
        ));
        self.notify();
        self.abort.wait(self.speed()).await?;
        if left == 0 {
            return self.destroy().await;
        }
        Ok(())
    }

    /// Destroys this actor. Always returns [`SimError::Cancelled`] so the
    /// calling script thread is parked by the command boundary; siblings
    /// keep running unless the orchestrator decides the game is over.
    pub async fn destroy(&self) -> Result<(), SimError> {
        if self.abort.is_aborted() {
            return Err(SimError::Cancelled);
        }
        {
            let mut state = self.state.borrow_mut();
            if state.is_destroyed {
                return Err(SimError::Cancelled);
            }
            state.health = 0;
            state.is_destroyed = true;
            state.anim = Some(RobotAnim::Explosion);
        }
        tracing::debug!(robot = %self.name(), "destroyed");
        self.log(&format!("{} was destroyed", self.name()));
        self.notify();
        self.abort.wait(DESTROY_DELAY_MS).await?;
        (self.on_destroyed)();
        Err(SimError::Cancelled)
    }

    // --- Pure setters: state notification only, no timing cost ---

    pub fn set_speed(&self, ms: u64) {
        self.state.borrow_mut().speed_ms = ms;
        self.notify();
    }

    pub fn set_pen(&self, pen: Option<rover_core::Pen>) {
        self.state.borrow_mut().pen = pen;
        self.notify();
    }

    pub fn set_appearance(&self, appearance: Option<String>) {
        self.state.borrow_mut().appearance = appearance;
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_core::testing::RecordingHost;
    use rover_core::{Door, Item, MazeConfig, Pen, RobotState};
    use std::cell::Cell;

    fn item(id: &str, pos: Option<Position>) -> Item {
        Item {
            id: id.into(),
            name: id.into(),
            icon: None,
            tags: vec![],
            image: None,
            position: pos,
            is_revealed: None,
            extra: serde_json::Map::new(),
        }
    }

    fn corridor_maze() -> MazeConfig {
        // Open 5x1 corridor; entities added per test.
        MazeConfig {
            width: 5,
            height: 1,
            walls: vec![vec![false; 5]],
            initial_robots: vec![],
            items: vec![],
            doors: vec![],
            pressure_plates: vec![],
            global_module: None,
        }
    }

    struct Rig {
        ctrl: RobotController,
        host: Rc<RecordingHost>,
        maze: SharedMaze,
        world: SharedWorld,
        destroyed_calls: Rc<Cell<u32>>,
        abort: AbortSignal,
    }

    use crate::signal::AbortSignal;

    fn rig(maze: MazeConfig, pos: Position, dir: Direction) -> Rig {
        let host = Rc::new(RecordingHost::new());
        let world = Rc::new(RefCell::new(WorldState::from_maze(&maze)));
        let maze: SharedMaze = Rc::new(RefCell::new(maze));
        let abort = AbortSignal::new();
        let mut state = RobotState::new("karel", pos, dir);
        state.speed_ms = 10;
        let destroyed_calls = Rc::new(Cell::new(0));
        let calls = Rc::clone(&destroyed_calls);
        let ctrl = RobotController::new(
            Rc::new(RefCell::new(state)),
            Rc::clone(&maze),
            Rc::clone(&world),
            host.clone() as Rc<dyn RunHost>,
            abort.handle(),
            Rc::new(move || calls.set(calls.get() + 1)),
        );
        Rig {
            ctrl,
            host,
            maze,
            world,
            destroyed_calls,
            abort,
        }
    }

    // --- Movement and crashes ---

    #[tokio::test(start_paused = true)]
    async fn move_forward_advances_one_cell() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        let outcome = r.ctrl.move_forward().await.expect("open cell ahead");
        assert_eq!(outcome.from, Position::new(0, 0));
        assert_eq!(outcome.to, Position::new(1, 0));
        assert_eq!(r.ctrl.position(), Position::new(1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn crash_into_wall_leaves_position_unchanged() {
        let mut maze = corridor_maze();
        maze.walls[0][1] = true;
        let r = rig(maze, Position::new(0, 0), Direction::East);

        let err = r.ctrl.move_forward().await.unwrap_err();
        assert!(matches!(err, SimError::Crash(_)));
        assert_eq!(r.ctrl.position(), Position::new(0, 0));
        assert!(r.host.logged("bumped into a wall"));
    }

    #[tokio::test(start_paused = true)]
    async fn crash_into_edge_of_maze() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::West);
        let err = r.ctrl.move_forward().await.unwrap_err();
        assert!(matches!(err, SimError::Crash(_)));
        assert_eq!(r.ctrl.position(), Position::new(0, 0));
        assert!(r.host.logged("edge of the maze"));
    }

    #[tokio::test(start_paused = true)]
    async fn crash_into_closed_door_but_pass_open_one() {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(1, 0),
            open: false,
            lock: None,
        });
        let r = rig(maze, Position::new(0, 0), Direction::East);

        let err = r.ctrl.move_forward().await.unwrap_err();
        assert!(matches!(err, SimError::Crash(_)));

        let door = r.maze.borrow().door("d1").unwrap().clone();
        r.world.borrow_mut().set_door_open(&door, true);
        r.ctrl.move_forward().await.expect("open door is passable");
        assert_eq!(r.ctrl.position(), Position::new(1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn can_move_forward_peeks_without_moving() {
        let mut maze = corridor_maze();
        maze.walls[0][3] = true;
        let r = rig(maze, Position::new(2, 0), Direction::East);
        assert!(!r.ctrl.can_move_forward().await.unwrap());
        assert_eq!(r.ctrl.position(), Position::new(2, 0));
        r.ctrl.turn_left().await.unwrap();
        r.ctrl.turn_left().await.unwrap();
        // Turned around, the corridor back to (0, 0) is open.
        assert!(r.ctrl.can_move_forward().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn turns_are_cyclic() {
        let r = rig(corridor_maze(), Position::new(2, 0), Direction::North);
        r.ctrl.turn_right().await.unwrap();
        assert_eq!(r.ctrl.direction(), Direction::East);
        r.ctrl.turn_left().await.unwrap();
        r.ctrl.turn_left().await.unwrap();
        assert_eq!(r.ctrl.direction(), Direction::West);
    }

    #[tokio::test(start_paused = true)]
    async fn pen_draws_trail() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        r.ctrl.set_pen(Some(Pen { color: "red".into() }));
        r.ctrl.move_forward().await.unwrap();
        r.ctrl.move_forward().await.unwrap();
        let state = r.ctrl.snapshot();
        assert_eq!(state.trail.len(), 2);
        assert_eq!(state.trail[1].to, Position::new(2, 0));
        assert_eq!(state.trail[0].color, "red");
    }

    #[tokio::test(start_paused = true)]
    async fn moving_onto_hidden_item_reveals_it() {
        let mut maze = corridor_maze();
        let mut hidden = item("gem", Some(Position::new(1, 0)));
        hidden.is_revealed = Some(false);
        maze.items.push(hidden);
        let r = rig(maze, Position::new(0, 0), Direction::East);

        let outcome = r.ctrl.move_forward().await.unwrap();
        assert_eq!(outcome.revealed_item.as_deref(), Some("gem"));
        let maze = r.maze.borrow();
        assert!(r.world.borrow().is_revealed(maze.item("gem").unwrap()));
    }

    // --- Pickup / drop ---

    #[tokio::test(start_paused = true)]
    async fn pickup_walk_drop_scenario() {
        let mut maze = corridor_maze();
        maze.items.push(item("key-1", Some(Position::new(2, 0))));
        let r = rig(maze, Position::new(2, 0), Direction::East);

        let picked = r.ctrl.pick_up().await.unwrap().expect("item on cell");
        assert_eq!(picked.id, "key-1");
        assert!(picked.position.is_none());
        assert_eq!(r.ctrl.snapshot().inventory.len(), 1);

        r.ctrl.move_forward().await.unwrap();
        r.ctrl.move_forward().await.unwrap();

        let outcome = r.ctrl.drop_item("key-1").await.unwrap();
        let DropOutcome::Dropped(dropped) = outcome else {
            panic!("expected Dropped, got {outcome:?}");
        };
        assert_eq!(dropped.position, Some(Position::new(4, 0)));
        assert_eq!(r.ctrl.snapshot().inventory.len(), 0);

        // Immediately re-pickupable.
        let again = r.ctrl.pick_up().await.unwrap().expect("re-pickup");
        assert_eq!(again.id, "key-1");
    }

    #[tokio::test(start_paused = true)]
    async fn pickup_on_empty_cell_returns_none() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        assert!(r.ctrl.pick_up().await.unwrap().is_none());
        assert!(r.host.logged("nothing to pick up"));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_refused_when_cell_occupied() {
        let mut maze = corridor_maze();
        maze.items.push(item("key-1", Some(Position::new(0, 0))));
        maze.items.push(item("rock", Some(Position::new(1, 0))));
        let r = rig(maze, Position::new(0, 0), Direction::East);

        r.ctrl.pick_up().await.unwrap().expect("pick key-1");
        r.ctrl.move_forward().await.unwrap();

        let outcome = r.ctrl.drop_item("key-1").await.unwrap();
        assert!(matches!(outcome, DropOutcome::CellOccupied));
        assert!(r.ctrl.snapshot().holds("key-1"), "item still held");
    }

    #[tokio::test(start_paused = true)]
    async fn drop_of_unheld_item_is_a_reported_noop() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        let outcome = r.ctrl.drop_item("ghost").await.unwrap();
        assert!(matches!(outcome, DropOutcome::NotHeld));
    }

    // --- Scan / echo ---

    #[tokio::test(start_paused = true)]
    async fn scan_sees_door_snapshot_and_items() {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(1, 0),
            open: false,
            lock: None,
        });
        let r = rig(maze, Position::new(0, 0), Direction::East);

        match r.ctrl.scan().await.unwrap() {
            ScanResult::Door { id, open } => {
                assert_eq!(id, "d1");
                assert!(!open);
            }
            other => panic!("expected door, got {other:?}"),
        }
        assert_eq!(r.ctrl.position(), Position::new(0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_reveals_hidden_item() {
        let mut maze = corridor_maze();
        let mut hidden = item("gem", Some(Position::new(1, 0)));
        hidden.is_revealed = Some(false);
        maze.items.push(hidden);
        let r = rig(maze, Position::new(0, 0), Direction::East);

        match r.ctrl.scan().await.unwrap() {
            ScanResult::Item(i) => assert_eq!(i.id, "gem"),
            other => panic!("expected item, got {other:?}"),
        }
        let maze = r.maze.borrow();
        assert!(r.world.borrow().is_revealed(maze.item("gem").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn echo_distance_is_deterministic() {
        let mut maze = corridor_maze();
        maze.walls[0][3] = true;
        let r = rig(maze, Position::new(0, 0), Direction::East);

        let first = r.ctrl.compute_echo();
        assert_eq!(first, EchoReport { distance: 3, hit: EchoHit::Wall });

        // Same geometry, same answer — independent of time passing.
        tokio::time::advance(std::time::Duration::from_secs(60)).await;
        assert_eq!(r.ctrl.compute_echo(), first);

        let report = r.ctrl.echo().await.unwrap();
        assert_eq!(report, first);
    }

    #[tokio::test(start_paused = true)]
    async fn echo_off_grid_is_a_no_hit() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        let report = r.ctrl.compute_echo();
        assert_eq!(report.hit, EchoHit::Nothing);
        assert_eq!(report.distance, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn echo_stops_at_closed_door_and_item() {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(2, 0),
            open: false,
            lock: None,
        });
        let r = rig(maze, Position::new(0, 0), Direction::East);
        assert_eq!(r.ctrl.compute_echo().hit, EchoHit::Door);

        let door = r.maze.borrow().door("d1").unwrap().clone();
        r.world.borrow_mut().set_door_open(&door, true);
        assert_eq!(r.ctrl.compute_echo().hit, EchoHit::Nothing);

        r.maze
            .borrow_mut()
            .items
            .push(item("rock", Some(Position::new(3, 0))));
        let report = r.ctrl.compute_echo();
        assert_eq!(report, EchoReport { distance: 3, hit: EchoHit::Item });
    }

    // --- Doors and locks ---

    fn locked_door_maze(lock: Lock) -> MazeConfig {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(1, 0),
            open: false,
            lock: Some(lock),
        });
        maze
    }

    #[tokio::test(start_paused = true)]
    async fn password_lock_exact_match_only() {
        let maze = locked_door_maze(Lock::Password { secret: "sesame".into() });
        let r = rig(maze, Position::new(0, 0), Direction::East);

        let outcome = r
            .ctrl
            .open_door(Some(DoorCredential::Password("Sesame".into())))
            .await
            .unwrap();
        assert!(
            matches!(outcome, DoorOutcome::Rejected { reason: LockReason::WrongPassword, .. }),
            "case-sensitive match, got {outcome:?}"
        );

        let outcome = r.ctrl.open_door(None).await.unwrap();
        assert!(matches!(
            outcome,
            DoorOutcome::Rejected { reason: LockReason::MissingPassword, .. }
        ));

        let outcome = r
            .ctrl
            .open_door(Some(DoorCredential::Password("sesame".into())))
            .await
            .unwrap();
        assert!(matches!(outcome, DoorOutcome::Opened { .. }));

        // Subsequent opens report already-open.
        let outcome = r.ctrl.open_door(None).await.unwrap();
        assert!(matches!(outcome, DoorOutcome::AlreadyOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn item_lock_requires_credential_and_inventory() {
        let mut maze = locked_door_maze(Lock::Items { required: vec!["key-1".into()] });
        maze.items.push(item("key-1", Some(Position::new(0, 0))));
        let r = rig(maze, Position::new(0, 0), Direction::East);

        // No credential: rejected, missing item named.
        let outcome = r.ctrl.open_door(None).await.unwrap();
        let DoorOutcome::Rejected { reason, missing } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(reason, LockReason::MissingItems);
        assert_eq!(missing, vec!["key-1".to_string()]);

        // Credential supplied but item not held: still rejected.
        let outcome = r
            .ctrl
            .open_door(Some(DoorCredential::Items(vec!["key-1".into()])))
            .await
            .unwrap();
        assert!(matches!(outcome, DoorOutcome::Rejected { .. }));

        // Held and supplied: opens.
        r.ctrl.pick_up().await.unwrap().expect("pick key");
        let outcome = r
            .ctrl
            .open_door(Some(DoorCredential::Items(vec!["key-1".into()])))
            .await
            .unwrap();
        assert!(matches!(outcome, DoorOutcome::Opened { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn close_door_refused_while_standing_inside() {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(1, 0),
            open: true,
            lock: None,
        });
        let r = rig(maze, Position::new(1, 0), Direction::East);

        let outcome = r.ctrl.close_door().await.unwrap();
        assert!(matches!(
            outcome,
            CloseOutcome::Refused { reason: LockReason::StandingInside }
        ));
        assert!(r.world.borrow().is_door_open("d1"));
        assert!(r.host.logged("standing in it"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_door_ahead_then_already_closed() {
        let mut maze = corridor_maze();
        maze.doors.push(Door {
            id: "d1".into(),
            position: Position::new(1, 0),
            open: true,
            lock: None,
        });
        let r = rig(maze, Position::new(0, 0), Direction::East);

        assert!(matches!(
            r.ctrl.close_door().await.unwrap(),
            CloseOutcome::Closed { .. }
        ));
        assert!(matches!(
            r.ctrl.close_door().await.unwrap(),
            CloseOutcome::AlreadyClosed { .. }
        ));
    }

    // --- Damage / destroy ---

    #[tokio::test(start_paused = true)]
    async fn damage_clamps_and_destroys_at_zero() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        r.ctrl.damage(40).await.unwrap();
        assert_eq!(r.ctrl.snapshot().health, 60);

        let err = r.ctrl.damage(200).await.unwrap_err();
        assert_eq!(err, SimError::Cancelled, "destroy parks the thread");
        let state = r.ctrl.snapshot();
        assert_eq!(state.health, 0);
        assert!(state.is_destroyed);
        assert_eq!(r.destroyed_calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn depleted_health_fails_the_move_after_it_lands() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        r.ctrl.state_cell().borrow_mut().health = 0;

        let err = r.ctrl.move_forward().await.unwrap_err();
        assert!(matches!(err, SimError::HealthDepleted(_)));
        // The move itself lands; only the aftermath is fatal.
        assert_eq!(r.ctrl.position(), Position::new(1, 0));
        assert!(r.host.logged("ran out of health"));
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_robot_rejects_further_commands() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        let _ = r.ctrl.destroy().await;
        let err = r.ctrl.move_forward().await.unwrap_err();
        assert_eq!(err, SimError::Cancelled);
        // State is kept, not removed.
        assert!(r.ctrl.snapshot().is_destroyed);
    }

    // --- Cancellation ---

    #[tokio::test(start_paused = true)]
    async fn aborted_run_cancels_every_command() {
        let r = rig(corridor_maze(), Position::new(0, 0), Direction::East);
        r.abort.abort();
        assert_eq!(r.ctrl.move_forward().await.unwrap_err(), SimError::Cancelled);
        assert_eq!(r.ctrl.turn_left().await.unwrap_err(), SimError::Cancelled);
        assert_eq!(r.ctrl.pick_up().await.unwrap_err(), SimError::Cancelled);
        assert_eq!(r.ctrl.position(), Position::new(0, 0));
    }
}
