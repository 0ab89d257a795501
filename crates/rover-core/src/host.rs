//! The callback contract between the engine and its host.
//!
//! The host — a CLI, a UI, a test harness — receives everything the engine
//! wants to show through a single [`RunHost`] trait object. The engine never
//! renders; it only notifies. All methods default to no-ops so hosts
//! implement exactly the callbacks they care about.

use crate::robot::RobotState;

/// Origin of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Emitted by user script code (`console.log`, `console.error`).
    User,
    /// Emitted by a robot action (moves, bumps, pickups, ...).
    Robot,
}

/// Host callback surface.
///
/// Implementations are invoked from the engine's single-threaded event loop;
/// they must not block for long.
pub trait RunHost {
    /// A human-readable log line.
    fn log(&self, _kind: LogKind, _message: &str) {}

    /// Something in the shared world changed; re-render if you care.
    fn state_changed(&self) {}

    /// A specific robot's state changed.
    fn robot_update(&self, _name: &str, _state: &RobotState) {}

    /// The run definitively ended. Fired exactly once per run, and only for
    /// win / fail / uncaught fatal error — never for a plain stop.
    fn completed(&self, _success: bool, _message: &str) {}

    /// A script is blocked waiting for input; answer via the engine's
    /// `resolve_input`.
    fn input_requested(&self, _prompt: &str) {}
}

/// Host that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl RunHost for NullHost {}
