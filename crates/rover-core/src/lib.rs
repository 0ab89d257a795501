//! Core types for the Rover simulation engine.
//!
//! This crate defines the data model shared by every layer:
//!
//! - [`MazeConfig`] and its entities ([`Item`], [`Door`], [`PressurePlate`])
//! - [`RobotState`] — the observable state of one scripted actor
//! - [`SimError`] — the failure taxonomy (cancellation, crash, health, ...)
//! - [`RunHost`] — the callback contract between the engine and its host
//!
//! Nothing here depends on the script runtime or on any async machinery;
//! higher layers (`rover-sim`, `rover-lua`, `rover-engine`) build on these
//! types.

pub mod error;
pub mod host;
pub mod maze;
pub mod robot;
pub mod testing;

pub use error::SimError;
pub use host::{LogKind, NullHost, RunHost};
pub use maze::{Direction, Door, Item, Lock, MazeConfig, Position, PressurePlate, RobotSpawn};
pub use robot::{Pen, RobotAnim, RobotState, TrailSegment, DEFAULT_SPEED_MS, MAX_HEALTH};
