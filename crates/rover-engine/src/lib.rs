//! Top-level orchestrator for the Rover simulation engine.
//!
//! Hosts construct a [`Simulation`] with a [`MazeConfig`](rover_core::MazeConfig)
//! and a [`RunHost`](rover_core::RunHost), then drive it on a tokio
//! current-thread runtime inside a `LocalSet` — script event handlers are
//! spawned as local tasks.

pub mod error;
pub mod sim;

pub use error::EngineError;
pub use sim::{ScriptFiles, Simulation};
