//! Orchestrator-level errors.
//!
//! Script failures never surface here — they go through the host's
//! completion callback. [`EngineError`] covers only misuse of the engine
//! itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The supplied maze violates a structural invariant.
    #[error("invalid maze: {0}")]
    InvalidMaze(String),

    /// `run` was called while a previous run is still in progress.
    #[error("a run is already in progress")]
    AlreadyRunning,

    /// The VM failed while constructing the script API surface.
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}
