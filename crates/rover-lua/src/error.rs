//! Error bridging between the simulation and the Lua VM.
//!
//! Simulation failures cross into Lua as external errors so script `pcall`
//! sees a message derived from [`SimError`]'s display form; on the way back
//! out the engine recovers the typed error to decide whether the failure is
//! fatal, catchable, or plain cancellation.

use rover_core::SimError;

/// Wraps a simulation error for propagation into script code.
#[must_use]
pub fn to_lua_err(err: SimError) -> mlua::Error {
    mlua::Error::external(err)
}

/// Recovers the original [`SimError`] from an error that travelled through
/// the Lua VM, walking callback and context wrappers.
#[must_use]
pub fn sim_error_from(err: &mlua::Error) -> Option<SimError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => sim_error_from(cause),
        mlua::Error::WithContext { cause, .. } => sim_error_from(cause),
        mlua::Error::ExternalError(external) => (**external).downcast_ref::<SimError>().cloned(),
        _ => None,
    }
}

/// True if the error is (or wraps) plain cancellation.
#[must_use]
pub fn is_cancelled(err: &mlua::Error) -> bool {
    matches!(sim_error_from(err), Some(SimError::Cancelled))
}
