//! Failure taxonomy for the simulation engine.
//!
//! | Variant | Code | Catchable by scripts |
//! |---------|------|----------------------|
//! | [`SimError::Cancelled`] | `CANCELLED` | No — swallowed at the command boundary |
//! | [`SimError::Crash`] | `CRASH` | Yes |
//! | [`SimError::HealthDepleted`] | `HEALTH_DEPLETED` | Yes |
//! | [`SimError::Compile`] | `COMPILE` | No — aborts before execution |
//! | [`SimError::ModuleNotFound`] | `MODULE_NOT_FOUND` | Yes |
//! | [`SimError::Generic`] | `GENERIC` | Yes |
//!
//! Cancellation is not a user-visible failure: it marks a deliberately
//! stopped run or a frozen actor thread. Crash and health depletion
//! propagate to script code and only end the whole run when they escape the
//! entry execution uncaught. Lock rejection is deliberately *not* an error —
//! door interaction returns a structured result so scripts can probe doors
//! in normal control flow.

use thiserror::Error;

/// A simulation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimError {
    /// The run was stopped, or this actor's thread was frozen deliberately.
    #[error("cancelled")]
    Cancelled,

    /// The actor walked into an impassable cell.
    #[error("crash: {0}")]
    Crash(String),

    /// The actor's health reached zero.
    #[error("health depleted: {0}")]
    HealthDepleted(String),

    /// A source file failed to parse; nothing was executed.
    #[error("compile error: {0}")]
    Compile(String),

    /// A `require` target could not be resolved.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// Anything else raised by user code or the host environment.
    #[error("{0}")]
    Generic(String),
}

impl SimError {
    /// Stable machine-readable code, exposed to scripts and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Crash(_) => "CRASH",
            Self::HealthDepleted(_) => "HEALTH_DEPLETED",
            Self::Compile(_) => "COMPILE",
            Self::ModuleNotFound(_) => "MODULE_NOT_FOUND",
            Self::Generic(_) => "GENERIC",
        }
    }

    /// True for failures that end the run when they escape the entry
    /// execution uncaught. Cancellation never does.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SimError::Cancelled.code(), "CANCELLED");
        assert_eq!(SimError::Crash("x".into()).code(), "CRASH");
        assert_eq!(SimError::HealthDepleted("x".into()).code(), "HEALTH_DEPLETED");
        assert_eq!(SimError::Compile("x".into()).code(), "COMPILE");
        assert_eq!(SimError::ModuleNotFound("x".into()).code(), "MODULE_NOT_FOUND");
        assert_eq!(SimError::Generic("x".into()).code(), "GENERIC");
    }

    #[test]
    fn only_cancellation_is_non_fatal() {
        assert!(!SimError::Cancelled.is_fatal());
        assert!(SimError::Crash("x".into()).is_fatal());
        assert!(SimError::Generic("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_detail() {
        let err = SimError::Crash("bumped into a wall at (1, 0)".into());
        assert_eq!(err.to_string(), "crash: bumped into a wall at (1, 0)");
    }
}
