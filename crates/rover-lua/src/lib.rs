//! Embedded Lua runtime for the Rover simulation engine.
//!
//! Layer map:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`compile`] | up-front parse validation + package `require` scan |
//! | [`packages`] | third-party package pre-fetching |
//! | [`modules`] | virtual module loader with per-run exports cache |
//! | [`env`] | capability environments for user modules |
//! | [`context`] | per-run shared state (abort, actors, input, listeners) |
//! | [`bindings`] | the script-facing `game` / `Robot` / `readline` surface |
//!
//! The orchestrator (`rover-engine`) owns the lifecycle; this crate owns
//! everything that touches the VM.

pub mod bindings;
pub mod compile;
pub mod context;
pub mod env;
pub mod error;
pub mod modules;
pub mod packages;

pub use compile::{precompile, scan_package_requires, ENTRY_FILE, GLOBAL_MODULE_NAME};
pub use context::{RobotHandle, RunContext, SCRIPT_ERROR_MARKER};
pub use error::{is_cancelled, sim_error_from, to_lua_err};
pub use modules::{ModuleLoader, BUILTINS};
pub use packages::{prefetch, HttpPackageSource, PackageSource, StaticPackageSource};
