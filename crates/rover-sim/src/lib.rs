//! Simulation runtime: shared world state and robot physics.
//!
//! Execution is single-threaded cooperative concurrency. Every blocking
//! robot action awaits a cancellable timer ([`signal`]), so many actors'
//! command sequences can be logically in flight at once, interleaved by the
//! host's event loop. All mutation happens synchronously between awaits;
//! shared state is `Rc<RefCell<_>>` and needs no locking.
//!
//! Layering: this crate knows nothing about scripts. The Lua layer
//! (`rover-lua`) wraps [`RobotController`] and translates its outcome values
//! into script events; batch tests drive the controller directly and get
//! identical results.

pub mod robot;
pub mod signal;
pub mod world;

pub use robot::{
    CloseOutcome, DoorCredential, DoorOutcome, DropOutcome, EchoHit, EchoReport, LockReason,
    MoveOutcome, RobotController, ScanResult, SharedMaze, SharedWorld, DESTROY_DELAY_MS,
};
pub use signal::{AbortHandle, AbortSignal};
pub use world::WorldState;
