//! Types shared between the sandbox engine and its tooling.
//!
//! - **`construction_state`**: the lifecycle of one sandbox construction
//!   (`Idle → RootReady → CommonApplied → PrivateApplied → Done`, or `Aborted`).

pub mod construction_state;

pub use construction_state::{ConstructionState, ConstructionTracker, InvalidTransition};
