//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Ramp control state machine, process variable boundary and event loop for the
//! HiFi cryomagnet supply.

pub mod controller;
pub mod error;
pub mod pv;
pub mod ramp;
pub mod runtime;
pub mod state;
#[cfg(feature = "simulation")]
pub mod supply;

pub use controller::{RampController, Transition};
pub use error::{ControllerError, Result};
pub use pv::{ProcessVariables, PutMode, PvError, PvNames, PvValue};
pub use ramp::{plan, RampAction, RampInputs};
pub use runtime::{RampRuntime, RuntimeHandle};
pub use state::{ControlState, Direction, OutputMode, RampSession, RampTarget};
#[cfg(feature = "simulation")]
pub use supply::{PutRecord, PvEvent, SimulatedSupply};
