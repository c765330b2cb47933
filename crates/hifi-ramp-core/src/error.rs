//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use hifi_ramp_table::RampTableError;

use crate::pv::PvError;

/// Result alias used by the controller.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Failures raised while evaluating the controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Loading, saving or reloading the ramp table failed.
    #[error("ramp table error: {0}")]
    Table(#[from] RampTableError),
    /// A setpoint write was not accepted by the supply. Retried by the controller
    /// and never returned from `evaluate`.
    #[error("process variable error: {0}")]
    Pv(#[from] PvError),
}
