//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Runtime helpers supporting the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Timer helpers for the ramp controller event loop.

pub mod scheduling;

pub use scheduling::{RateLimiter, SettleTimer};
