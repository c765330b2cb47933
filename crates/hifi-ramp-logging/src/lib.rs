//! ---
//! ramp_section: "03-logging-metrics"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Structured logging adapters and sinks."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging helpers shared by the ramp controller crates.

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// PV prefix of the supply being controlled.
    pub device: Option<&'a str>,
    /// Name of the controller state emitting the event.
    pub state: Option<&'a str>,
    /// Evaluation counter of the state machine.
    pub tick: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device prefix.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a controller state name.
    pub fn with_state(mut self, state: &'a str) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach an evaluation counter.
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %message
        ),
    }
}
