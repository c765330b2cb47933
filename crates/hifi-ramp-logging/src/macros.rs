//! ---
//! ramp_section: "03-logging-metrics"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Structured logging adapters and sinks."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
/// Emit an event at the given level enriched with ramp controller context.
#[macro_export]
macro_rules! ramp_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            device = ctx.device.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::ramp_event!($level, context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an informational log enriched with ramp controller context.
#[macro_export]
macro_rules! ramp_info {
    ($($arg:tt)+) => {{
        $crate::ramp_event!(tracing::Level::INFO, $($arg)+)
    }};
}

/// Emit a debug log enriched with ramp controller context.
#[macro_export]
macro_rules! ramp_debug {
    ($($arg:tt)+) => {{
        $crate::ramp_event!(tracing::Level::DEBUG, $($arg)+)
    }};
}

/// Emit a warning enriched with ramp controller context.
#[macro_export]
macro_rules! ramp_warn {
    ($($arg:tt)+) => {{
        $crate::ramp_event!(tracing::Level::WARN, $($arg)+)
    }};
}

/// Emit an error log enriched with ramp controller context.
#[macro_export]
macro_rules! ramp_error {
    ($($arg:tt)+) => {{
        $crate::ramp_event!(tracing::Level::ERROR, $($arg)+)
    }};
}
