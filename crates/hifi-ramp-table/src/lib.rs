//! ---
//! ramp_section: "02-ramp-table"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp table engine and flat-file persistence."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Breakpoint table used to drive piecewise ramp rates for the HiFi magnet supply.
//!
//! Table targets are stored in scaled units (physical output × [`SCALE`]).
//! Live output readings must be multiplied by [`SCALE`] before they are
//! compared with a table entry.

use std::path::PathBuf;

/// Result alias used throughout the ramp table crate.
pub type Result<T> = std::result::Result<T, RampTableError>;

/// Error type for table search, estimation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum RampTableError {
    /// The ramp file could not be opened for the requested mode.
    #[error("ramp file {path} unavailable: {source}")]
    FileUnavailable {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// A data line in the ramp file did not hold two numeric tokens.
    #[error("malformed ramp file {path} at line {line}: {reason}")]
    MalformedRampFile {
        /// Path of the offending file.
        path: PathBuf,
        /// One-based line number within the file.
        line: usize,
        /// Human readable parse failure.
        reason: String,
    },
    /// The requested target lies beyond the table in the direction of travel.
    #[error("target lies outside the ramp table range")]
    TableOutOfRange,
    /// Search or estimation was invoked before any breakpoints were loaded.
    #[error("ramp table is empty")]
    EmptyTable,
    /// More breakpoints were pushed than the fixed table capacity allows.
    #[error("ramp table full ({capacity} breakpoints)")]
    TableFull {
        /// Maximum number of rows the table can hold.
        capacity: usize,
    },
}

pub mod persistence;
pub mod table;

pub use persistence::{load_table, save_table, RAMP_FILE_HEADER};
pub use table::{Breakpoint, BreakpointTable, MAX_BREAKPOINTS, SCALE, SENTINEL};
