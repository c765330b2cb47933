//! ---
//! ramp_section: "02-ramp-table"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp table engine and flat-file persistence."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::{RampTableError, Result};

/// Factor between physical output units (Tesla) and table target units.
pub const SCALE: f64 = 10_000.0;

/// Fixed capacity of the table, mirrored by the published PV arrays.
pub const MAX_BREAKPOINTS: usize = 64;

/// Placeholder row for unset table slots.
pub const SENTINEL: Breakpoint = Breakpoint {
    target: -1.0,
    rate: -1.0,
};

/// A single `(target, rate)` pair at which the applicable ramp rate changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Target in scaled units.
    pub target: f64,
    /// Ramp rate applied to the segment ending at `target`.
    pub rate: f64,
}

impl Breakpoint {
    /// Construct a breakpoint from raw components.
    pub const fn new(target: f64, rate: f64) -> Self {
        Self { target, rate }
    }

    /// Whether the row carries a usable (positive) target and rate.
    pub fn is_valid(&self) -> bool {
        self.target > 0.0 && self.rate > 0.0
    }
}

/// Ordered set of breakpoints governing the ramp rate across output ranges.
///
/// Storage may contain [`SENTINEL`] rows (for example when rebuilt from the
/// published PV arrays). They take part in sorting but are skipped by search,
/// estimation and persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakpointTable {
    entries: Vec<Breakpoint>,
}

impl BreakpointTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sorted table from an arbitrary sequence of rows.
    pub fn from_breakpoints<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Breakpoint>,
    {
        let mut table = Self::new();
        for row in rows {
            table.append(row)?;
        }
        table.sort();
        Ok(table)
    }

    /// Rebuild a table from the parallel target/rate arrays published on the PV layer.
    ///
    /// Rows beyond [`MAX_BREAKPOINTS`] and rows missing a partner value are ignored.
    pub fn from_pv_arrays(targets: &[f64], rates: &[f64]) -> Self {
        let mut entries: Vec<Breakpoint> = targets
            .iter()
            .zip(rates.iter())
            .take(MAX_BREAKPOINTS)
            .map(|(&target, &rate)| Breakpoint::new(target, rate))
            .collect();
        insertion_sort(&mut entries);
        Self { entries }
    }

    /// Export the table as two fixed-size arrays padded with the sentinel value.
    pub fn to_pv_arrays(&self) -> (Vec<f64>, Vec<f64>) {
        let mut targets = vec![SENTINEL.target; MAX_BREAKPOINTS];
        let mut rates = vec![SENTINEL.rate; MAX_BREAKPOINTS];
        for (slot, row) in self.entries.iter().take(MAX_BREAKPOINTS).enumerate() {
            targets[slot] = row.target;
            rates[slot] = row.rate;
        }
        (targets, rates)
    }

    /// Append a row without re-sorting. Callers must [`sort`](Self::sort) afterwards.
    pub(crate) fn append(&mut self, row: Breakpoint) -> Result<()> {
        if self.entries.len() >= MAX_BREAKPOINTS {
            return Err(RampTableError::TableFull {
                capacity: MAX_BREAKPOINTS,
            });
        }
        self.entries.push(row);
        Ok(())
    }

    /// Insert a row and restore ascending order.
    pub fn insert(&mut self, row: Breakpoint) -> Result<()> {
        self.append(row)?;
        self.sort();
        Ok(())
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All stored rows, sentinels included.
    pub fn entries(&self) -> &[Breakpoint] {
        &self.entries
    }

    /// Number of stored rows, sentinels included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table stores no rows at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows with a positive target and rate.
    pub fn valid_len(&self) -> usize {
        self.valid().count()
    }

    /// Iterate over usable rows together with their storage index.
    pub fn valid(&self) -> impl Iterator<Item = (usize, &Breakpoint)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_valid())
    }

    /// Rate of the lowest usable breakpoint, used as the initial ramp rate.
    pub fn initial_rate(&self) -> Option<f64> {
        self.valid().next().map(|(_, row)| row.rate)
    }

    /// Sort ascending by target. Stable for equal targets.
    pub fn sort(&mut self) {
        insertion_sort(&mut self.entries);
    }

    /// Locate the next breakpoint to aim at from `current_output` (physical units)
    /// toward `final_target` (scaled units).
    ///
    /// Ramping up yields the first breakpoint above the output; ramping down yields
    /// the last breakpoint below it. When both the output and the final target sit
    /// beyond the same end of the table the search reports
    /// [`RampTableError::TableOutOfRange`].
    pub fn find_nearest_breakpoint(&self, current_output: f64, final_target: f64) -> Result<usize> {
        self.find_nearest_breakpoint_scaled(current_output.abs() * SCALE, final_target)
    }

    /// Same as [`find_nearest_breakpoint`](Self::find_nearest_breakpoint) for an output
    /// already expressed in scaled units.
    pub fn find_nearest_breakpoint_scaled(
        &self,
        current_output_scaled: f64,
        final_target: f64,
    ) -> Result<usize> {
        let (first, last) = self.bounds()?;
        let output = current_output_scaled.abs();
        let goal = final_target.abs();

        if (goal > last.target && output >= last.target)
            || (goal < first.target && output <= first.target)
        {
            return Err(RampTableError::TableOutOfRange);
        }

        let found = if goal > output {
            self.valid()
                .find(|(_, row)| row.target > output)
                .map(|(index, _)| index)
        } else if goal < output {
            self.valid()
                .filter(|(_, row)| row.target < output)
                .last()
                .map(|(index, _)| index)
        } else {
            self.valid()
                .find(|(_, row)| row.target >= output)
                .map(|(index, _)| index)
        };
        found.ok_or(RampTableError::TableOutOfRange)
    }

    /// Rate governing the segment that contains `scaled_position`.
    ///
    /// Segment `i` spans `(target[i-1], target[i]]` and uses `rate[i]`; beyond the
    /// last breakpoint the last rate applies.
    pub fn segment_rate(&self, scaled_position: f64) -> Result<f64> {
        let (_, last) = self.bounds()?;
        let position = scaled_position.abs();
        Ok(self
            .valid()
            .find(|(_, row)| row.target >= position)
            .map(|(_, row)| row.rate)
            .unwrap_or(last.rate))
    }

    /// Estimate the time needed to ramp up from `current_output_scaled` to `final_target`.
    ///
    /// Each crossed segment contributes `(segment_target - segment_start) * rate *
    /// constant * SCALE`; the final partial segment stops at `|final_target|`. Past the
    /// last breakpoint the last rate is extrapolated. Ramping down (or standing still)
    /// yields zero.
    pub fn duration_to_target(
        &self,
        current_output_scaled: f64,
        final_target: f64,
        constant: f64,
    ) -> Result<f64> {
        let (_, last) = self.bounds()?;
        let goal = final_target.abs();
        let mut position = current_output_scaled.abs();
        if goal <= position {
            return Ok(0.0);
        }

        let factor = constant * SCALE;
        let mut ramp_time = 0.0;
        let start = position;
        for (_, row) in self.valid().filter(|(_, row)| row.target > start) {
            if goal < row.target {
                ramp_time += (goal - position) * row.rate * factor;
                return Ok(ramp_time);
            }
            ramp_time += (row.target - position) * row.rate * factor;
            position = row.target;
        }

        if goal > position {
            ramp_time += (goal - position) * last.rate * factor;
        }
        Ok(ramp_time)
    }

    fn bounds(&self) -> Result<(Breakpoint, Breakpoint)> {
        let mut valid = self.valid().map(|(_, row)| *row);
        let first = valid.next().ok_or(RampTableError::EmptyTable)?;
        let last = valid.last().unwrap_or(first);
        Ok((first, last))
    }
}

fn insertion_sort(rows: &mut [Breakpoint]) {
    for j in 1..rows.len() {
        let key = rows[j];
        let mut k = j;
        while k > 0 && rows[k - 1].target > key.target {
            rows[k] = rows[k - 1];
            k -= 1;
        }
        rows[k] = key;
    }
}
