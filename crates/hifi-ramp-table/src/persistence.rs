//! ---
//! ramp_section: "02-ramp-table"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp table engine and flat-file persistence."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::table::{Breakpoint, BreakpointTable, MAX_BREAKPOINTS};
use crate::{RampTableError, Result};

/// Header line written at the top of every ramp file.
pub const RAMP_FILE_HEADER: &str = "target rate";

/// Read a ramp file into a freshly sorted table.
///
/// The first line is a header and is ignored verbatim. Every following line holds
/// `<target> <rate>`; blank lines are skipped and rows with a non-positive target
/// or rate are treated as absent.
pub fn load_table(path: &Path) -> Result<BreakpointTable> {
    let file = File::open(path).map_err(|source| RampTableError::FileUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut table = BreakpointTable::new();

    for (index, line) in reader.lines().enumerate().skip(1) {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(source) if source.kind() == ErrorKind::InvalidData => {
                return Err(RampTableError::MalformedRampFile {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: format!("unreadable line: {source}"),
                });
            }
            Err(source) => {
                return Err(RampTableError::FileUnavailable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let Some(row) = parse_row(path, line_no, &line)? else {
            continue;
        };
        if !row.is_valid() {
            debug!(path = %path.display(), line = line_no, target = row.target, rate = row.rate, "skipping non-positive ramp row");
            continue;
        }
        if table.len() >= MAX_BREAKPOINTS {
            warn!(path = %path.display(), line = line_no, capacity = MAX_BREAKPOINTS, "ramp file exceeds table capacity; ignoring remaining rows");
            break;
        }
        table.append(row)?;
    }

    table.sort();
    debug!(path = %path.display(), breakpoints = table.len(), "ramp table loaded");
    Ok(table)
}

/// Write the usable rows of `table` to `path` in their current order.
///
/// Returns the number of data rows written. Callers reload the file afterwards to
/// re-establish sorted order.
pub fn save_table(path: &Path, table: &BreakpointTable) -> Result<usize> {
    let unavailable = |source| RampTableError::FileUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(unavailable)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{RAMP_FILE_HEADER}").map_err(unavailable)?;

    let mut written = 0usize;
    for (_, row) in table.valid() {
        writeln!(writer, "{} {}", row.target, row.rate).map_err(unavailable)?;
        written += 1;
    }
    writer.flush().map_err(unavailable)?;
    debug!(path = %path.display(), rows = written, "ramp table written");
    Ok(written)
}

fn parse_row(path: &Path, line_no: usize, line: &str) -> Result<Option<Breakpoint>> {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(None);
    };
    let malformed = |reason: String| RampTableError::MalformedRampFile {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };
    let second = tokens
        .next()
        .ok_or_else(|| malformed(format!("expected `<target> <rate>`, found `{}`", line.trim())))?;
    let target = parse_value(first).map_err(&malformed)?;
    let rate = parse_value(second).map_err(&malformed)?;
    Ok(Some(Breakpoint::new(target, rate)))
}

fn parse_value(token: &str) -> std::result::Result<f64, String> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(format!("non-finite value `{token}`")),
        Err(err) => Err(format!("invalid number `{token}`: {err}")),
    }
}

impl BreakpointTable {
    /// Replace the contents of this table with the rows stored at `path`.
    ///
    /// On failure the previous contents are left untouched.
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        *self = load_table(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_sorts_rows_and_skips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        fs::write(&path, "target rate\n0.1 0.01\n0.05 0.02\n").unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(
            table.entries(),
            &[Breakpoint::new(0.05, 0.02), Breakpoint::new(0.1, 0.01)]
        );
    }

    #[test]
    fn missing_rate_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        fs::write(&path, "target rate\n1 0.1\n2\n").unwrap();
        match load_table(&path) {
            Err(RampTableError::MalformedRampFile { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_token_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        fs::write(&path, "target rate\n1 fast\n").unwrap();
        assert!(matches!(
            load_table(&path),
            Err(RampTableError::MalformedRampFile { line: 2, .. })
        ));
    }

    #[test]
    fn invalid_utf8_line_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        fs::write(&path, b"target rate\n\xff\xfe 0.2\n").unwrap();
        assert!(matches!(
            load_table(&path),
            Err(RampTableError::MalformedRampFile { line: 2, .. })
        ));
    }

    #[test]
    fn blank_and_non_positive_rows_are_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        fs::write(&path, "target rate\n\n-1 -1\n3 0.2\n0 0.5\n   \n").unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.entries(), &[Breakpoint::new(3.0, 0.2)]);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = load_table(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, RampTableError::FileUnavailable { .. }));
    }

    #[test]
    fn save_omits_sentinel_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.txt");
        let table = BreakpointTable::from_pv_arrays(&[2.0, -1.0, 1.0], &[0.2, -1.0, 0.1]);
        assert_eq!(save_table(&path, &table).unwrap(), 2);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "target rate\n1 0.1\n2 0.2\n");
    }

    #[test]
    fn failed_reload_keeps_previous_rows() {
        let dir = tempdir().unwrap();
        let mut table =
            BreakpointTable::from_breakpoints([Breakpoint::new(1.0, 0.1)]).unwrap();
        assert!(table.reload(&dir.path().join("absent.txt")).is_err());
        assert_eq!(table.valid_len(), 1);
    }
}
