//! ---
//! ramp_section: "02-ramp-table"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp table engine and flat-file persistence."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use hifi_ramp_table::{load_table, save_table, Breakpoint, BreakpointTable, RampTableError};
use tempfile::tempdir;

fn unsorted_rows() -> Vec<Breakpoint> {
    vec![
        Breakpoint::new(4000.0, 0.0012),
        Breakpoint::new(500.0, 0.004),
        Breakpoint::new(2000.0, 0.002),
        Breakpoint::new(1000.0, 0.003),
        Breakpoint::new(2000.0, 0.0025),
    ]
}

#[test]
fn save_then_load_matches_sorted_table() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ramp_table.txt");
    let table = BreakpointTable::from_breakpoints(unsorted_rows())?;

    let written = save_table(&path, &table)?;
    assert_eq!(written, 5);

    let restored = load_table(&path)?;
    assert_eq!(restored, table);
    Ok(())
}

#[test]
fn pv_edit_with_sentinels_round_trips_without_placeholders() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ramp_table.txt");
    let mut targets = vec![-1.0; 64];
    let mut rates = vec![-1.0; 64];
    targets[0] = 3000.0;
    rates[0] = 0.002;
    targets[1] = 1500.0;
    rates[1] = 0.003;
    let edited = BreakpointTable::from_pv_arrays(&targets, &rates);
    assert_eq!(edited.len(), 64);

    save_table(&path, &edited)?;
    let restored = load_table(&path)?;
    assert_eq!(
        restored.entries(),
        &[Breakpoint::new(1500.0, 0.003), Breakpoint::new(3000.0, 0.002)]
    );
    Ok(())
}

#[test]
fn duration_is_non_decreasing_in_final_target() -> anyhow::Result<()> {
    let table = BreakpointTable::from_breakpoints(unsorted_rows())?;
    let start = 0.03 * hifi_ramp_table::SCALE;
    let mut previous = 0.0;
    let mut goal = 0.0;
    while goal <= 6000.0 {
        let estimate = table.duration_to_target(start, goal, 0.029)?;
        assert!(
            estimate >= previous,
            "estimate dropped from {previous} to {estimate} at goal {goal}"
        );
        previous = estimate;
        goal += 37.5;
    }
    Ok(())
}

#[test]
fn duration_ignores_target_sign() -> anyhow::Result<()> {
    let table = BreakpointTable::from_breakpoints(unsorted_rows())?;
    let positive = table.duration_to_target(0.0, 2500.0, 0.029)?;
    let negative = table.duration_to_target(0.0, -2500.0, 0.029)?;
    assert_eq!(positive, negative);
    Ok(())
}

#[test]
fn search_beyond_table_is_out_of_range() -> anyhow::Result<()> {
    let table = BreakpointTable::from_breakpoints(unsorted_rows())?;
    let err = table.find_nearest_breakpoint(0.45, 5000.0).unwrap_err();
    assert!(matches!(err, RampTableError::TableOutOfRange));
    assert_eq!(table.find_nearest_breakpoint(0.35, 5000.0)?, 4);
    Ok(())
}
