//! Report rows through classification, grid, filter and selection, the way a
//! report page wires them together.

use gridnotes::client::tests_for_cells;
use gridnotes::filter::{FilterEngine, FilterStrategy};
use gridnotes::grid::{GridBuilder, GridCoordinate, HEADER_COL};
use gridnotes::report::{RawRow, Report, ReportCell, ReportRow};
use gridnotes::selection::{Selection, SelectionBuilder};

const SENTINEL: &str = "#FFFFFF";
const PASS: &str = "#00FF00";
const FAIL: &str = "#FF0000";

fn header(dates: &[&str]) -> RawRow {
    let mut header_texts = vec!["Test".to_string()];
    header_texts.extend(dates.iter().map(|d| format!("{d}\nrun")));
    RawRow {
        header_texts,
        ..RawRow::default()
    }
}

/// Data row whose header cell id is `id` and whose run cells follow it.
fn data(id: usize, name: &str, colors: &[&str]) -> RawRow {
    let mut cells = vec![ReportCell::new(id, &SENTINEL.to_lowercase(), name)];
    cells.extend(
        colors
            .iter()
            .enumerate()
            .map(|(i, c)| ReportCell::new(id + 1 + i, c, "")),
    );
    RawRow {
        header_texts: Vec::new(),
        cells,
        anchor: Some(format!("v1{name}")),
    }
}

fn report() -> Report {
    Report::from_raw_rows(
        [
            data(1, "orphan", &[PASS]),
            header(&["2024-01-08", "2024-01-09", "2024-01-10"]),
            data(10, "alpha", &[PASS, PASS, PASS]),
            data(20, "beta", &[FAIL, FAIL, PASS]),
            data(30, "gamma", &[PASS, PASS, FAIL]),
            RawRow {
                header_texts: vec!["Totals".into()],
                ..RawRow::default()
            },
            header(&["2024-02-01"]),
            data(40, "delta", &[FAIL]),
        ],
        SENTINEL,
        vec![PASS.to_string(), FAIL.to_string()],
        None,
    )
}

// ---------------------------------------------------------------------------
// Classification and grid
// ---------------------------------------------------------------------------

#[test]
fn rows_are_classified_by_sentinel_and_marker() {
    let report = report();
    let kinds: Vec<&str> = report
        .rows
        .iter()
        .map(|r| match r {
            ReportRow::Header { .. } => "header",
            ReportRow::Data(_) => "data",
            ReportRow::Other => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        ["data", "header", "data", "data", "data", "other", "header", "data"]
    );
    assert_eq!(report.data_rows().count(), 5);
}

#[test]
fn grid_maps_cells_to_section_dates() {
    let report = report();
    let builder = GridBuilder::from_report(&report);
    assert_eq!(
        builder.all_dates(),
        ["2024-01-08", "2024-01-09", "2024-01-10", "2024-02-01"]
    );
    let (grid, _) = builder.into_parts();

    // The row before the first header has coordinates but no dates.
    assert_eq!(grid.coord(2), GridCoordinate::new(0, 0));
    assert_eq!(grid.get_date(grid.coord(2)), None);

    assert_eq!(grid.coord(10), GridCoordinate::new(1, HEADER_COL));
    assert_eq!(grid.get_date(grid.coord(13)), Some("2024-01-10"));
    assert_eq!(grid.get_col(20, "2024-01-09"), Some(1));
    assert_eq!(grid.get_col(40, "2024-01-09"), None);
    assert_eq!(grid.get_date(grid.coord(41)), Some("2024-02-01"));
    assert_eq!(grid.row_for_key("v1gamma"), Some(3));
}

#[test]
#[should_panic(expected = "never registered")]
fn coordinate_of_unknown_cell_panics() {
    let (grid, _) = GridBuilder::from_report(&report()).into_parts();
    grid.coord(999);
}

// ---------------------------------------------------------------------------
// Filter feeding selection
// ---------------------------------------------------------------------------

#[test]
fn filter_visibility_limits_drag_selection() {
    let report = report();
    let (mut grid, _) = GridBuilder::from_report(&report).into_parts();
    let mut filter = FilterEngine::from_report(&report);

    // Failing categories only, judged on the last run: gamma and delta.
    filter.show_only(1);
    assert_eq!(filter.visibility(), [false, false, false, true, true]);
    filter.set_strategy(FilterStrategy::Any);
    assert_eq!(filter.visibility(), [false, false, true, true, true]);
    filter.set_strategy(FilterStrategy::Last);
    grid.sync_visibility(filter.visibility());

    // Drag up the first run column from delta to alpha; alpha and beta are
    // hidden and stay out of the box.
    let mut builder = SelectionBuilder::new(Selection::new());
    builder.begin_selection(&mut grid, 41);
    builder.select(&mut grid, 11);
    builder.end_selection(&mut grid);
    assert_eq!(builder.selection().snapshot(), vec![31, 41]);

    let tests = tests_for_cells(&grid, &builder.selection().snapshot());
    let names = |date: &str| -> Vec<String> {
        tests
            .get(date)
            .unwrap_or_default()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    };
    assert_eq!(names("2024-01-08"), ["gamma"]);
    assert_eq!(names("2024-02-01"), ["delta"]);
}

#[test]
fn text_filter_and_reset_round_trip() {
    let report = report();
    let mut filter = FilterEngine::from_report(&report);
    filter.set_text_filter("^(alpha|DELTA)$");
    filter.apply();
    assert_eq!(filter.num_tests_visible(), 2);
    filter.reset();
    assert_eq!(filter.num_tests_visible(), 5);
}

#[test]
fn cells_without_dates_are_left_out_of_comments() {
    let (grid, _) = GridBuilder::from_report(&report()).into_parts();
    let tests = tests_for_cells(&grid, &[2, 10, 11, 999]);
    assert_eq!(tests.dates().collect::<Vec<_>>(), ["2024-01-08"]);
    let keys: Vec<&str> = tests
        .get("2024-01-08")
        .unwrap()
        .iter()
        .map(|t| t.composite_key.as_str())
        .collect();
    assert_eq!(keys, ["v1//alpha"]);
}
