//! Grid model: coordinates for every registered cell and the run date behind
//! every column.
//!
//! Per-cell state (tag, coordinate, marked flag) lives in a side table owned
//! by [`Grid`], keyed by the renderer's [`CellId`]. Nothing is stored on the
//! rendered cells themselves.

use std::collections::{HashMap, HashSet};

use crate::entry::TestReference;
use crate::report::{CellId, DataRow, Report, ReportRow};

/// Tag assigned to a cell at registration. Tags increase in build order.
pub type CellTag = usize;

/// Column index of a row's header cell.
pub const HEADER_COL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCoordinate {
    pub row: usize,
    pub col: i32,
}

impl GridCoordinate {
    pub fn new(row: usize, col: i32) -> Self {
        Self { row, col }
    }
}

/// Dates of one header section, one per data column.
#[derive(Debug, Clone, Default)]
pub struct ColumnDateDefinition {
    dates: Vec<String>,
    col_of: HashMap<String, usize>,
}

impl ColumnDateDefinition {
    pub fn new(dates: Vec<String>) -> Self {
        let col_of = dates
            .iter()
            .enumerate()
            .map(|(col, date)| (date.clone(), col))
            .collect();
        Self { dates, col_of }
    }

    pub fn get_col(&self, date: &str) -> Option<usize> {
        self.col_of.get(date).copied()
    }

    pub fn get_date(&self, col: usize) -> Option<&str> {
        self.dates.get(col).map(String::as_str)
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }
}

#[derive(Debug, Clone)]
struct GridRow {
    key: String,
    test_name: String,
    date_def: Option<usize>,
    header: CellId,
    cells: Vec<CellId>,
}

#[derive(Debug, Clone)]
struct CellInfo {
    coord: GridCoordinate,
    marked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<GridRow>,
    date_defs: Vec<ColumnDateDefinition>,
    cells: Vec<CellInfo>,
    tags: HashMap<CellId, CellTag>,
    rows_by_key: HashMap<String, usize>,
    hidden_rows: HashSet<usize>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a date-definition section; returns its index for [`register_row`].
    ///
    /// [`register_row`]: Grid::register_row
    pub fn add_date_definition(&mut self, def: ColumnDateDefinition) -> usize {
        self.date_defs.push(def);
        self.date_defs.len() - 1
    }

    /// Register a data row under the active date definition. The row gets the
    /// next row index; its header is tagged with column -1 and its cells with
    /// 0, 1, ... left to right.
    pub fn register_row(&mut self, row: &DataRow, date_def: Option<usize>) -> usize {
        let row_index = self.rows.len();
        self.tag(row.header.id, GridCoordinate::new(row_index, HEADER_COL));
        for (col, cell) in row.cells.iter().enumerate() {
            self.tag(cell.id, GridCoordinate::new(row_index, col as i32));
        }
        self.rows_by_key.entry(row.key.clone()).or_insert(row_index);
        self.rows.push(GridRow {
            key: row.key.clone(),
            test_name: row.test_name(),
            date_def,
            header: row.header.id,
            cells: row.cells.iter().map(|c| c.id).collect(),
        });
        row_index
    }

    fn tag(&mut self, cell: CellId, coord: GridCoordinate) {
        let tag = self.cells.len();
        self.cells.push(CellInfo {
            coord,
            marked: false,
        });
        self.tags.insert(cell, tag);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn tag_of(&self, cell: CellId) -> Option<CellTag> {
        self.tags.get(&cell).copied()
    }

    pub fn try_coord(&self, cell: CellId) -> Option<GridCoordinate> {
        self.tag_of(cell).map(|tag| self.cells[tag].coord)
    }

    /// Coordinate of a registered cell.
    ///
    /// # Panics
    /// If `cell` was never registered. Asking for an unknown cell is a bug in
    /// the caller, not a runtime condition.
    pub fn coord(&self, cell: CellId) -> GridCoordinate {
        match self.try_coord(cell) {
            Some(coord) => coord,
            None => panic!("cell {cell} was never registered with the grid"),
        }
    }

    /// Run date of the column `coord` sits in, under its row's section.
    pub fn get_date(&self, coord: GridCoordinate) -> Option<&str> {
        let col = usize::try_from(coord.col).ok()?;
        let def = self.rows.get(coord.row)?.date_def?;
        self.date_defs[def].get_date(col)
    }

    /// Column of `date` in the section of the row whose header is
    /// `row_header`. `None` if the date is not a column of that section.
    pub fn get_col(&self, row_header: CellId, date: &str) -> Option<usize> {
        let coord = self.try_coord(row_header)?;
        let def = self.rows.get(coord.row)?.date_def?;
        self.date_defs[def].get_col(date)
    }

    pub fn cell_at(&self, coord: GridCoordinate) -> Option<CellId> {
        let row = self.rows.get(coord.row)?;
        if coord.col == HEADER_COL {
            return Some(row.header);
        }
        row.cells.get(usize::try_from(coord.col).ok()?).copied()
    }

    pub fn row_header(&self, row: usize) -> Option<CellId> {
        self.rows.get(row).map(|r| r.header)
    }

    /// First row tagged with the report's raw test key.
    pub fn row_for_key(&self, raw_key: &str) -> Option<usize> {
        self.rows_by_key.get(raw_key).copied()
    }

    /// The test a cell's row stands for.
    pub fn test_reference(&self, cell: CellId) -> Option<TestReference> {
        let row = &self.rows[self.try_coord(cell)?.row];
        Some(TestReference::from_raw(&row.key, &row.test_name))
    }

    pub fn is_row_visible(&self, row: usize) -> bool {
        !self.hidden_rows.contains(&row)
    }

    pub fn set_row_visible(&mut self, row: usize, visible: bool) {
        if visible {
            self.hidden_rows.remove(&row);
        } else {
            self.hidden_rows.insert(row);
        }
    }

    /// Take the per-row visibility computed by the filter. Rows are in the
    /// same document order in both.
    pub fn sync_visibility(&mut self, visible: &[bool]) {
        self.hidden_rows = visible
            .iter()
            .enumerate()
            .filter(|(_, v)| !**v)
            .map(|(row, _)| row)
            .collect();
    }

    pub fn is_marked(&self, cell: CellId) -> bool {
        self.tag_of(cell).is_some_and(|tag| self.cells[tag].marked)
    }

    pub(crate) fn set_marked(&mut self, tag: CellTag, marked: bool) {
        if let Some(info) = self.cells.get_mut(tag) {
            info.marked = marked;
        }
    }
}

/// Builds a [`Grid`] from a report's rows, tracking the active date section
/// and every date seen.
#[derive(Debug, Default)]
pub struct GridBuilder {
    grid: Grid,
    current_def: Option<usize>,
    all_dates: Vec<String>,
    seen_dates: HashSet<String>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_report(report: &Report) -> Self {
        let mut builder = Self::new();
        for row in &report.rows {
            match row {
                ReportRow::Header { dates } => builder.set_col_date_definition(dates.clone()),
                ReportRow::Data(data) => {
                    builder.add_row(data);
                }
                ReportRow::Other => {}
            }
        }
        builder
    }

    pub fn set_col_date_definition(&mut self, dates: Vec<String>) {
        for date in &dates {
            if self.seen_dates.insert(date.clone()) {
                self.all_dates.push(date.clone());
            }
        }
        self.current_def = Some(self.grid.add_date_definition(ColumnDateDefinition::new(dates)));
    }

    pub fn add_row(&mut self, row: &DataRow) -> usize {
        self.grid.register_row(row, self.current_def)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Distinct dates over all sections, in first-seen order.
    pub fn all_dates(&self) -> &[String] {
        &self.all_dates
    }

    pub fn into_parts(self) -> (Grid, Vec<String>) {
        (self.grid, self.all_dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportCell;

    fn row(key: &str, first_id: CellId, width: usize) -> DataRow {
        DataRow {
            key: key.to_string(),
            header: ReportCell::new(first_id, "#FFFFFF", key),
            cells: (0..width)
                .map(|i| ReportCell::new(first_id + 1 + i, "#00FF00", ""))
                .collect(),
        }
    }

    fn two_sections() -> GridBuilder {
        let mut b = GridBuilder::new();
        b.set_col_date_definition(vec!["d1".into(), "d2".into()]);
        b.add_row(&row("a", 0, 2));
        b.add_row(&row("b", 10, 2));
        b.set_col_date_definition(vec!["d2".into(), "d3".into(), "d4".into()]);
        b.add_row(&row("c", 20, 3));
        b
    }

    #[test]
    fn coordinates_are_assigned_in_build_order() {
        let b = two_sections();
        let grid = b.grid();
        assert_eq!(grid.coord(0), GridCoordinate::new(0, HEADER_COL));
        assert_eq!(grid.coord(1), GridCoordinate::new(0, 0));
        assert_eq!(grid.coord(12), GridCoordinate::new(1, 1));
        assert_eq!(grid.coord(23), GridCoordinate::new(2, 2));
        assert!(grid.tag_of(1).unwrap() < grid.tag_of(12).unwrap());
    }

    #[test]
    fn dates_follow_each_rows_section() {
        let b = two_sections();
        let grid = b.grid();
        assert_eq!(grid.get_date(GridCoordinate::new(1, 1)), Some("d2"));
        assert_eq!(grid.get_date(GridCoordinate::new(2, 0)), Some("d2"));
        assert_eq!(grid.get_date(GridCoordinate::new(2, 2)), Some("d4"));
        assert_eq!(grid.get_date(GridCoordinate::new(0, HEADER_COL)), None);
        assert_eq!(grid.get_col(20, "d3"), Some(1));
        assert_eq!(grid.get_col(0, "d3"), None);
    }

    #[test]
    fn all_dates_are_distinct_in_first_seen_order() {
        let b = two_sections();
        assert_eq!(b.all_dates(), ["d1", "d2", "d3", "d4"]);
    }

    #[test]
    fn rows_before_any_header_have_no_dates() {
        let mut b = GridBuilder::new();
        b.add_row(&row("orphan", 0, 1));
        assert_eq!(b.grid().get_date(GridCoordinate::new(0, 0)), None);
    }

    #[test]
    fn cell_lookup_and_keys() {
        let b = two_sections();
        let grid = b.grid();
        assert_eq!(grid.cell_at(GridCoordinate::new(1, 0)), Some(11));
        assert_eq!(grid.cell_at(GridCoordinate::new(1, HEADER_COL)), Some(10));
        assert_eq!(grid.cell_at(GridCoordinate::new(1, 5)), None);
        assert_eq!(grid.row_for_key("c"), Some(2));
        assert_eq!(grid.row_for_key("zzz"), None);
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn unknown_cell_fails_fast() {
        two_sections().grid().coord(999);
    }

    #[test]
    fn visibility_sync() {
        let (mut grid, _) = two_sections().into_parts();
        assert!(grid.is_row_visible(1));
        grid.sync_visibility(&[true, false, true]);
        assert!(!grid.is_row_visible(1));
        grid.set_row_visible(1, true);
        assert!(grid.is_row_visible(1));
    }
}
