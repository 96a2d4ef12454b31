//! Everything derived from a batch of fetched entries: markers placed on the
//! grid, per-date counts, and the per-date summaries of the comment list.

use std::collections::{HashMap, HashSet};

use crate::entry::{CommentEntry, TestReference};
use crate::grid::{Grid, GridCoordinate};

/// A numbered marker on one cell. `number` counts the entries carrying the
/// cell's date, in fetch order; `entry` indexes the fetched entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentMarker {
    pub coord: GridCoordinate,
    pub number: usize,
    pub entry: usize,
}

/// Markers for every (date, test) pair of every entry that lands on the grid.
/// A cell gets at most one marker per number.
pub fn place_markers(entries: &[CommentEntry], grid: &Grid) -> Vec<CommentMarker> {
    let mut per_date: HashMap<&str, usize> = HashMap::new();
    let mut placed: HashSet<(GridCoordinate, usize)> = HashSet::new();
    let mut markers = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        for (date, tests) in entry.tests.iter() {
            let number = per_date.entry(date).or_default();
            *number += 1;
            for test in tests {
                let Some(row) = grid.row_for_key(&test.raw_key()) else {
                    continue;
                };
                let Some(col) = grid
                    .row_header(row)
                    .and_then(|header| grid.get_col(header, date))
                else {
                    continue;
                };
                let coord = GridCoordinate::new(row, col as i32);
                if placed.insert((coord, *number)) {
                    markers.push(CommentMarker {
                        coord,
                        number: *number,
                        entry: index,
                    });
                }
            }
        }
    }
    tracing::debug!(entries = entries.len(), markers = markers.len(), "placed comment markers");
    markers
}

/// Entries carrying `date`, whether general or on tests.
pub fn count_comments(entries: &[CommentEntry], date: &str) -> usize {
    entries.iter().filter(|e| e.tests.get(date).is_some()).count()
}

/// Stored date strings containing `date`, latest first. A report date
/// usually has several runs, each stored under its own date-and-time string.
pub fn matching_date_strings(entries: &[CommentEntry], date: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dates: Vec<String> = entries
        .iter()
        .flat_map(|e| e.tests.dates())
        .filter(|d| d.contains(date) && seen.insert(*d))
        .map(str::to_string)
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestComment<'a> {
    pub entry: &'a CommentEntry,
    /// Sorted by composite key.
    pub tests: Vec<TestReference>,
}

impl TestComment<'_> {
    /// Test names grouped under their display version, keeping the sorted
    /// order.
    pub fn by_version(&self) -> Vec<(String, Vec<&str>)> {
        let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
        for test in &self.tests {
            let version = test.display_version();
            match groups.last_mut() {
                Some((last, names)) if *last == version => names.push(test.name.as_str()),
                _ => groups.push((version, vec![test.name.as_str()])),
            }
        }
        groups
    }
}

/// The comments for one date string, split the way the comment list shows
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSummary<'a> {
    pub date: String,
    pub general: Vec<&'a CommentEntry>,
    pub on_tests: Vec<TestComment<'a>>,
}

impl<'a> DateSummary<'a> {
    pub fn build(date: &str, entries: &'a [CommentEntry]) -> Self {
        let mut general = Vec::new();
        let mut on_tests = Vec::new();
        for entry in entries {
            match entry.tests.get(date) {
                Some([]) => general.push(entry),
                Some(tests) => {
                    let mut tests = tests.to_vec();
                    tests.sort_by(|a, b| a.composite_key.cmp(&b.composite_key));
                    on_tests.push(TestComment { entry, tests });
                }
                None => {}
            }
        }
        Self {
            date: date.to_string(),
            general,
            on_tests,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.on_tests.is_empty()
    }
}
