//! Cell selection and rectangular drag-selection over a [`Grid`].

use std::collections::BTreeMap;
use std::fmt;

use crate::grid::{CellTag, Grid, GridCoordinate, HEADER_COL};
use crate::report::CellId;

type ChangeCallback = Box<dyn FnMut(&Selection)>;

/// Set of selected cells keyed by grid tag. Iteration follows tag order,
/// which is grid build order.
#[derive(Default)]
pub struct Selection {
    members: BTreeMap<CellTag, CellId>,
    on_change: Option<ChangeCallback>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection whose [`notify`](Selection::notify) invokes `callback`.
    pub fn with_callback(callback: impl FnMut(&Selection) + 'static) -> Self {
        Self {
            members: BTreeMap::new(),
            on_change: Some(Box::new(callback)),
        }
    }

    /// Add and mark a cell. No-op if already present or not registered.
    pub fn add(&mut self, grid: &mut Grid, cell: CellId) {
        let Some(tag) = grid.tag_of(cell) else {
            return;
        };
        if self.members.insert(tag, cell).is_none() {
            grid.set_marked(tag, true);
        }
    }

    pub fn remove(&mut self, grid: &mut Grid, cell: CellId) {
        let Some(tag) = grid.tag_of(cell) else {
            return;
        };
        if self.members.remove(&tag).is_some() {
            grid.set_marked(tag, false);
        }
    }

    pub fn contains(&self, grid: &Grid, cell: CellId) -> bool {
        grid.tag_of(cell)
            .is_some_and(|tag| self.members.contains_key(&tag))
    }

    pub fn clear(&mut self, grid: &mut Grid) {
        for tag in std::mem::take(&mut self.members).into_keys() {
            grid.set_marked(tag, false);
        }
    }

    pub fn snapshot(&self) -> Vec<CellId> {
        self.members.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run the change callback now, synchronously.
    pub fn notify(&mut self) {
        if let Some(mut callback) = self.on_change.take() {
            callback(self);
            self.on_change = Some(callback);
        }
    }
}

#[derive(Debug)]
struct Drag {
    start: GridCoordinate,
    end: GridCoordinate,
    current: Selection,
}

/// Turns press / hover / release on grid cells into selection changes.
///
/// While a drag is active its cells live in a transient selection; releasing
/// commits them to the outer selection and notifies once.
#[derive(Debug)]
pub struct SelectionBuilder {
    selection: Selection,
    drag: Option<Drag>,
}

impl SelectionBuilder {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            drag: None,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Cells in the active drag, empty if none.
    pub fn transient(&self) -> Vec<CellId> {
        self.drag
            .as_ref()
            .map(|d| d.current.snapshot())
            .unwrap_or_default()
    }

    /// Press on a cell. Pressing an already selected cell deselects it.
    pub fn begin_selection(&mut self, grid: &mut Grid, cell: CellId) {
        if self.drag.is_some() {
            tracing::debug!("begin_selection during an active drag, ending it");
            self.end_selection(grid);
            return;
        }
        if self.selection.contains(grid, cell) {
            self.selection.remove(grid, cell);
            self.selection.notify();
            return;
        }
        let start = grid.coord(cell);
        if start.col == HEADER_COL {
            return;
        }
        let mut current = Selection::new();
        current.add(grid, cell);
        self.drag = Some(Drag {
            start,
            end: start,
            current,
        });
    }

    /// Hover over a cell during a drag. Only cells whose membership in the
    /// box spanned by the anchor changes are touched.
    pub fn select(&mut self, grid: &mut Grid, cell: CellId) {
        let Self { selection, drag } = self;
        let Some(drag) = drag.as_mut() else {
            return;
        };
        let c = grid.coord(cell);
        if c.col == HEADER_COL {
            return;
        }
        let (s, e) = (drag.start, drag.end);

        let row_lo = s.row.min(e.row).min(c.row);
        let row_hi = s.row.max(e.row).max(c.row);
        let col_lo = s.col.min(e.col).min(c.col);
        let col_hi = s.col.max(e.col).max(c.col);

        for row in row_lo..=row_hi {
            if !grid.is_row_visible(row) {
                continue;
            }
            for col in col_lo..=col_hi {
                let coord = GridCoordinate::new(row, col);
                let in_prev = within(s, e, coord);
                let in_curr = within(s, c, coord);
                if in_prev == in_curr {
                    continue;
                }
                let Some(id) = grid.cell_at(coord) else {
                    continue;
                };
                if in_curr {
                    if !selection.contains(grid, id) {
                        drag.current.add(grid, id);
                    }
                } else {
                    drag.current.remove(grid, id);
                }
            }
        }
        drag.end = c;
    }

    /// Release: commit the drag into the outer selection and notify once.
    pub fn end_selection(&mut self, grid: &mut Grid) {
        if let Some(drag) = self.drag.take() {
            for cell in drag.current.snapshot() {
                self.selection.add(grid, cell);
            }
            self.selection.notify();
        }
    }
}

fn within(a: GridCoordinate, b: GridCoordinate, p: GridCoordinate) -> bool {
    (a.row.min(b.row)..=a.row.max(b.row)).contains(&p.row)
        && (a.col.min(b.col)..=a.col.max(b.col)).contains(&p.col)
}

/// Highlight color for a selected cell, derived from its own color.
pub fn marked_color(rgb: (u8, u8, u8)) -> (u8, u8, u8) {
    let (r, g, b) = rgb;
    (
        (f64::from(r) / 1.5).round() as u8,
        (f64::from(g) / 1.5).round() as u8,
        ((255.0 + f64::from(b)) / 2.0).round() as u8,
    )
}
