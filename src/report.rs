//! The table structure produced by the report generator, reduced to what the
//! grid and filter need: rows, ordered cells, cell colors and header text.

/// Stable identity of a rendered cell, assigned by whoever renders the table.
pub type CellId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCell {
    pub id: CellId,
    /// Background color as written in the report, e.g. `#FF0000`.
    pub color: String,
    pub text: String,
}

impl ReportCell {
    pub fn new(id: CellId, color: &str, text: &str) -> Self {
        Self {
            id,
            color: color.to_string(),
            text: text.to_string(),
        }
    }
}

/// A table row as the renderer sees it, before classification.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// Text of the row's `th` cells.
    pub header_texts: Vec<String>,
    /// The row's `td` cells, left to right.
    pub cells: Vec<ReportCell>,
    /// Anchor name carried by the row's first link, if any.
    pub anchor: Option<String>,
}

/// A data row: one test, one header cell and one cell per run column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    /// Raw test key the report tags the row with.
    pub key: String,
    pub header: ReportCell,
    pub cells: Vec<ReportCell>,
}

impl DataRow {
    /// Test name with the renderer's line breaks removed.
    pub fn test_name(&self) -> String {
        self.header.text.chars().filter(|c| *c != '\n').collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRow {
    /// Starts a new date-definition section; one date per run column.
    Header { dates: Vec<String> },
    Data(DataRow),
    Other,
}

/// Marker text of the first header cell in a date-definition row.
pub const HEADER_MARKER: &str = "Test";

impl ReportRow {
    /// Classify a rendered row. `row_header_color` is the sentinel background
    /// color the generator gives to a data row's first cell.
    pub fn classify(raw: RawRow, row_header_color: &str) -> Self {
        let RawRow {
            header_texts,
            cells,
            anchor,
        } = raw;
        let mut cells = cells.into_iter();
        if let Some(header) = cells.next()
            && header.color.eq_ignore_ascii_case(row_header_color)
        {
            return Self::Data(DataRow {
                key: anchor.unwrap_or_default(),
                header,
                cells: cells.collect(),
            });
        }
        match header_texts.split_first() {
            Some((first, rest)) if first.trim() == HEADER_MARKER => Self::Header {
                dates: rest.iter().map(|text| column_date(text)).collect(),
            },
            _ => Self::Other,
        }
    }
}

/// The date a column header stands for: its first line.
fn column_date(text: &str) -> String {
    text.trim_start()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// A whole report: classified rows plus the color metadata the generator
/// emits alongside the table.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    /// Category colors in legend order.
    pub colors: Vec<String>,
    /// Colors that can occur in the last run column. Older reports do not
    /// provide this.
    pub last_col_colors: Option<Vec<String>>,
}

impl Report {
    pub fn from_raw_rows(
        raw_rows: impl IntoIterator<Item = RawRow>,
        row_header_color: &str,
        colors: Vec<String>,
        last_col_colors: Option<Vec<String>>,
    ) -> Self {
        Self {
            rows: raw_rows
                .into_iter()
                .map(|raw| ReportRow::classify(raw, row_header_color))
                .collect(),
            colors,
            last_col_colors,
        }
    }

    pub fn data_rows(&self) -> impl Iterator<Item = &DataRow> {
        self.rows.iter().filter_map(|row| match row {
            ReportRow::Data(data) => Some(data),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: &str = "#FFFFFF";

    fn data_raw(key: &str, name: &str, colors: &[&str], first_id: CellId) -> RawRow {
        let mut cells = vec![ReportCell::new(first_id, "#ffffff", name)];
        cells.extend(
            colors
                .iter()
                .enumerate()
                .map(|(i, c)| ReportCell::new(first_id + 1 + i, c, "")),
        );
        RawRow {
            header_texts: vec![],
            cells,
            anchor: Some(key.to_string()),
        }
    }

    #[test]
    fn classifies_data_row_case_insensitively() {
        let row = ReportRow::classify(data_raw("trunkt1", "t1", &["#00FF00"], 0), SENTINEL);
        let ReportRow::Data(data) = row else {
            panic!("expected data row");
        };
        assert_eq!(data.key, "trunkt1");
        assert_eq!(data.header.id, 0);
        assert_eq!(data.cells.len(), 1);
    }

    #[test]
    fn classifies_header_row_and_takes_first_line() {
        let raw = RawRow {
            header_texts: vec![
                "Test".to_string(),
                "07Jan2012\nAll (2)".to_string(),
                "2012-01-08_1148".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            ReportRow::classify(raw, SENTINEL),
            ReportRow::Header {
                dates: vec!["07Jan2012".to_string(), "2012-01-08_1148".to_string()]
            }
        );
    }

    #[test]
    fn other_rows_are_ignored() {
        let raw = RawRow {
            header_texts: vec!["Summary".to_string()],
            cells: vec![ReportCell::new(0, "#CCCCCC", "x")],
            anchor: None,
        };
        assert_eq!(ReportRow::classify(raw, SENTINEL), ReportRow::Other);
    }

    #[test]
    fn test_name_drops_line_breaks() {
        let ReportRow::Data(data) =
            ReportRow::classify(data_raw("k", "\nlong\nname\n", &[], 0), SENTINEL)
        else {
            panic!("expected data row");
        };
        assert_eq!(data.test_name(), "longname");
    }
}
