use serde::{Deserialize, Serialize};

use crate::{Cell, Range, Row};

/// Page margins in inches. Defaults match a freshly created sheet.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub header: f64,
    pub footer: f64,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            left: 0.7,
            right: 0.7,
            top: 0.75,
            bottom: 0.75,
            header: 0.3,
            footer: 0.3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_attr(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "portrait" => Orientation::Portrait,
            "landscape" => Orientation::Landscape,
            _ => return None,
        })
    }
}

/// Print setup (subset).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct PageSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

/// Width/style settings for a run of columns (`min..=max`, 1-indexed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: u32,
    pub max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
}

/// A worksheet: ordered sparse rows plus the sheet-level registries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnRange>,
    /// Merge registry; dropped entirely when the last merge is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merges: Option<Vec<Range>>,
    #[serde(default)]
    pub page_margins: PageMargins,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_setup: Option<PageSetup>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            columns: Vec::new(),
            merges: None,
            page_margins: PageMargins::default(),
            page_setup: None,
        }
    }

    pub fn row(&self, index: u32) -> Option<&Row> {
        self.rows.iter().find(|r| r.index == index)
    }

    /// Get or create the row, keeping rows ordered by index. Appends at the
    /// bottom hit a last-element fast path.
    pub fn get_row(&mut self, index: u32) -> &mut Row {
        match self.rows.last() {
            Some(last) if last.index == index => {}
            Some(last) if last.index < index => self.rows.push(Row::new(index)),
            _ => {
                let at = self.rows.partition_point(|r| r.index < index);
                if self.rows.get(at).map(|r| r.index) != Some(index) {
                    self.rows.insert(at, Row::new(index));
                }
                return &mut self.rows[at];
            }
        }
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&Cell> {
        self.row(row)?.cell(col)
    }

    pub fn get_cell(&mut self, col: u32, row: u32) -> &mut Cell {
        self.get_row(row).get_cell(col)
    }

    pub fn set_row_height(&mut self, row: u32, height: Option<f64>) {
        self.get_row(row).height = height;
    }

    /// Set the width for a run of columns. An existing run with the same
    /// bounds is updated in place.
    pub fn set_column_width(&mut self, min: u32, max: u32, width: Option<f64>) {
        match self.columns.iter_mut().find(|c| c.min == min && c.max == max) {
            Some(existing) => existing.width = width,
            None => self.columns.push(ColumnRange {
                min,
                max,
                width,
                style: None,
            }),
        }
    }

    /// Width of a single column, from the first run covering it.
    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.columns
            .iter()
            .find(|c| c.min <= col && col <= c.max)
            .and_then(|c| c.width)
    }

    /// Register a merged region. Re-registering the same region (compared by
    /// its textual reference, case-insensitively) is a no-op.
    pub fn merge_cells(&mut self, range: Range) {
        let merges = self.merges.get_or_insert_with(Vec::new);
        let reference = range.reference();
        if merges
            .iter()
            .any(|m| m.reference().eq_ignore_ascii_case(&reference))
        {
            return;
        }
        merges.push(range);
    }

    /// Remove a merged region; drops the registry when it empties. Returns
    /// true if the region was registered.
    pub fn unmerge_cells(&mut self, range: &Range) -> bool {
        let Some(merges) = self.merges.as_mut() else {
            return false;
        };
        let reference = range.reference();
        let before = merges.len();
        merges.retain(|m| !m.reference().eq_ignore_ascii_case(&reference));
        let removed = merges.len() != before;
        if merges.is_empty() {
            self.merges = None;
        }
        removed
    }

    /// Returns true if the cell sits inside a merged region without being
    /// its top-left anchor, i.e. it is hidden behind the anchor cell.
    pub fn is_hidden_by_merge(&self, col: u32, row: u32) -> bool {
        self.merges.iter().flatten().any(|m| {
            m.contains(col, row) && !(m.start.col == col && m.start.row == row)
        })
    }

    /// Drop all row data and merges; column settings and page setup stay.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
        self.merges = None;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::CellValue;

    use super::*;

    #[test]
    fn get_row_keeps_order() {
        let mut sheet = Worksheet::new("S");
        sheet.get_row(5);
        sheet.get_row(2);
        sheet.get_row(9);
        sheet.get_row(5);
        let indices: Vec<u32> = sheet.rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 5, 9]);
    }

    #[test]
    fn cell_read_does_not_create() {
        let mut sheet = Worksheet::new("S");
        assert!(sheet.cell(1, 1).is_none());
        sheet.get_cell(1, 1).value = CellValue::from(1.0);
        assert!(sheet.cell(1, 1).is_some());
        assert_eq!(sheet.rows.len(), 1);
    }

    #[test]
    fn merge_registry_deduplicates() {
        let mut sheet = Worksheet::new("S");
        let range = Range::parse("A1:B2").unwrap();
        sheet.merge_cells(range);
        sheet.merge_cells(range);
        assert_eq!(sheet.merges.as_ref().map(Vec::len), Some(1));

        assert!(sheet.is_hidden_by_merge(2, 1));
        assert!(sheet.is_hidden_by_merge(1, 2));
        assert!(!sheet.is_hidden_by_merge(1, 1));
        assert!(!sheet.is_hidden_by_merge(3, 3));
    }

    #[test]
    fn unmerge_drops_empty_registry() {
        let mut sheet = Worksheet::new("S");
        let range = Range::parse("A1:B2").unwrap();
        sheet.merge_cells(range);
        assert!(sheet.unmerge_cells(&range));
        assert!(sheet.merges.is_none());
        assert!(!sheet.unmerge_cells(&range));
    }

    #[test]
    fn clear_rows_keeps_layout() {
        let mut sheet = Worksheet::new("S");
        sheet.get_cell(1, 1).value = CellValue::from(1.0);
        sheet.merge_cells(Range::parse("A1:B1").unwrap());
        sheet.set_column_width(1, 4, Some(12.0));
        sheet.clear_rows();
        assert!(sheet.rows.is_empty());
        assert!(sheet.merges.is_none());
        assert_eq!(sheet.columns.len(), 1);
    }

    #[test]
    fn column_widths_update_in_place() {
        let mut sheet = Worksheet::new("S");
        sheet.set_column_width(1, 4, Some(12.0));
        sheet.set_column_width(1, 4, Some(20.0));
        assert_eq!(sheet.columns.len(), 1);
        assert_eq!(sheet.column_width(3), Some(20.0));
        assert_eq!(sheet.column_width(5), None);
    }
}
