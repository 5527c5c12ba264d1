use serde::{Deserialize, Serialize};

use crate::{CellValue, Range};

/// A cell formula. Shared formulas store their text only on the group
/// master; dependents carry just the group id and resolve through the
/// master's anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    Normal {
        text: String,
    },
    Shared {
        group: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<Range>,
    },
}

impl Formula {
    pub fn normal(text: impl Into<String>) -> Self {
        Formula::Normal { text: text.into() }
    }

    /// Returns true if this is the text-carrying master of a shared group.
    pub fn is_shared_master(&self) -> bool {
        matches!(self, Formula::Shared { text: Some(_), .. })
    }
}

/// A single cell. `value` holds the stored value, which for a formula cell
/// is the cached result of the last calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// 1-indexed column.
    pub col: u32,
    #[serde(default, skip_serializing_if = "CellValue::is_empty")]
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
    /// Index into the workbook's cell-format table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
}

impl Cell {
    pub fn new(col: u32) -> Self {
        Self {
            col,
            value: CellValue::Empty,
            formula: None,
            style: None,
        }
    }
}

/// A sparse worksheet row. Cells are kept ordered by column; appends at the
/// end are the common case and hit a last-element fast path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Row {
    /// 1-indexed row number.
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            height: None,
            cells: Vec::new(),
        }
    }

    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.iter().find(|c| c.col == col)
    }

    /// Get or create the cell in `col`, keeping the list ordered.
    pub fn get_cell(&mut self, col: u32) -> &mut Cell {
        match self.cells.last() {
            Some(last) if last.col == col => {}
            Some(last) if last.col < col => self.cells.push(Cell::new(col)),
            _ => {
                let at = self.cells.partition_point(|c| c.col < col);
                if self.cells.get(at).map(|c| c.col) != Some(col) {
                    self.cells.insert(at, Cell::new(col));
                }
                return &mut self.cells[at];
            }
        }
        let last = self.cells.len() - 1;
        &mut self.cells[last]
    }

    pub fn remove_cell(&mut self, col: u32) -> bool {
        let before = self.cells.len();
        self.cells.retain(|c| c.col != col);
        self.cells.len() != before
    }
}
