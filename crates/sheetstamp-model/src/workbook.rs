use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::formula::translate_formula;
use crate::style::DATE_NUMBER_FORMAT_ID;
use crate::value::{is_date_format_id, serial_to_datetime};
use crate::{
    Address, Cell, CellValue, DataType, Error, Formula, Range, SpreadsheetStyle, StylePool,
    Worksheet,
};

/// Reserved defined name holding a sheet's print area.
pub const PRINT_AREA_NAME: &str = "_xlnm.Print_Area";

/// A workbook-level name bound to a reference string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedName {
    pub name: String,
    /// 0-based sheet index for sheet-scoped names; `None` is workbook scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_sheet: Option<u32>,
    pub reference: String,
}

/// The workbook: worksheets plus the workbook-scoped registries (style pool,
/// shared strings, defined names) and an active-sheet cursor that the cell
/// operations go through.
#[derive(Clone, Debug, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
    pub styles: StylePool,
    pub shared_strings: Vec<String>,
    pub defined_names: Vec<DefinedName>,
    #[serde(skip)]
    shared_index: HashMap<String, u32>,
    #[serde(skip)]
    active: Option<usize>,
    /// Lazily built per-sheet map of shared-formula group → (master text,
    /// master anchor). Invalidated whenever the cursor moves.
    #[serde(skip)]
    shared_formula_memo: Option<HashMap<u32, (String, Address)>>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl<'de> Deserialize<'de> for Workbook {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Parts {
            #[serde(default)]
            sheets: Vec<Worksheet>,
            #[serde(default)]
            styles: StylePool,
            #[serde(default)]
            shared_strings: Vec<String>,
            #[serde(default)]
            defined_names: Vec<DefinedName>,
        }
        let parts = Parts::deserialize(deserializer)?;
        Ok(Workbook::from_parts(
            parts.sheets,
            parts.styles,
            parts.shared_strings,
            parts.defined_names,
        ))
    }
}

impl Workbook {
    /// A workbook with a single empty `Sheet1`.
    pub fn new() -> Self {
        Self::from_parts(
            vec![Worksheet::new("Sheet1")],
            StylePool::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Assemble a workbook from loaded parts, rebuilding the runtime
    /// indexes. The cursor starts on the first sheet.
    pub fn from_parts(
        sheets: Vec<Worksheet>,
        styles: StylePool,
        shared_strings: Vec<String>,
        defined_names: Vec<DefinedName>,
    ) -> Self {
        let shared_index = shared_strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        let active = if sheets.is_empty() { None } else { Some(0) };
        Self {
            sheets,
            styles,
            shared_strings,
            defined_names,
            shared_index,
            active,
            shared_formula_memo: None,
        }
    }

    // ---- sheet management ----

    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_sheet(&self) -> Option<&Worksheet> {
        self.active.and_then(|i| self.sheets.get(i))
    }

    pub fn active_sheet_mut(&mut self) -> Option<&mut Worksheet> {
        self.active.and_then(|i| self.sheets.get_mut(i))
    }

    /// Move the cursor; any cached shared-formula state is dropped.
    pub(crate) fn set_active_index(&mut self, index: Option<usize>) {
        self.active = index.filter(|i| *i < self.sheets.len());
        self.shared_formula_memo = None;
    }

    /// Point the cursor at the named sheet. Returns false (cursor
    /// unchanged) when no sheet has that name.
    pub fn move_to_sheet(&mut self, name: &str) -> bool {
        match self.sheet_index(name) {
            Some(index) => {
                self.set_active_index(Some(index));
                true
            }
            None => false,
        }
    }

    /// Append a sheet and move the cursor to it. With `None` a free
    /// `SheetN` name is generated; an explicit name that already exists is
    /// rejected.
    pub fn add_sheet(&mut self, name: Option<&str>) -> bool {
        let name = match name {
            Some(name) => {
                if self.sheet_by_name(name).is_some() {
                    return false;
                }
                name.to_string()
            }
            None => {
                let mut n = self.sheets.len() + 1;
                while self.sheet_by_name(&format!("Sheet{n}")).is_some() {
                    n += 1;
                }
                format!("Sheet{n}")
            }
        };
        self.sheets.push(Worksheet::new(name));
        self.set_active_index(Some(self.sheets.len() - 1));
        true
    }

    /// Remove the sheet under the cursor, dropping names scoped to it and
    /// re-pointing names scoped to later sheets. Leaves the cursor unset.
    pub fn remove_active_sheet(&mut self) -> bool {
        let Some(index) = self.active else {
            return false;
        };
        self.sheets.remove(index);
        let removed = index as u32;
        self.defined_names.retain(|n| n.local_sheet != Some(removed));
        for name in &mut self.defined_names {
            if let Some(scope) = name.local_sheet {
                if scope > removed {
                    name.local_sheet = Some(scope - 1);
                }
            }
        }
        self.set_active_index(None);
        true
    }

    pub(crate) fn current(&self) -> Result<&Worksheet, Error> {
        self.active
            .and_then(|i| self.sheets.get(i))
            .ok_or_else(no_active_sheet)
    }

    pub(crate) fn current_mut(&mut self) -> Result<&mut Worksheet, Error> {
        self.active
            .and_then(|i| self.sheets.get_mut(i))
            .ok_or_else(no_active_sheet)
    }

    /// Copy the column layout (widths, column styles) of the named sheet
    /// onto the active sheet.
    pub fn copy_columns_from(&mut self, name: &str) -> Result<(), Error> {
        let columns = self
            .sheet_by_name(name)
            .ok_or_else(|| Error::MissingSheet(name.to_string()))?
            .columns
            .clone();
        self.current_mut()?.columns = columns;
        Ok(())
    }

    // ---- shared strings ----

    /// Deduplicating append into the shared-string table.
    pub fn intern_shared_string(&mut self, text: &str) -> u32 {
        if let Some(index) = self.shared_index.get(text) {
            return *index;
        }
        let index = self.shared_strings.len() as u32;
        self.shared_strings.push(text.to_string());
        self.shared_index.insert(text.to_string(), index);
        index
    }

    pub fn shared_string(&self, index: u32) -> Option<&str> {
        self.shared_strings.get(index as usize).map(String::as_str)
    }

    // ---- defined names ----

    /// Insert or overwrite the name with the given scope.
    pub fn set_defined_name(
        &mut self,
        name: &str,
        local_sheet: Option<u32>,
        reference: impl Into<String>,
    ) {
        let reference = reference.into();
        if let Some(existing) = self
            .defined_names
            .iter_mut()
            .find(|n| n.name == name && n.local_sheet == local_sheet)
        {
            existing.reference = reference;
            return;
        }
        self.defined_names.push(DefinedName {
            name: name.to_string(),
            local_sheet,
            reference,
        });
    }

    /// First name matching `name`, regardless of scope.
    pub fn defined_name(&self, name: &str) -> Option<&DefinedName> {
        self.defined_names.iter().find(|n| n.name == name)
    }

    /// Set the active sheet's print area, stored `$`-anchored and
    /// sheet-scoped under the reserved name.
    pub fn set_print_area(&mut self, range: Range) -> Result<(), Error> {
        let index = self.active.ok_or_else(no_active_sheet)? as u32;
        let sheet = self.current()?.name.clone();
        let anchored = Range {
            start: Address::absolute(range.start.col, range.start.row),
            end: range.end.map(|e| Address::absolute(e.col, e.row)),
        };
        self.set_defined_name(
            PRINT_AREA_NAME,
            Some(index),
            format!("'{sheet}'!{anchored}"),
        );
        Ok(())
    }

    /// The active sheet's print-area reference, if one is set.
    pub fn print_area(&self) -> Option<&str> {
        let index = self.active? as u32;
        self.defined_names
            .iter()
            .find(|n| n.name == PRINT_AREA_NAME && n.local_sheet == Some(index))
            .map(|n| n.reference.as_str())
    }

    // ---- cell operations (through the cursor) ----

    pub fn cell(&self, col: u32, row: u32) -> Option<&Cell> {
        self.active_sheet()?.cell(col, row)
    }

    /// Write a value. Replaces any formula in the cell. A calendar value
    /// landing in an unstyled cell picks up the builtin date format unless
    /// an explicit style is given.
    pub fn set_cell_value(
        &mut self,
        col: u32,
        row: u32,
        value: impl Into<CellValue>,
        style: Option<u32>,
    ) -> Result<(), Error> {
        let value = value.into();
        let auto_style = if style.is_none() && matches!(value, CellValue::DateTime(_)) {
            let unstyled = self
                .current()?
                .cell(col, row)
                .map_or(true, |c| c.style.is_none());
            unstyled.then(|| self.styles.builtin_style_index(DATE_NUMBER_FORMAT_ID))
        } else {
            None
        };
        let cell = self.current_mut()?.get_cell(col, row);
        cell.value = value;
        cell.formula = None;
        if let Some(style) = style.or(auto_style) {
            cell.style = Some(style);
        }
        Ok(())
    }

    /// [`Workbook::set_cell_value`] addressed by reference text.
    pub fn set_cell_value_at(
        &mut self,
        reference: &str,
        value: impl Into<CellValue>,
        style: Option<u32>,
    ) -> Result<(), Error> {
        let address = Address::parse(reference)?;
        self.set_cell_value(address.col, address.row, value, style)
    }

    /// Read a value, resolving shared strings and applying date inference
    /// from the cell's number format.
    pub fn cell_value(&self, col: u32, row: u32) -> CellValue {
        self.cell_value_as(col, row, None)
    }

    /// Read a value under an expected datatype. `Some(DataType::Date)`
    /// forces a stored number to decode as a calendar value; `None` infers
    /// dates from the cell's number format.
    pub fn cell_value_as(&self, col: u32, row: u32, expected: Option<DataType>) -> CellValue {
        let Some(cell) = self.active_sheet().and_then(|s| s.cell(col, row)) else {
            return CellValue::Empty;
        };
        match &cell.value {
            CellValue::Shared(index) => match self.shared_string(*index) {
                Some(text) => CellValue::Text(text.to_string()),
                None => CellValue::Text(index.to_string()),
            },
            CellValue::Number(n) => {
                let as_date = match expected {
                    Some(DataType::Date) => true,
                    None => cell
                        .style
                        .and_then(|s| self.styles.number_format_of(s))
                        .is_some_and(is_date_format_id),
                    _ => false,
                };
                if as_date {
                    match serial_to_datetime(*n) {
                        Some(dt) => CellValue::DateTime(dt),
                        None => CellValue::Number(*n),
                    }
                } else {
                    CellValue::Number(*n)
                }
            }
            other => other.clone(),
        }
    }

    /// Write or remove a formula. Writing clears the cached value; removing
    /// deletes the cell outright.
    pub fn set_cell_formula(
        &mut self,
        col: u32,
        row: u32,
        formula: Option<&str>,
        style: Option<u32>,
    ) -> Result<(), Error> {
        let sheet = self.current_mut()?;
        match formula {
            Some(text) => {
                let cell = sheet.get_cell(col, row);
                cell.formula = Some(Formula::normal(text));
                cell.value = CellValue::Empty;
                if let Some(style) = style {
                    cell.style = Some(style);
                }
            }
            None => {
                sheet.get_row(row).remove_cell(col);
            }
        }
        Ok(())
    }

    /// Resolve the formula text of a cell. Shared-group dependents get the
    /// master text translated from the master's anchor to the target cell.
    pub fn formula_text(&mut self, col: u32, row: u32) -> Result<Option<String>, Error> {
        let group = {
            let Some(cell) = self.current()?.cell(col, row) else {
                return Ok(None);
            };
            match &cell.formula {
                None => return Ok(None),
                Some(Formula::Normal { text }) => return Ok(Some(text.clone())),
                Some(Formula::Shared {
                    text: Some(text), ..
                }) => return Ok(Some(text.clone())),
                Some(Formula::Shared { group, .. }) => *group,
            }
        };
        self.shared_formula(group, Address::new(col, row))
    }

    fn shared_formula(&mut self, group: u32, target: Address) -> Result<Option<String>, Error> {
        if self.shared_formula_memo.is_none() {
            let mut memo = HashMap::new();
            for row in &self.current()?.rows {
                for cell in &row.cells {
                    if let Some(Formula::Shared {
                        group,
                        text: Some(text),
                        ..
                    }) = &cell.formula
                    {
                        memo.entry(*group)
                            .or_insert_with(|| (text.clone(), Address::new(cell.col, row.index)));
                    }
                }
            }
            self.shared_formula_memo = Some(memo);
        }
        let Some((text, anchor)) = self
            .shared_formula_memo
            .as_ref()
            .and_then(|memo| memo.get(&group))
            .cloned()
        else {
            return Ok(None);
        };
        let col_delta = i64::from(target.col) - i64::from(anchor.col);
        let row_delta = i64::from(target.row) - i64::from(anchor.row);
        translate_formula(&text, col_delta, row_delta).map(Some)
    }

    // ---- styles on cells ----

    /// Resolve the composed style against the pool and stamp it on the cell.
    pub fn set_cell_style(
        &mut self,
        col: u32,
        row: u32,
        style: &SpreadsheetStyle,
    ) -> Result<u32, Error> {
        let index = self.styles.lookup_style_index(style);
        self.current_mut()?.get_cell(col, row).style = Some(index);
        Ok(index)
    }

    pub fn cell_style_index(&self, col: u32, row: u32) -> Option<u32> {
        self.cell(col, row)?.style
    }

    /// Reconstruct the composed style applied to a cell.
    pub fn cell_style(&self, col: u32, row: u32) -> Option<SpreadsheetStyle> {
        self.styles.style_at(self.cell_style_index(col, row)?)
    }
}

fn no_active_sheet() -> Error {
    Error::MissingSheet("(no active sheet)".to_string())
}
