use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::formula::translate_formula;
use crate::style::DATE_NUMBER_FORMAT_ID;
use crate::value::{decode, encode};
use crate::{Address, CellValue, DataType, Error, Formula, Range, Workbook};

/// Provides field values for placeholder binding. Implemented for the map
/// types; domain records implement it by matching on their field names.
pub trait BindSource {
    fn field(&self, name: &str) -> Option<CellValue>;
}

impl<S: Borrow<str> + Eq + Hash> BindSource for HashMap<S, CellValue> {
    fn field(&self, name: &str) -> Option<CellValue> {
        self.get(name).cloned()
    }
}

impl<S: Borrow<str> + Ord> BindSource for BTreeMap<S, CellValue> {
    fn field(&self, name: &str) -> Option<CellValue> {
        self.get(name).cloned()
    }
}

/// The empty source; every lookup misses, so placeholders stamp verbatim.
impl BindSource for () {
    fn field(&self, _name: &str) -> Option<CellValue> {
        None
    }
}

impl<T: BindSource + ?Sized> BindSource for &T {
    fn field(&self, name: &str) -> Option<CellValue> {
        (**self).field(name)
    }
}

/// One captured cell: stored text and datatype, resolved formula text, and
/// the style index it carried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Formula text with any shared-group indirection already resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
}

/// An immutable snapshot of a worksheet region, captured from a defined
/// name and stamped onto targets with [`Workbook::put_data`]. Formula text
/// and merges keep their source coordinates; binding translates them by
/// `target − origin`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpreadTemplate {
    /// Top-left corner of the captured region.
    origin: Address,
    /// Row-major grid; `None` marks cells that were absent in the source.
    cells: Vec<Vec<Option<TemplateItem>>>,
    heights: Vec<Option<f64>>,
    merges: Vec<Range>,
}

impl SpreadTemplate {
    pub fn row_count(&self) -> u32 {
        self.cells.len() as u32
    }

    pub fn column_count(&self) -> u32 {
        self.cells.first().map_or(0, |row| row.len() as u32)
    }

    pub fn origin(&self) -> Address {
        self.origin
    }

    /// Item by 1-based position within the snapshot (`1, 1` is its top-left
    /// cell).
    pub fn item(&self, col: u32, row: u32) -> Option<&TemplateItem> {
        self.cells
            .get(row.checked_sub(1)? as usize)?
            .get(col.checked_sub(1)? as usize)?
            .as_ref()
    }

    pub fn merges(&self) -> &[Range] {
        &self.merges
    }
}

impl Workbook {
    /// Snapshot the region a defined name points at.
    ///
    /// A sheet-qualified reference moves the cursor for the duration of the
    /// capture and restores it afterwards, on success and failure alike.
    pub fn capture_template(&mut self, name: &str) -> Result<SpreadTemplate, Error> {
        let reference = self
            .defined_name(name)
            .ok_or_else(|| Error::MissingDefinedName(name.to_string()))?
            .reference
            .clone();
        let previous = self.active_index();
        let result = self.capture_reference(&reference);
        self.set_active_index(previous);
        result
    }

    fn capture_reference(&mut self, reference: &str) -> Result<SpreadTemplate, Error> {
        let parts: Vec<&str> = reference.split('!').collect();
        let range_text = match parts.as_slice() {
            [range] => range,
            [sheet, range] => {
                let sheet = sheet.trim_matches('\'');
                if !self.move_to_sheet(sheet) {
                    return Err(Error::MissingSheet(sheet.to_string()));
                }
                range
            }
            _ => return Err(Error::InvalidRange(reference.to_string())),
        };
        let range = Range::parse(range_text)?;
        self.snapshot_range(range)
    }

    fn snapshot_range(&mut self, range: Range) -> Result<SpreadTemplate, Error> {
        let start = range.start;
        let last = range.last();

        let mut cells = Vec::with_capacity(range.height() as usize);
        let mut heights = Vec::with_capacity(range.height() as usize);
        for row in start.row..=last.row {
            let mut items = Vec::with_capacity(range.width() as usize);
            for col in start.col..=last.col {
                // Shared formulas resolve against this sheet's masters.
                let formula = self.formula_text(col, row)?;
                let item = self.sheet_cell_snapshot(col, row, formula)?;
                items.push(item);
            }
            cells.push(items);
            heights.push(self.current()?.row(row).and_then(|r| r.height));
        }

        let mut merges = Vec::new();
        for merge in self.current()?.merges.iter().flatten() {
            if range.contains_range(merge) {
                merges.push(*merge);
            }
        }

        Ok(SpreadTemplate {
            origin: start,
            cells,
            heights,
            merges,
        })
    }

    fn sheet_cell_snapshot(
        &self,
        col: u32,
        row: u32,
        formula: Option<String>,
    ) -> Result<Option<TemplateItem>, Error> {
        let Some(cell) = self.current()?.cell(col, row) else {
            return Ok(None);
        };
        // Shared-string indirection does not survive into a snapshot; the
        // item carries the resolved text.
        let (text, data_type) = match &cell.value {
            CellValue::Shared(index) => (
                Some(
                    self.shared_string(*index)
                        .unwrap_or_default()
                        .to_string(),
                ),
                Some(DataType::String),
            ),
            value => match encode(value) {
                Some((text, data_type)) => (Some(text), Some(data_type)),
                None => (None, None),
            },
        };
        Ok(Some(TemplateItem {
            text,
            data_type,
            formula,
            style: cell.style,
        }))
    }

    /// Stamp one template instance at `target`, binding `data` into
    /// `[FieldName]` placeholders. Returns the first row index below the
    /// stamped region.
    ///
    /// With `bind_only` the target is assumed to be a previously stamped
    /// copy of the same template: only bound placeholder values are written
    /// and cached formula results cleared; the formulas themselves,
    /// styling, heights and merges are left alone.
    pub fn put_data<T: BindSource>(
        &mut self,
        target: Address,
        data: &T,
        template: &SpreadTemplate,
        bind_only: bool,
    ) -> Result<u32, Error> {
        self.bind_instance(target, data, template, bind_only)?;
        Ok(target.row + template.row_count())
    }

    /// Stamp a template without any data; placeholders land verbatim.
    pub fn put_template(&mut self, target: Address, template: &SpreadTemplate) -> Result<u32, Error> {
        self.put_data(target, &(), template, false)
    }

    /// Stamp one instance per item, each directly below the previous one.
    /// Returns the first row index below the last instance.
    pub fn put_data_list<T: BindSource>(
        &mut self,
        target: Address,
        items: &[T],
        template: &SpreadTemplate,
        bind_only: bool,
    ) -> Result<u32, Error> {
        let mut row = target.row;
        for item in items {
            self.bind_instance(Address::new(target.col, row), item, template, bind_only)?;
            row += template.row_count();
        }
        Ok(row)
    }

    fn bind_instance(
        &mut self,
        origin: Address,
        data: &dyn BindSource,
        template: &SpreadTemplate,
        bind_only: bool,
    ) -> Result<(), Error> {
        let col_delta = i64::from(origin.col) - i64::from(template.origin.col);
        let row_delta = i64::from(origin.row) - i64::from(template.origin.row);

        // Translate every formula and merge up front so a bad reference
        // fails before anything is written. Bind-only leaves the formulas
        // already on the sheet alone and only clears their cached results.
        let mut formulas: Vec<(u32, u32, Option<String>, Option<u32>)> = Vec::new();
        for (ri, items) in template.cells.iter().enumerate() {
            for (ci, item) in items.iter().enumerate() {
                if let Some(item) = item {
                    if let Some(formula) = &item.formula {
                        let translated = (!bind_only)
                            .then(|| translate_formula(formula, col_delta, row_delta))
                            .transpose()?;
                        formulas.push((
                            origin.col + ci as u32,
                            origin.row + ri as u32,
                            translated,
                            item.style,
                        ));
                    }
                }
            }
        }
        let mut merges = Vec::with_capacity(template.merges.len());
        for merge in &template.merges {
            merges.push(merge.translate(col_delta, row_delta)?);
        }

        for (col, row, formula, style) in formulas {
            let cell = self.current_mut()?.get_cell(col, row);
            cell.value = CellValue::Empty;
            if let Some(formula) = formula {
                cell.formula = Some(Formula::normal(formula));
                if let Some(style) = style {
                    cell.style = Some(style);
                }
            }
        }

        for (ri, items) in template.cells.iter().enumerate() {
            for (ci, item) in items.iter().enumerate() {
                let Some(item) = item else { continue };
                if item.formula.is_some() {
                    continue;
                }
                let col = origin.col + ci as u32;
                let row = origin.row + ri as u32;
                self.bind_value(col, row, item, data, bind_only)?;
            }
        }

        if !bind_only {
            for (ri, height) in template.heights.iter().enumerate() {
                if let Some(height) = height {
                    self.current_mut()?
                        .set_row_height(origin.row + ri as u32, Some(*height));
                }
            }
            for merge in merges {
                self.current_mut()?.merge_cells(merge);
            }
        }
        Ok(())
    }

    fn bind_value(
        &mut self,
        col: u32,
        row: u32,
        item: &TemplateItem,
        data: &dyn BindSource,
        bind_only: bool,
    ) -> Result<(), Error> {
        let text = item.text.as_deref().unwrap_or("");
        let bound = placeholder_name(text).and_then(|name| data.field(name));

        if let Some(value) = bound {
            if bind_only {
                let cell = self.current_mut()?.get_cell(col, row);
                cell.value = value;
                cell.formula = None;
            } else {
                self.set_cell_value(col, row, value, None)?;
            }
            return Ok(());
        }

        if bind_only {
            return Ok(());
        }

        let mut needs_date_style = false;
        {
            let cell = self.current_mut()?.get_cell(col, row);
            if let Some(text) = &item.text {
                cell.value = decode(text, item.data_type, None, &[]);
                cell.formula = None;
            }
            if let Some(style) = item.style {
                cell.style = Some(style);
            } else {
                needs_date_style =
                    matches!(cell.value, CellValue::DateTime(_)) && cell.style.is_none();
            }
        }
        if needs_date_style {
            let style = self.styles.builtin_style_index(DATE_NUMBER_FORMAT_ID);
            self.current_mut()?.get_cell(col, row).style = Some(style);
        }
        Ok(())
    }
}

fn placeholder_name(text: &str) -> Option<&str> {
    text.strip_prefix('[')?.strip_suffix(']').filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;

    fn build_order_sheet(wb: &mut Workbook) {
        wb.add_sheet(Some("Order"));
        wb.set_cell_value(1, 1, "Order", None).unwrap();
        wb.set_cell_value(2, 1, "[OrderNo]", None).unwrap();
        wb.set_cell_value(1, 2, "Date", None).unwrap();
        wb.set_cell_value(2, 2, "[OrderDate]", None).unwrap();
        wb.set_cell_formula(4, 2, Some("B2&C2"), None).unwrap();
        wb.active_sheet_mut()
            .unwrap()
            .merge_cells(Range::parse("B1:C1").unwrap());
        wb.active_sheet_mut().unwrap().set_row_height(1, Some(24.0));
        wb.set_defined_name("OrderTpl", None, "'Order'!A1:D2");
        wb.move_to_sheet("Sheet1");
    }

    #[test]
    fn capture_requires_the_name() {
        let mut wb = Workbook::new();
        assert_eq!(
            wb.capture_template("Nope"),
            Err(Error::MissingDefinedName("Nope".to_string()))
        );
    }

    #[test]
    fn capture_restores_cursor() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();
        assert_eq!(wb.active_sheet().map(|s| s.name.as_str()), Some("Sheet1"));
        assert_eq!(tpl.row_count(), 2);
        assert_eq!(tpl.column_count(), 4);

        // Bad sheet qualifier fails and still restores the cursor.
        wb.set_defined_name("Broken", None, "'Gone'!A1:B2");
        assert_eq!(
            wb.capture_template("Broken"),
            Err(Error::MissingSheet("Gone".to_string()))
        );
        assert_eq!(wb.active_sheet().map(|s| s.name.as_str()), Some("Sheet1"));
    }

    #[test]
    fn capture_snapshots_cells_heights_and_merges() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();

        let label = tpl.item(1, 1).unwrap();
        assert_eq!(label.text.as_deref(), Some("Order"));
        assert_eq!(label.data_type, Some(DataType::String));

        let formula = tpl.item(4, 2).unwrap();
        assert_eq!(formula.formula.as_deref(), Some("B2&C2"));

        assert!(tpl.item(3, 1).is_none());
        assert_eq!(tpl.merges(), &[Range::parse("B1:C1").unwrap()]);
    }

    #[test]
    fn put_data_binds_and_translates() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();

        let data = HashMap::from([
            ("OrderNo", CellValue::from(1007.0)),
            ("OrderDate", CellValue::from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
        ]);
        let next = wb.put_data(Address::new(1, 10), &data, &tpl, false).unwrap();
        assert_eq!(next, 12);

        assert_eq!(wb.cell_value(1, 10), CellValue::Text("Order".into()));
        assert_eq!(wb.cell_value(2, 10), CellValue::Number(1007.0));
        assert_eq!(
            wb.cell_value(2, 11),
            CellValue::from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        // Bound date picked up the builtin date format.
        let style = wb.cell_style_index(2, 11).unwrap();
        assert_eq!(wb.styles.number_format_of(style), Some(14));

        // Formula translated from template coordinates to the target.
        assert_eq!(wb.formula_text(4, 11).unwrap(), Some("B11&C11".into()));

        // Merge re-created at the target, heights copied.
        let sheet = wb.active_sheet().unwrap();
        assert_eq!(sheet.merges.as_deref(), Some(&[Range::parse("B10:C10").unwrap()][..]));
        assert_eq!(sheet.row(10).unwrap().height, Some(24.0));
    }

    #[test]
    fn missing_field_leaves_placeholder() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();
        wb.put_template(Address::new(1, 5), &tpl).unwrap();
        assert_eq!(wb.cell_value(2, 5), CellValue::Text("[OrderNo]".into()));
    }

    #[test]
    fn bind_only_touches_values_not_layout() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();
        wb.put_template(Address::new(1, 5), &tpl).unwrap();
        wb.active_sheet_mut().unwrap().set_row_height(5, Some(99.0));

        let data = HashMap::from([("OrderNo", CellValue::from(42.0))]);
        wb.put_data(Address::new(1, 5), &data, &tpl, true).unwrap();

        assert_eq!(wb.cell_value(2, 5), CellValue::Number(42.0));
        // Unbound placeholder untouched in bind-only mode.
        assert_eq!(wb.cell_value(2, 6), CellValue::Text("[OrderDate]".into()));
        // Layout untouched.
        assert_eq!(wb.active_sheet().unwrap().row(5).unwrap().height, Some(99.0));
        // Cached formula results cleared.
        assert!(wb.cell(4, 6).unwrap().value.is_empty());
        assert_eq!(wb.formula_text(4, 6).unwrap(), Some("B6&C6".into()));
    }

    #[test]
    fn bind_only_keeps_edited_formulas() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();
        wb.put_template(Address::new(1, 5), &tpl).unwrap();
        // The stamped formula was edited after the first stamp.
        wb.set_cell_formula(4, 6, Some("SUM(B6:C6)"), None).unwrap();
        wb.active_sheet_mut().unwrap().get_cell(4, 6).value = CellValue::Number(9.0);

        let data = HashMap::from([("OrderNo", CellValue::from(1.0))]);
        wb.put_data(Address::new(1, 5), &data, &tpl, true).unwrap();

        // Cached result cleared, edited formula untouched.
        assert!(wb.cell(4, 6).unwrap().value.is_empty());
        assert_eq!(wb.formula_text(4, 6).unwrap(), Some("SUM(B6:C6)".into()));
    }

    #[test]
    fn rebinding_the_same_data_is_idempotent() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();

        let data = HashMap::from([
            ("OrderNo", CellValue::from(1007.0)),
            ("OrderDate", CellValue::from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
        ]);
        wb.put_data(Address::new(1, 10), &data, &tpl, false).unwrap();
        let first = wb.active_sheet().unwrap().clone();
        wb.put_data(Address::new(1, 10), &data, &tpl, false).unwrap();
        assert_eq!(wb.active_sheet().unwrap(), &first);
    }

    #[test]
    fn put_data_list_advances_by_row_count() {
        let mut wb = Workbook::new();
        build_order_sheet(&mut wb);
        let tpl = wb.capture_template("OrderTpl").unwrap();

        let rows: Vec<HashMap<&str, CellValue>> = (0..3)
            .map(|i| HashMap::from([("OrderNo", CellValue::from(100.0 + i as f64))]))
            .collect();
        let next = wb
            .put_data_list(Address::new(1, 1), &rows, &tpl, false)
            .unwrap();
        assert_eq!(next, 7);
        assert_eq!(wb.cell_value(2, 1), CellValue::Number(100.0));
        assert_eq!(wb.cell_value(2, 3), CellValue::Number(101.0));
        assert_eq!(wb.cell_value(2, 5), CellValue::Number(102.0));
    }

    #[test]
    fn failed_translation_aborts_before_writing() {
        let mut wb = Workbook::new();
        wb.add_sheet(Some("T"));
        // A1 refers one row up from A2; stamping at row 1 pushes it off the
        // sheet.
        wb.set_cell_formula(1, 2, Some("A1+1"), None).unwrap();
        wb.set_cell_value(1, 1, "header", None).unwrap();
        wb.set_defined_name("Tpl", None, "'T'!A2:A2");
        wb.move_to_sheet("Sheet1");
        let tpl = wb.capture_template("Tpl").unwrap();

        let err = wb.put_template(Address::new(3, 1), &tpl);
        assert!(err.is_err());
        assert!(wb.cell(3, 1).is_none());
    }
}
