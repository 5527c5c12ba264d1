//! End-to-end template stamping through a save/reopen cycle.

use std::collections::HashMap;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sheetstamp_model::{Address, CellValue, Range};
use sheetstamp_xlsx::SheetDocument;

/// A document with a `Data` sheet and an `Order` template sheet covering
/// `A1:D4`: a header row with an `[OrderNo]` placeholder and a `C1:D1`
/// merge, an `[OrderDate]` row, a computation row, and a spacer row.
fn order_document() -> SheetDocument {
    let mut document = SheetDocument::new().expect("blank document");
    let workbook = &mut document.workbook;
    workbook.active_sheet_mut().unwrap().name = "Data".to_string();
    assert!(workbook.add_sheet(Some("Order")));
    assert!(workbook.move_to_sheet("Order"));

    workbook.set_cell_value(1, 1, "Order", None).unwrap();
    workbook.set_cell_value(2, 1, "[OrderNo]", None).unwrap();
    workbook
        .active_sheet_mut()
        .unwrap()
        .merge_cells(Range::parse("C1:D1").unwrap());
    workbook
        .active_sheet_mut()
        .unwrap()
        .set_row_height(1, Some(24.0));

    workbook.set_cell_value(1, 2, "Date", None).unwrap();
    workbook.set_cell_value(2, 2, "[OrderDate]", None).unwrap();

    workbook.set_cell_value(2, 3, 2.0, None).unwrap();
    workbook.set_cell_value(3, 3, 3.0, None).unwrap();
    workbook.set_cell_formula(4, 3, Some("B3*C3"), None).unwrap();

    workbook.set_defined_name("OrderTpl", None, "'Order'!A1:D4");
    assert!(workbook.move_to_sheet("Data"));
    document
}

fn order(no: f64, date: NaiveDate) -> HashMap<&'static str, CellValue> {
    HashMap::from([
        ("OrderNo", CellValue::Number(no)),
        ("OrderDate", CellValue::DateTime(date.and_hms_opt(0, 0, 0).unwrap())),
    ])
}

#[test]
fn stamped_list_survives_save_and_reopen() {
    let mut document = order_document();
    let template = document
        .workbook
        .capture_template("OrderTpl")
        .expect("capture");
    assert_eq!(template.row_count(), 4);
    // Capturing from another sheet leaves the cursor where it was.
    assert_eq!(document.workbook.active_sheet().unwrap().name, "Data");

    let items = [
        order(100.0, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()),
        order(101.0, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()),
        order(102.0, NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()),
    ];
    let next = document
        .workbook
        .put_data_list(Address::new(1, 5), &items, &template, false)
        .expect("stamp list");
    assert_eq!(next, 17);

    let bytes = document.save_to_vec().expect("save");
    let mut reopened = SheetDocument::open_bytes(&bytes).expect("reopen");
    let workbook = &mut reopened.workbook;
    assert!(workbook.move_to_sheet("Data"));

    for (i, expected_no) in [100.0, 101.0, 102.0].into_iter().enumerate() {
        let top = 5 + 4 * i as u32;
        assert_eq!(workbook.cell_value(1, top), CellValue::Text("Order".into()));
        assert_eq!(workbook.cell_value(2, top), CellValue::Number(expected_no));
        assert_eq!(
            workbook.formula_text(4, top + 2).unwrap(),
            Some(format!("B{}*C{}", top + 2, top + 2))
        );
    }

    // Placeholder dates landed with the builtin date format applied.
    assert_eq!(
        workbook.cell_value(2, 6),
        CellValue::DateTime(
            NaiveDate::from_ymd_opt(2026, 1, 5)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        )
    );

    let sheet = workbook.active_sheet().unwrap();
    let merges = sheet.merges.as_deref().unwrap_or_default();
    for top in [5u32, 9, 13] {
        let merge = Range::new(Address::new(3, top), Some(Address::new(4, top))).unwrap();
        assert!(merges.contains(&merge), "missing merge at row {top}");
        assert_eq!(sheet.row(top).and_then(|r| r.height), Some(24.0));
    }
}

#[test]
fn bind_only_refreshes_values_without_restyling() {
    let mut document = order_document();
    let template = document
        .workbook
        .capture_template("OrderTpl")
        .expect("capture");

    let workbook = &mut document.workbook;
    let first = [order(100.0, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())];
    workbook
        .put_data_list(Address::new(1, 1), &first, &template, false)
        .unwrap();

    // Rebind in place with new figures.
    let second = order(200.0, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    workbook
        .put_data(Address::new(1, 1), &second, &template, true)
        .unwrap();

    let bytes = document.save_to_vec().unwrap();
    let mut reopened = SheetDocument::open_bytes(&bytes).unwrap();
    let workbook = &mut reopened.workbook;
    assert!(workbook.move_to_sheet("Data"));

    assert_eq!(workbook.cell_value(2, 1), CellValue::Number(200.0));
    // Static labels and structure from the first stamp are untouched.
    assert_eq!(workbook.cell_value(1, 1), CellValue::Text("Order".into()));
    assert_eq!(
        workbook.formula_text(4, 3).unwrap(),
        Some("B3*C3".to_string())
    );
    let sheet = workbook.active_sheet().unwrap();
    assert_eq!(sheet.row(1).and_then(|r| r.height), Some(24.0));
}

#[test]
fn save_to_disk_and_open_again() {
    let mut document = order_document();
    let template = document.workbook.capture_template("OrderTpl").unwrap();
    let items = [order(7.0, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())];
    document
        .workbook
        .put_data_list(Address::new(1, 1), &items, &template, false)
        .unwrap();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("orders.xlsx");
    document.save(&path).expect("save to disk");

    let reopened = SheetDocument::open(&path).expect("open from disk");
    assert_eq!(reopened.workbook.sheets.len(), 2);
    assert_eq!(
        reopened.workbook.sheet_by_name("Data").and_then(|s| s.cell(2, 1)).map(|c| c.value.clone()),
        Some(CellValue::Number(7.0))
    );
}
