//! Open/edit/save/reopen coverage for the model-owned parts.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sheetstamp_model::{
    CellValue, Color, DataType, Formula, Orientation, PageSetup, Range, SpreadsheetStyle,
};
use sheetstamp_xlsx::SheetDocument;

#[test]
fn values_styles_and_layout_survive_a_save() {
    let mut document = SheetDocument::new().expect("blank document");
    let workbook = &mut document.workbook;

    workbook.set_cell_value(1, 1, "Timesheet", None).unwrap();
    workbook.set_cell_value(2, 1, 40.5, None).unwrap();
    workbook.set_cell_value(3, 1, true, None).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 8, 28)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    workbook.set_cell_value(4, 1, date, None).unwrap();

    let header = SpreadsheetStyle::new()
        .bold(true)
        .background(Color::from_hex("DDEBF7").unwrap())
        .horizontal(sheetstamp_model::HorizontalAlignment::Center);
    workbook.set_cell_style(1, 1, &header).unwrap();

    workbook.set_cell_formula(5, 1, Some("B1*2"), None).unwrap();

    let sheet = workbook.active_sheet_mut().unwrap();
    sheet.set_row_height(1, Some(22.5));
    sheet.merge_cells(Range::parse("A3:C3").unwrap());
    sheet.set_column_width(1, 1, Some(24.0));
    sheet.page_setup = Some(PageSetup {
        paper_size: Some(9),
        orientation: Some(Orientation::Landscape),
        scale: None,
    });
    workbook
        .set_print_area(Range::parse("A1:E10").unwrap())
        .unwrap();

    let bytes = document.save_to_vec().expect("save");
    let mut reopened = SheetDocument::open_bytes(&bytes).expect("reopen");
    let workbook = &mut reopened.workbook;

    assert_eq!(workbook.cell_value(1, 1), CellValue::Text("Timesheet".into()));
    assert_eq!(workbook.cell_value(2, 1), CellValue::Number(40.5));
    assert_eq!(workbook.cell_value(3, 1), CellValue::Bool(true));
    assert_eq!(workbook.cell_value(4, 1), CellValue::DateTime(date));
    assert_eq!(
        workbook.formula_text(5, 1).unwrap(),
        Some("B1*2".to_string())
    );

    let style = workbook.cell_style(1, 1).expect("header style survived");
    assert!(style.font.bold);

    let sheet = workbook.active_sheet().unwrap();
    assert_eq!(sheet.row(1).and_then(|r| r.height), Some(22.5));
    assert_eq!(
        sheet.merges.as_deref(),
        Some(&[Range::parse("A3:C3").unwrap()][..])
    );
    assert_eq!(sheet.column_width(1), Some(24.0));
    assert_eq!(
        sheet.page_setup.as_ref().and_then(|s| s.orientation),
        Some(Orientation::Landscape)
    );
    assert_eq!(workbook.print_area(), Some("'Sheet1'!$A$1:$E$10"));
}

#[test]
fn shared_strings_round_trip_by_index() {
    let mut document = SheetDocument::new().unwrap();
    let first = document.workbook.intern_shared_string("repeated");
    let second = document.workbook.intern_shared_string("repeated");
    assert_eq!(first, second);
    document
        .workbook
        .set_cell_value(1, 1, CellValue::Shared(first), None)
        .unwrap();
    document
        .workbook
        .set_cell_value(1, 2, CellValue::Shared(first), None)
        .unwrap();

    let bytes = document.save_to_vec().unwrap();
    let reopened = SheetDocument::open_bytes(&bytes).unwrap();
    assert_eq!(
        reopened.workbook.cell_value(1, 1),
        CellValue::Text("repeated".into())
    );
    assert_eq!(
        reopened.workbook.cell_value(1, 2),
        CellValue::Text("repeated".into())
    );
    assert_eq!(reopened.workbook.shared_string(first), Some("repeated"));
}

#[test]
fn shared_formula_dependents_resolve_after_reopen() {
    let mut document = SheetDocument::new().unwrap();
    let sheet = document.workbook.active_sheet_mut().unwrap();
    sheet.get_cell(4, 1).formula = Some(Formula::Shared {
        group: 0,
        text: Some("B1*C1".into()),
        range: Some(Range::parse("D1:D3").unwrap()),
    });
    for row in 2..=3 {
        sheet.get_cell(4, row).formula = Some(Formula::Shared {
            group: 0,
            text: None,
            range: None,
        });
    }

    let bytes = document.save_to_vec().unwrap();
    let mut reopened = SheetDocument::open_bytes(&bytes).unwrap();
    assert_eq!(
        reopened.workbook.formula_text(4, 2).unwrap(),
        Some("B2*C2".to_string())
    );
    assert_eq!(
        reopened.workbook.formula_text(4, 3).unwrap(),
        Some("B3*C3".to_string())
    );
}

#[test]
fn expected_type_forces_date_decoding() {
    let mut document = SheetDocument::new().unwrap();
    // A bare serial with no date format on the cell.
    document
        .workbook
        .set_cell_value(1, 1, 45352.0, None)
        .unwrap();
    let bytes = document.save_to_vec().unwrap();
    let reopened = SheetDocument::open_bytes(&bytes).unwrap();

    assert_eq!(
        reopened.workbook.cell_value(1, 1),
        CellValue::Number(45352.0)
    );
    let forced = reopened
        .workbook
        .cell_value_as(1, 1, Some(DataType::Date));
    assert_eq!(
        forced,
        CellValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        )
    );
}
