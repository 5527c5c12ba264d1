//! Streaming parse of a package into the workbook model.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use sheetstamp_model::{
    decode, Address, CellValue, ColumnRange, DataType, DefinedName, Formula, Orientation,
    PageMargins, PageSetup, Range, StylePool, Workbook, Worksheet,
};

use crate::opc::{parse_relationships, workbook_part_name, Relationship};
use crate::package::{XlsxError, XlsxPackage};
use crate::styles::{parse_styles, parse_xml_bool};

/// Load the model from a materialized package. Parts the model does not
/// cover (themes, doc properties, drawings) are left alone; the caller
/// keeps the package around for preservation on save.
pub fn read_workbook(package: &XlsxPackage) -> Result<Workbook, XlsxError> {
    let workbook_xml = package.part("xl/workbook.xml").ok_or_else(|| {
        XlsxError::MalformedDocument("missing xl/workbook.xml".to_string())
    })?;
    let rels = match package.part("xl/_rels/workbook.xml.rels") {
        Some(bytes) => parse_relationships(bytes)?,
        None => Vec::new(),
    };

    let (sheet_refs, defined_names) = parse_workbook_xml(workbook_xml)?;

    let styles = match part_for(package, &rels, crate::opc::REL_TYPE_STYLES) {
        Some(bytes) => parse_styles(bytes)?,
        None => StylePool::new(),
    };
    let shared_strings = match part_for(package, &rels, crate::opc::REL_TYPE_SHARED_STRINGS) {
        Some(bytes) => parse_shared_strings(bytes)?,
        None => Vec::new(),
    };

    let mut sheets = Vec::with_capacity(sheet_refs.len());
    for (name, rel_id) in sheet_refs {
        let rel = rels.iter().find(|r| r.id == rel_id).ok_or_else(|| {
            XlsxError::MalformedDocument(format!("sheet '{name}' references unknown {rel_id}"))
        })?;
        let part_name = workbook_part_name(&rel.target);
        let bytes = package.required_part(&part_name)?;
        sheets.push(parse_worksheet(&name, bytes)?);
    }

    Ok(Workbook::from_parts(
        sheets,
        styles,
        shared_strings,
        defined_names,
    ))
}

fn part_for<'a>(
    package: &'a XlsxPackage,
    rels: &[Relationship],
    rel_type: &str,
) -> Option<&'a [u8]> {
    let rel = rels.iter().find(|r| r.rel_type == rel_type)?;
    package.part(&workbook_part_name(&rel.target))
}

type SheetRef = (String, String);

fn parse_workbook_xml(xml: &[u8]) -> Result<(Vec<SheetRef>, Vec<DefinedName>), XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut sheets = Vec::new();
    let mut defined_names = Vec::new();
    let mut pending_name: Option<DefinedName> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"name" => name = value,
                        b"r:id" => rel_id = value,
                        _ => {}
                    }
                }
                sheets.push((name, rel_id));
            }
            Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                let mut name = String::new();
                let mut local_sheet = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"name" => name = value.into_owned(),
                        b"localSheetId" => local_sheet = value.parse().ok(),
                        _ => {}
                    }
                }
                pending_name = Some(DefinedName {
                    name,
                    local_sheet,
                    reference: String::new(),
                });
            }
            Event::Text(t) => {
                if let Some(pending) = pending_name.as_mut() {
                    pending.reference.push_str(&t.unescape()?);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"definedName" => {
                if let Some(pending) = pending_name.take() {
                    defined_names.push(pending);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, defined_names))
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut table = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                // Rich-text runs concatenate; phonetic runs do not count.
                b"t" if in_si => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => table.push(String::new()),
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => {
                    in_si = false;
                    table.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(table)
}

#[derive(Default)]
struct PendingFormula {
    shared: bool,
    group: Option<u32>,
    range: Option<Range>,
    text: String,
}

#[derive(Default)]
struct PendingCell {
    col: u32,
    row: u32,
    style: Option<u32>,
    data_type: Option<DataType>,
    value_text: Option<String>,
    inline_text: Option<String>,
    formula: Option<PendingFormula>,
}

enum TextTarget {
    None,
    Value,
    FormulaText,
    InlineText,
}

fn parse_worksheet(name: &str, xml: &[u8]) -> Result<Worksheet, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut sheet = Worksheet::new(name);
    let mut current_row: u32 = 0;
    let mut next_col: u32 = 1;
    let mut cell: Option<PendingCell> = None;
    let mut target = TextTarget::None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"row" => {
                        let mut index = current_row + 1;
                        let mut height = None;
                        let mut custom_height = false;
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"r" => index = value.parse().unwrap_or(index),
                                b"ht" => height = value.parse().ok(),
                                b"customHeight" => custom_height = parse_xml_bool(&value),
                                _ => {}
                            }
                        }
                        current_row = index;
                        next_col = 1;
                        let row = sheet.get_row(index);
                        if custom_height || height.is_some() {
                            row.height = height;
                        }
                    }
                    b"c" => {
                        let mut pending = PendingCell {
                            col: next_col,
                            row: current_row,
                            ..PendingCell::default()
                        };
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"r" => {
                                    let address = Address::parse(&value)?;
                                    pending.col = address.col;
                                    pending.row = address.row;
                                }
                                b"s" => pending.style = value.parse().ok(),
                                b"t" => pending.data_type = DataType::from_attr(&value),
                                _ => {}
                            }
                        }
                        next_col = pending.col + 1;
                        target = TextTarget::None;
                        if empty {
                            commit_cell(&mut sheet, pending);
                        } else {
                            cell = Some(pending);
                        }
                    }
                    b"v" if cell.is_some() => target = TextTarget::Value,
                    b"t" if cell.is_some() => target = TextTarget::InlineText,
                    b"f" if cell.is_some() => {
                        let mut formula = PendingFormula::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"t" => formula.shared = value.as_ref() == "shared",
                                b"si" => formula.group = value.parse().ok(),
                                b"ref" => formula.range = Range::parse(&value).ok(),
                                _ => {}
                            }
                        }
                        if let Some(cell) = cell.as_mut() {
                            cell.formula = Some(formula);
                        }
                        if !empty {
                            target = TextTarget::FormulaText;
                        }
                    }
                    b"mergeCell" => {
                        let mut reference = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"ref" {
                                reference = Some(attr.unescape_value()?.into_owned());
                            }
                        }
                        if let Some(reference) = reference {
                            sheet.merge_cells(Range::parse(&reference)?);
                        }
                    }
                    b"col" => {
                        let mut column = ColumnRange {
                            min: 1,
                            max: 1,
                            width: None,
                            style: None,
                        };
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"min" => column.min = value.parse().unwrap_or(1),
                                b"max" => column.max = value.parse().unwrap_or(1),
                                b"width" => column.width = value.parse().ok(),
                                b"style" => column.style = value.parse().ok(),
                                _ => {}
                            }
                        }
                        sheet.columns.push(column);
                    }
                    b"pageMargins" => {
                        let mut margins = PageMargins::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            let Ok(parsed) = value.parse::<f64>() else {
                                continue;
                            };
                            match attr.key.as_ref() {
                                b"left" => margins.left = parsed,
                                b"right" => margins.right = parsed,
                                b"top" => margins.top = parsed,
                                b"bottom" => margins.bottom = parsed,
                                b"header" => margins.header = parsed,
                                b"footer" => margins.footer = parsed,
                                _ => {}
                            }
                        }
                        sheet.page_margins = margins;
                    }
                    b"pageSetup" => {
                        let mut setup = PageSetup::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"paperSize" => setup.paper_size = value.parse().ok(),
                                b"orientation" => {
                                    setup.orientation = Orientation::from_attr(&value)
                                }
                                b"scale" => setup.scale = value.parse().ok(),
                                _ => {}
                            }
                        }
                        sheet.page_setup = Some(setup);
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                if let Some(cell) = cell.as_mut() {
                    match target {
                        TextTarget::Value => {
                            cell.value_text.get_or_insert_with(String::new).push_str(&text)
                        }
                        TextTarget::InlineText => {
                            cell.inline_text
                                .get_or_insert_with(String::new)
                                .push_str(&text)
                        }
                        TextTarget::FormulaText => {
                            if let Some(formula) = cell.formula.as_mut() {
                                formula.text.push_str(&text);
                            }
                        }
                        TextTarget::None => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" | b"f" => target = TextTarget::None,
                b"c" => {
                    target = TextTarget::None;
                    if let Some(pending) = cell.take() {
                        commit_cell(&mut sheet, pending);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
}

fn commit_cell(sheet: &mut Worksheet, pending: PendingCell) {
    let value = match (&pending.data_type, &pending.value_text) {
        (Some(DataType::SharedString), Some(text)) => match text.trim().parse::<u32>() {
            // Shared-string indirection is kept; it resolves on access.
            Ok(index) => CellValue::Shared(index),
            Err(_) => CellValue::Text(text.clone()),
        },
        (Some(DataType::InlineString), _) => match &pending.inline_text {
            Some(text) => CellValue::Text(text.clone()),
            None => CellValue::Empty,
        },
        (data_type, Some(text)) => decode(text, *data_type, None, &[]),
        (_, None) => match &pending.inline_text {
            Some(text) => CellValue::Text(text.clone()),
            None => CellValue::Empty,
        },
    };
    let formula = pending.formula.map(|f| {
        if f.shared {
            Formula::Shared {
                group: f.group.unwrap_or(0),
                text: (!f.text.is_empty()).then_some(f.text),
                range: f.range,
            }
        } else {
            Formula::Normal { text: f.text }
        }
    });

    let cell = sheet.get_cell(pending.col, pending.row.max(1));
    cell.value = value;
    cell.formula = formula;
    cell.style = pending.style;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn worksheet_cells_and_layout() {
        let xml = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <cols><col min="1" max="2" width="18.5" customWidth="1"/></cols>
  <sheetData>
    <row r="1" ht="24" customHeight="1">
      <c r="A1" t="s"><v>0</v></c>
      <c r="B1" s="2"><v>3.5</v></c>
      <c r="C1" t="b"><v>1</v></c>
      <c r="D1" t="inlineStr"><is><t>inline</t></is></c>
    </row>
    <row r="3">
      <c r="A3" t="str"><f>B1*2</f><v>7</v></c>
    </row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
  <pageMargins left="0.25" right="0.25" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>
  <pageSetup paperSize="9" orientation="landscape"/>
</worksheet>"#;
        let sheet = parse_worksheet("S", xml).unwrap();

        assert_eq!(sheet.cell(1, 1).unwrap().value, CellValue::Shared(0));
        assert_eq!(sheet.cell(2, 1).unwrap().value, CellValue::Number(3.5));
        assert_eq!(sheet.cell(2, 1).unwrap().style, Some(2));
        assert_eq!(sheet.cell(3, 1).unwrap().value, CellValue::Bool(true));
        assert_eq!(
            sheet.cell(4, 1).unwrap().value,
            CellValue::Text("inline".into())
        );
        assert_eq!(
            sheet.cell(1, 3).unwrap().formula,
            Some(Formula::Normal {
                text: "B1*2".into()
            })
        );
        assert_eq!(sheet.row(1).unwrap().height, Some(24.0));
        assert_eq!(sheet.merges.as_ref().map(Vec::len), Some(1));
        assert_eq!(sheet.columns[0].width, Some(18.5));
        assert_eq!(sheet.page_margins.left, 0.25);
        assert_eq!(
            sheet.page_setup.as_ref().and_then(|s| s.orientation),
            Some(Orientation::Landscape)
        );
    }

    #[test]
    fn shared_formula_groups() {
        let xml = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="D1"><f t="shared" ref="D1:D3" si="0">B1*C1</f><v>10</v></c></row>
    <row r="2"><c r="D2"><f t="shared" si="0"/><v>20</v></c></row>
  </sheetData>
</worksheet>"#;
        let sheet = parse_worksheet("S", xml).unwrap();
        assert_eq!(
            sheet.cell(4, 1).unwrap().formula,
            Some(Formula::Shared {
                group: 0,
                text: Some("B1*C1".into()),
                range: Some(Range::parse("D1:D3").unwrap()),
            })
        );
        assert_eq!(
            sheet.cell(4, 2).unwrap().formula,
            Some(Formula::Shared {
                group: 0,
                text: None,
                range: None,
            })
        );
        assert_eq!(sheet.cell(4, 2).unwrap().value, CellValue::Number(20.0));
    }

    #[test]
    fn cells_without_references_advance_positionally() {
        let xml = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row><c><v>1</v></c><c><v>2</v></c></row>
    <row><c><v>3</v></c></row>
  </sheetData>
</worksheet>"#;
        let sheet = parse_worksheet("S", xml).unwrap();
        assert_eq!(sheet.cell(1, 1).unwrap().value, CellValue::Number(1.0));
        assert_eq!(sheet.cell(2, 1).unwrap().value, CellValue::Number(2.0));
        assert_eq!(sheet.cell(1, 2).unwrap().value, CellValue::Number(3.0));
    }

    #[test]
    fn workbook_sheets_and_defined_names() {
        let xml = br#"<?xml version="1.0"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Data" sheetId="1" r:id="rId1"/>
    <sheet name="Order" sheetId="2" r:id="rId2"/>
  </sheets>
  <definedNames>
    <definedName name="OrderTpl">'Order'!$A$1:$D$4</definedName>
    <definedName name="_xlnm.Print_Area" localSheetId="0">'Data'!$A$1:$H$20</definedName>
  </definedNames>
</workbook>"#;
        let (sheets, names) = parse_workbook_xml(xml).unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[1], ("Order".to_string(), "rId2".to_string()));
        assert_eq!(names[0].reference, "'Order'!$A$1:$D$4");
        assert_eq!(names[1].local_sheet, Some(0));
    }

    #[test]
    fn shared_strings_concatenate_runs() {
        let xml = br#"<?xml version="1.0"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
  <si><t>plain</t></si>
  <si><r><t>ri</t></r><r><t>ch</t></r></si>
  <si><t xml:space="preserve"> padded </t></si>
</sst>"#;
        let table = parse_shared_strings(xml).unwrap();
        assert_eq!(table, vec!["plain", "rich", " padded "]);
    }
}
