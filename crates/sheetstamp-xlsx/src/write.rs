//! Serialize the workbook model back into package parts.
//!
//! Parts the model covers (workbook, worksheets, styles, shared strings,
//! their rels and content types) are regenerated from scratch; every other
//! part of the base package is carried through untouched.

use std::collections::BTreeMap;

use sheetstamp_model::{Address, CellValue, DataType, Formula, Workbook, Worksheet};

use crate::opc::{
    escape_attr, escape_text, needs_space_preserve, next_relationship_id, parse_relationships,
    write_relationships, ContentTypes, Relationship, CT_SHARED_STRINGS, CT_STYLES, CT_WORKBOOK,
    CT_WORKSHEET, REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES, REL_TYPE_WORKSHEET,
};
use crate::package::{XlsxError, XlsxPackage};
use crate::styles::write_styles;

const XMLNS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const XMLNS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Regenerate the model-owned parts on top of the base package.
pub fn build_parts(
    workbook: &Workbook,
    base: &XlsxPackage,
) -> Result<BTreeMap<String, Vec<u8>>, XlsxError> {
    let mut parts = base.parts.clone();

    let mut rels = match base.part("xl/_rels/workbook.xml.rels") {
        Some(bytes) => parse_relationships(bytes)?,
        None => Vec::new(),
    };
    // The managed relationship kinds are rebuilt below.
    rels.retain(|r| {
        r.rel_type != REL_TYPE_WORKSHEET
            && r.rel_type != REL_TYPE_STYLES
            && r.rel_type != REL_TYPE_SHARED_STRINGS
    });

    let mut sheet_rel_ids = Vec::with_capacity(workbook.sheets.len());
    for index in 0..workbook.sheets.len() {
        let id = next_relationship_id(&rels);
        rels.push(Relationship {
            id: id.clone(),
            rel_type: REL_TYPE_WORKSHEET.to_string(),
            target: format!("worksheets/sheet{}.xml", index + 1),
        });
        sheet_rel_ids.push(id);
    }
    let styles_id = next_relationship_id(&rels);
    rels.push(Relationship {
        id: styles_id,
        rel_type: REL_TYPE_STYLES.to_string(),
        target: "styles.xml".to_string(),
    });
    if !workbook.shared_strings.is_empty() {
        let id = next_relationship_id(&rels);
        rels.push(Relationship {
            id,
            rel_type: REL_TYPE_SHARED_STRINGS.to_string(),
            target: "sharedStrings.xml".to_string(),
        });
    }
    parts.insert(
        "xl/_rels/workbook.xml.rels".to_string(),
        write_relationships(&rels),
    );

    parts.insert(
        "xl/workbook.xml".to_string(),
        build_workbook_xml(workbook, &sheet_rel_ids),
    );

    remove_stale_sheet_parts(&mut parts, workbook.sheets.len());
    for (index, sheet) in workbook.sheets.iter().enumerate() {
        parts.insert(
            format!("xl/worksheets/sheet{}.xml", index + 1),
            build_worksheet_xml(sheet),
        );
    }

    parts.insert("xl/styles.xml".to_string(), write_styles(&workbook.styles));

    if workbook.shared_strings.is_empty() {
        parts.remove("xl/sharedStrings.xml");
    } else {
        parts.insert(
            "xl/sharedStrings.xml".to_string(),
            build_shared_strings_xml(workbook),
        );
    }

    let mut types = match base.part("[Content_Types].xml") {
        Some(bytes) => ContentTypes::parse(bytes)?,
        None => ContentTypes::default(),
    };
    if !types.defaults.iter().any(|(ext, _)| ext == "rels") {
        types.defaults.push((
            "rels".to_string(),
            "application/vnd.openxmlformats-package.relationships+xml".to_string(),
        ));
    }
    if !types.defaults.iter().any(|(ext, _)| ext == "xml") {
        types
            .defaults
            .push(("xml".to_string(), "application/xml".to_string()));
    }
    types.retain_overrides(|part| {
        !part.starts_with("/xl/worksheets/sheet") || part_is_live_sheet(part, workbook.sheets.len())
    });
    types.ensure_override("/xl/workbook.xml", CT_WORKBOOK);
    types.ensure_override("/xl/styles.xml", CT_STYLES);
    for index in 0..workbook.sheets.len() {
        types.ensure_override(&format!("/xl/worksheets/sheet{}.xml", index + 1), CT_WORKSHEET);
    }
    if workbook.shared_strings.is_empty() {
        types.retain_overrides(|part| part != "/xl/sharedStrings.xml");
    } else {
        types.ensure_override("/xl/sharedStrings.xml", CT_SHARED_STRINGS);
    }
    parts.insert("[Content_Types].xml".to_string(), types.write());

    Ok(parts)
}

fn part_is_live_sheet(part: &str, sheet_count: usize) -> bool {
    sheet_number(part.trim_start_matches('/')).is_some_and(|n| n as usize <= sheet_count)
}

fn sheet_number(part: &str) -> Option<u32> {
    part.strip_prefix("xl/worksheets/sheet")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn remove_stale_sheet_parts(parts: &mut BTreeMap<String, Vec<u8>>, sheet_count: usize) {
    let stale: Vec<String> = parts
        .keys()
        .filter(|name| sheet_number(name).is_some_and(|n| n as usize > sheet_count))
        .cloned()
        .collect();
    for name in stale {
        parts.remove(&name);
    }
}

fn build_workbook_xml(workbook: &Workbook, sheet_rel_ids: &[String]) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str(XML_DECLARATION);
    xml.push_str(&format!(
        r#"<workbook xmlns="{XMLNS_MAIN}" xmlns:r="{XMLNS_REL}">"#
    ));
    xml.push_str("<sheets>");
    for (index, sheet) in workbook.sheets.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="{}"/>"#,
            escape_attr(&sheet.name),
            index + 1,
            escape_attr(&sheet_rel_ids[index])
        ));
    }
    xml.push_str("</sheets>");
    if !workbook.defined_names.is_empty() {
        xml.push_str("<definedNames>");
        for name in &workbook.defined_names {
            xml.push_str(&format!(r#"<definedName name="{}""#, escape_attr(&name.name)));
            if let Some(sheet) = name.local_sheet {
                xml.push_str(&format!(r#" localSheetId="{sheet}""#));
            }
            xml.push('>');
            xml.push_str(&escape_text(&name.reference));
            xml.push_str("</definedName>");
        }
        xml.push_str("</definedNames>");
    }
    xml.push_str("<calcPr/>");
    xml.push_str("</workbook>");
    xml.into_bytes()
}

fn build_worksheet_xml(sheet: &Worksheet) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str(XML_DECLARATION);
    xml.push_str(&format!(r#"<worksheet xmlns="{XMLNS_MAIN}">"#));

    if !sheet.columns.is_empty() {
        xml.push_str("<cols>");
        for column in &sheet.columns {
            xml.push_str(&format!(r#"<col min="{}" max="{}""#, column.min, column.max));
            if let Some(width) = column.width {
                xml.push_str(&format!(r#" width="{width}" customWidth="1""#));
            }
            if let Some(style) = column.style {
                xml.push_str(&format!(r#" style="{style}""#));
            }
            xml.push_str("/>");
        }
        xml.push_str("</cols>");
    }

    xml.push_str("<sheetData>");
    for row in &sheet.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .filter_map(|cell| cell_xml(cell, row.index))
            .collect();
        if cells.is_empty() && row.height.is_none() {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}""#, row.index));
        if let Some(height) = row.height {
            xml.push_str(&format!(r#" ht="{height}" customHeight="1""#));
        }
        if cells.is_empty() {
            xml.push_str("/>");
            continue;
        }
        xml.push('>');
        for cell in cells {
            xml.push_str(&cell);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if let Some(merges) = &sheet.merges {
        if !merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, merges.len()));
            for merge in merges {
                xml.push_str(&format!(r#"<mergeCell ref="{merge}"/>"#));
            }
            xml.push_str("</mergeCells>");
        }
    }

    let m = &sheet.page_margins;
    xml.push_str(&format!(
        r#"<pageMargins left="{}" right="{}" top="{}" bottom="{}" header="{}" footer="{}"/>"#,
        m.left, m.right, m.top, m.bottom, m.header, m.footer
    ));

    if let Some(setup) = &sheet.page_setup {
        xml.push_str("<pageSetup");
        if let Some(paper_size) = setup.paper_size {
            xml.push_str(&format!(r#" paperSize="{paper_size}""#));
        }
        if let Some(orientation) = setup.orientation {
            xml.push_str(&format!(r#" orientation="{}""#, orientation.as_attr()));
        }
        if let Some(scale) = setup.scale {
            xml.push_str(&format!(r#" scale="{scale}""#));
        }
        xml.push_str("/>");
    }

    xml.push_str("</worksheet>");
    xml.into_bytes()
}

fn cell_xml(cell: &sheetstamp_model::Cell, row: u32) -> Option<String> {
    let encoded = sheetstamp_model::encode(&cell.value);
    if encoded.is_none() && cell.formula.is_none() && cell.style.is_none() {
        return None;
    }

    let mut xml = format!(r#"<c r="{}""#, Address::new(cell.col, row));
    if let Some(style) = cell.style {
        xml.push_str(&format!(r#" s="{style}""#));
    }
    // Numbers (dates included, as serials) carry no `t`; text is written as
    // `t="str"` rather than routed through the shared-string table.
    let type_attr = match &encoded {
        None | Some((_, DataType::Number)) => None,
        Some((_, data_type)) => Some(data_type.as_attr()),
    };
    if let Some(t) = type_attr {
        xml.push_str(&format!(r#" t="{t}""#));
    }
    xml.push('>');

    match &cell.formula {
        Some(Formula::Normal { text }) => {
            xml.push_str(&format!("<f>{}</f>", escape_text(text)));
        }
        Some(Formula::Shared { group, text, range }) => match (text, range) {
            (Some(text), Some(range)) => xml.push_str(&format!(
                r#"<f t="shared" ref="{}" si="{}">{}</f>"#,
                range,
                group,
                escape_text(text)
            )),
            _ => xml.push_str(&format!(r#"<f t="shared" si="{group}"/>"#)),
        },
        None => {}
    }

    if let Some((text, _)) = &encoded {
        xml.push_str(&format!("<v>{}</v>", escape_text(text)));
    }
    xml.push_str("</c>");
    Some(xml)
}

fn build_shared_strings_xml(workbook: &Workbook) -> Vec<u8> {
    let references: usize = workbook
        .sheets
        .iter()
        .flat_map(|s| &s.rows)
        .flat_map(|r| &r.cells)
        .filter(|c| matches!(c.value, CellValue::Shared(_)))
        .count();

    let mut xml = String::new();
    xml.push_str(XML_DECLARATION);
    xml.push_str(&format!(
        r#"<sst xmlns="{XMLNS_MAIN}" count="{}" uniqueCount="{}">"#,
        references,
        workbook.shared_strings.len()
    ));
    for text in &workbook.shared_strings {
        if needs_space_preserve(text) {
            xml.push_str(&format!(
                r#"<si><t xml:space="preserve">{}</t></si>"#,
                escape_text(text)
            ));
        } else {
            xml.push_str(&format!("<si><t>{}</t></si>", escape_text(text)));
        }
    }
    xml.push_str("</sst>");
    xml.into_bytes()
}
