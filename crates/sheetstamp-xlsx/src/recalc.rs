//! Save-time recalculation policy.
//!
//! Stamped cells carry formulas whose cached results are stale or absent,
//! and a leftover `calcChain.xml` no longer matches the sheet contents.
//! Every save therefore drops the calculation chain and marks the workbook
//! for a full recalculation on next open.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::opc::{escape_attr, parse_relationships, write_relationships, ContentTypes};
use crate::package::XlsxError;

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

pub(crate) fn apply_recalc_policy(parts: &mut BTreeMap<String, Vec<u8>>) -> Result<(), XlsxError> {
    parts.remove(CALC_CHAIN_PART);

    if let Some(bytes) = parts.get("xl/_rels/workbook.xml.rels") {
        let mut rels = parse_relationships(bytes)?;
        let before = rels.len();
        rels.retain(|r| {
            r.rel_type != REL_TYPE_CALC_CHAIN && !r.target.ends_with("calcChain.xml")
        });
        if rels.len() != before {
            parts.insert(
                "xl/_rels/workbook.xml.rels".to_string(),
                write_relationships(&rels),
            );
        }
    }

    if let Some(bytes) = parts.get("[Content_Types].xml") {
        let mut types = ContentTypes::parse(bytes)?;
        let before = types.overrides.len();
        types.retain_overrides(|part| part != "/xl/calcChain.xml");
        if types.overrides.len() != before {
            parts.insert("[Content_Types].xml".to_string(), types.write());
        }
    }

    if let Some(bytes) = parts.get("xl/workbook.xml") {
        let xml = std::str::from_utf8(bytes).map_err(|_| {
            XlsxError::MalformedDocument("xl/workbook.xml is not valid UTF-8".to_string())
        })?;
        let patched = patch_calc_pr(xml)?;
        parts.insert("xl/workbook.xml".to_string(), patched.into_bytes());
    }

    Ok(())
}

/// Rewrite `<calcPr>` with `fullCalcOnLoad` and `forceFullCalc` set,
/// keeping its other attributes; insert the element when absent.
fn patch_calc_pr(xml: &str) -> Result<String, XlsxError> {
    let Some(start) = xml.find("<calcPr") else {
        let Some(end) = xml.rfind("</workbook>") else {
            return Err(XlsxError::MalformedDocument(
                "xl/workbook.xml has no workbook element".to_string(),
            ));
        };
        let mut patched = String::with_capacity(xml.len() + 48);
        patched.push_str(&xml[..end]);
        patched.push_str(r#"<calcPr fullCalcOnLoad="1" forceFullCalc="1"/>"#);
        patched.push_str(&xml[end..]);
        return Ok(patched);
    };

    let tag_end = xml[start..].find('>').map(|i| start + i + 1).ok_or_else(|| {
        XlsxError::MalformedDocument("unterminated calcPr element".to_string())
    })?;
    // calcPr is an empty element, but tolerate a start/end pair.
    let element_end = if xml[..tag_end].ends_with("/>") {
        tag_end
    } else {
        match xml[tag_end..].find("</calcPr>") {
            Some(i) => tag_end + i + "</calcPr>".len(),
            None => tag_end,
        }
    };

    let mut replacement = String::from("<calcPr");
    for (key, value) in element_attributes(&xml[start..tag_end])? {
        if key == "fullCalcOnLoad" || key == "forceFullCalc" {
            continue;
        }
        replacement.push_str(&format!(r#" {key}="{}""#, escape_attr(&value)));
    }
    replacement.push_str(r#" fullCalcOnLoad="1" forceFullCalc="1"/>"#);

    let mut patched = String::with_capacity(xml.len() + 48);
    patched.push_str(&xml[..start]);
    patched.push_str(&replacement);
    patched.push_str(&xml[element_end..]);
    Ok(patched)
}

fn element_attributes(tag: &str) -> Result<Vec<(String, String)>, XlsxError> {
    // Close the fragment so the parser sees a complete element.
    let fragment = if tag.ends_with("/>") {
        tag.to_string()
    } else if let Some(stripped) = tag.strip_suffix('>') {
        format!("{stripped}/>")
    } else {
        format!("{tag}/>")
    };
    let mut reader = Reader::from_str(&fragment);
    let mut attrs = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) => {
                for attr in e.attributes() {
                    let attr = attr?;
                    attrs.push((
                        String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        attr.unescape_value()?.into_owned(),
                    ));
                }
                break;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parts_with_workbook(workbook_xml: &str) -> BTreeMap<String, Vec<u8>> {
        let mut parts = BTreeMap::new();
        parts.insert(
            "xl/workbook.xml".to_string(),
            workbook_xml.as_bytes().to_vec(),
        );
        parts
    }

    #[test]
    fn inserts_calc_pr_when_absent() {
        let mut parts = parts_with_workbook("<workbook><sheets/></workbook>");
        apply_recalc_policy(&mut parts).unwrap();
        let xml = String::from_utf8(parts["xl/workbook.xml"].clone()).unwrap();
        assert_eq!(
            xml,
            r#"<workbook><sheets/><calcPr fullCalcOnLoad="1" forceFullCalc="1"/></workbook>"#
        );
    }

    #[test]
    fn patches_existing_calc_pr_keeping_other_attributes() {
        let mut parts = parts_with_workbook(
            r#"<workbook><sheets/><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#,
        );
        apply_recalc_policy(&mut parts).unwrap();
        let xml = String::from_utf8(parts["xl/workbook.xml"].clone()).unwrap();
        assert_eq!(
            xml,
            r#"<workbook><sheets/><calcPr calcId="191029" fullCalcOnLoad="1" forceFullCalc="1"/></workbook>"#
        );
    }

    #[test]
    fn drops_calc_chain_part_rel_and_content_type() {
        let mut parts = parts_with_workbook("<workbook><sheets/></workbook>");
        parts.insert(CALC_CHAIN_PART.to_string(), b"<calcChain/>".to_vec());
        parts.insert(
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_TYPE_CALC_CHAIN}" Target="calcChain.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        parts.insert(
            "[Content_Types].xml".to_string(),
            br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#
                .to_vec(),
        );

        apply_recalc_policy(&mut parts).unwrap();

        assert!(!parts.contains_key(CALC_CHAIN_PART));
        let rels = parse_relationships(&parts["xl/_rels/workbook.xml.rels"]).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].id, "rId2");
        let types = ContentTypes::parse(&parts["[Content_Types].xml"]).unwrap();
        assert_eq!(types.overrides.len(), 1);
        assert_eq!(types.overrides[0].0, "/xl/styles.xml");
    }
}
