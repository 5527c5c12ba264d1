//! OPC plumbing shared by the reader and writer: relationship parts and
//! `[Content_Types].xml`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::package::XlsxError;

pub(crate) const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

pub(crate) const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub(crate) const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub(crate) const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Parse a `.rels` part into its relationship entries.
pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"Id" => id = value,
                        b"Type" => rel_type = value,
                        b"Target" => target = value,
                        _ => {}
                    }
                }
                rels.push(Relationship {
                    id,
                    rel_type,
                    target,
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

pub(crate) fn write_relationships(rels: &[Relationship]) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for rel in rels {
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            escape_attr(&rel.id),
            escape_attr(&rel.rel_type),
            escape_attr(&rel.target)
        ));
    }
    xml.push_str("</Relationships>");
    xml.into_bytes()
}

/// Lowest unused `rIdN` id.
pub(crate) fn next_relationship_id(rels: &[Relationship]) -> String {
    let mut n = 1u32;
    while rels.iter().any(|r| r.id == format!("rId{n}")) {
        n += 1;
    }
    format!("rId{n}")
}

/// Resolve a workbook-relative relationship target to a package part name
/// (`worksheets/sheet1.xml` → `xl/worksheets/sheet1.xml`).
pub(crate) fn workbook_part_name(target: &str) -> String {
    let target = target.trim_start_matches('/');
    if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{target}")
    }
}

/// The `[Content_Types].xml` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentTypes {
    pub defaults: Vec<(String, String)>,
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut types = ContentTypes::default();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    let name = e.local_name();
                    if name.as_ref() != b"Default" && name.as_ref() != b"Override" {
                        buf.clear();
                        continue;
                    }
                    let mut key = String::new();
                    let mut content_type = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => key = value,
                            b"ContentType" => content_type = value,
                            _ => {}
                        }
                    }
                    if name.as_ref() == b"Default" {
                        types.defaults.push((key, content_type));
                    } else {
                        types.overrides.push((key, content_type));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(types)
    }

    pub fn ensure_override(&mut self, part_name: &str, content_type: &str) {
        if !self.overrides.iter().any(|(p, _)| p == part_name) {
            self.overrides
                .push((part_name.to_string(), content_type.to_string()));
        }
    }

    /// Drop overrides for worksheet parts that no longer exist.
    pub fn retain_overrides(&mut self, keep: impl Fn(&str) -> bool) {
        self.overrides.retain(|(p, _)| keep(p));
    }

    pub fn write(&self) -> Vec<u8> {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for (extension, content_type) in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_attr(extension),
                escape_attr(content_type)
            ));
        }
        for (part_name, content_type) in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_attr(part_name),
                escape_attr(content_type)
            ));
        }
        xml.push_str("</Types>");
        xml.into_bytes()
    }
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s).replace('\"', "&quot;").replace('\'', "&apos;")
}

pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn relationships_roundtrip() {
        let rels = vec![
            Relationship {
                id: "rId1".into(),
                rel_type: REL_TYPE_WORKSHEET.into(),
                target: "worksheets/sheet1.xml".into(),
            },
            Relationship {
                id: "rId2".into(),
                rel_type: REL_TYPE_STYLES.into(),
                target: "styles.xml".into(),
            },
        ];
        let xml = write_relationships(&rels);
        assert_eq!(parse_relationships(&xml).unwrap(), rels);
        assert_eq!(next_relationship_id(&rels), "rId3");
    }

    #[test]
    fn next_id_fills_gaps() {
        let rels = vec![Relationship {
            id: "rId2".into(),
            rel_type: REL_TYPE_STYLES.into(),
            target: "styles.xml".into(),
        }];
        assert_eq!(next_relationship_id(&rels), "rId1");
    }

    #[test]
    fn workbook_targets_resolve() {
        assert_eq!(workbook_part_name("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(workbook_part_name("/xl/styles.xml"), "xl/styles.xml");
        assert_eq!(workbook_part_name("xl/sharedStrings.xml"), "xl/sharedStrings.xml");
    }

    #[test]
    fn content_types_ensure_and_retain() {
        let mut types = ContentTypes::parse(
            br#"<?xml version="1.0"?><Types xmlns="x"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/worksheets/sheet9.xml" ContentType="w"/></Types>"#,
        )
        .unwrap();
        types.ensure_override("/xl/styles.xml", CT_STYLES);
        types.ensure_override("/xl/styles.xml", CT_STYLES);
        assert_eq!(types.overrides.len(), 2);
        types.retain_overrides(|p| !p.starts_with("/xl/worksheets/"));
        assert_eq!(types.overrides.len(), 1);
        let restored = ContentTypes::parse(&types.write()).unwrap();
        assert_eq!(restored, types);
    }
}
