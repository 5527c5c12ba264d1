use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use quick_xml::events::attributes::AttrError;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] AttrError),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error(transparent)]
    Model(#[from] sheetstamp_model::Error),
}

/// An OPC package materialized as a part-name → bytes map. The `BTreeMap`
/// keeps part ordering deterministic, which keeps written archives stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XlsxPackage {
    pub parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    /// Inflate every entry of a zipped package into memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.insert(entry.name().to_string(), data);
        }
        Ok(Self { parts })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// The part scaffold of a freshly created workbook with one empty sheet.
    pub fn blank() -> Self {
        let mut parts = BTreeMap::new();
        parts.insert(
            "[Content_Types].xml".to_string(),
            BLANK_CONTENT_TYPES.as_bytes().to_vec(),
        );
        parts.insert("_rels/.rels".to_string(), BLANK_ROOT_RELS.as_bytes().to_vec());
        parts.insert(
            "xl/workbook.xml".to_string(),
            BLANK_WORKBOOK.as_bytes().to_vec(),
        );
        parts.insert(
            "xl/_rels/workbook.xml.rels".to_string(),
            BLANK_WORKBOOK_RELS.as_bytes().to_vec(),
        );
        parts.insert("xl/styles.xml".to_string(), BLANK_STYLES.as_bytes().to_vec());
        parts.insert(
            "xl/worksheets/sheet1.xml".to_string(),
            BLANK_SHEET.as_bytes().to_vec(),
        );
        Self { parts }
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Like [`XlsxPackage::part`] but failing with `ResourceNotFound`.
    pub fn required_part(&self, name: &str) -> Result<&[u8], XlsxError> {
        self.part(name)
            .ok_or_else(|| XlsxError::ResourceNotFound(name.to_string()))
    }

    pub fn insert_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    /// Deflate all parts into a zipped package.
    pub fn write_to_vec(&self) -> Result<Vec<u8>, XlsxError> {
        write_parts_to_vec(&self.parts)
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        let bytes = self.write_to_vec()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

pub(crate) fn write_parts_to_vec(parts: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, XlsxError> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options =
        FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name, options)?;
        zip.write_all(bytes)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

const BLANK_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>
"#;

const BLANK_ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>
"#;

const BLANK_WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
  </sheets>
</workbook>
"#;

const BLANK_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>
"#;

const BLANK_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>
"#;

const BLANK_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData/>
</worksheet>
"#;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn zip_roundtrip_preserves_parts() {
        let package = XlsxPackage::blank();
        let bytes = package.write_to_vec().unwrap();
        let restored = XlsxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(restored, package);
    }

    #[test]
    fn blank_package_has_required_parts() {
        let package = XlsxPackage::blank();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/worksheets/sheet1.xml",
        ] {
            assert!(package.part(name).is_some(), "{name} missing");
        }
        assert!(matches!(
            package.required_part("xl/calcChain.xml"),
            Err(XlsxError::ResourceNotFound(_))
        ));
    }
}
