use std::path::Path;

use sheetstamp_model::Workbook;

use crate::package::{write_parts_to_vec, XlsxError, XlsxPackage};
use crate::read::read_workbook;
use crate::recalc::apply_recalc_policy;
use crate::write::build_parts;

/// A workbook bound to its backing package.
///
/// The package keeps every part of the opened file, so parts the model does
/// not cover (themes, doc properties, drawings) survive an open/edit/save
/// cycle untouched. Saving regenerates the model-owned parts, then applies
/// the recalculation policy so formula results are recomputed on next open.
#[derive(Debug, Clone)]
pub struct SheetDocument {
    pub workbook: Workbook,
    package: XlsxPackage,
}

impl SheetDocument {
    /// A fresh document with one empty sheet.
    pub fn new() -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::blank())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::from_path(path)?)
    }

    pub fn open_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::from_bytes(bytes)?)
    }

    pub fn from_package(package: XlsxPackage) -> Result<Self, XlsxError> {
        let workbook = read_workbook(&package)?;
        Ok(Self { workbook, package })
    }

    pub fn save_to_vec(&self) -> Result<Vec<u8>, XlsxError> {
        let mut parts = build_parts(&self.workbook, &self.package)?;
        apply_recalc_policy(&mut parts)?;
        write_parts_to_vec(&parts)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        let bytes = self.save_to_vec()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
