//! `.xlsx` package I/O for the sheetstamp workbook model.
//!
//! [`SheetDocument`] is the main entry point: it pairs a parsed
//! [`sheetstamp_model::Workbook`] with the package it came from, preserving
//! parts the model does not cover across a save. [`XlsxPackage`] exposes the
//! raw part map for callers that need to inspect or patch parts directly.

mod document;
mod opc;
mod package;
mod read;
mod recalc;
mod styles;
mod write;

pub use document::SheetDocument;
pub use package::{XlsxError, XlsxPackage};
pub use read::read_workbook;
pub use write::build_parts;
