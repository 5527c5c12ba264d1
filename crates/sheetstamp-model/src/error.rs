use thiserror::Error;

/// Errors surfaced by the workbook model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A textual cell reference (or a reference inside a formula) could not be
    /// parsed, or a translation pushed a reference off the sheet.
    #[error("invalid cell reference: {0}")]
    InvalidAddress(String),
    /// A textual range could not be parsed, or its corners are inverted.
    #[error("invalid range: {0}")]
    InvalidRange(String),
    /// An operation targeted a worksheet name that does not exist.
    #[error("no such worksheet: {0}")]
    MissingSheet(String),
    /// A defined-name lookup failed.
    #[error("no such defined name: {0}")]
    MissingDefinedName(String),
}
