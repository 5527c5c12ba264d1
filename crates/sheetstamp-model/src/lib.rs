//! In-memory SpreadsheetML workbook model.
//!
//! The model is IO-agnostic: it holds worksheets of sparse ordered rows,
//! the workbook-scoped registries (style pool, shared strings, defined
//! names), and the operations the stamping engine is built from — cell
//! value/formula/style access through an active-sheet cursor, lexical
//! formula translation, and template capture/binding. Reading and writing
//! actual `.xlsx` packages lives in `sheetstamp-xlsx`.

mod address;
mod cell;
mod error;
mod formula;
mod range;
mod style;
mod template;
mod value;
mod workbook;
mod worksheet;

pub use address::{column_index, column_letters, Address};
pub use cell::{Cell, Formula, Row};
pub use error::Error;
pub use formula::translate_formula;
pub use range::Range;
pub use style::{
    Alignment, Border, BorderEdge, BorderStyle, CellFormat, Color, Fill, Font,
    HorizontalAlignment, NumberFormat, PatternType, SpreadsheetStyle, StylePool,
    VerticalAlignment, CUSTOM_NUMBER_FORMAT_OFFSET, DATE_NUMBER_FORMAT_ID,
};
pub use template::{BindSource, SpreadTemplate, TemplateItem};
pub use value::{
    datetime_to_serial, decode, encode, is_date_format_id, serial_to_datetime, CellValue,
    DataType,
};
pub use workbook::{DefinedName, Workbook, PRINT_AREA_NAME};
pub use worksheet::{ColumnRange, Orientation, PageMargins, PageSetup, Worksheet};
