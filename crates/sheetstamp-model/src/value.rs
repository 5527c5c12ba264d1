use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Day zero of the spreadsheet serial-date scheme. Serial `1.0` is
/// 1899-12-31, serial `2.0` is 1900-01-01, and fractional parts are time of
/// day. The 1900 leap-year quirk is absorbed by this epoch choice.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

const SECONDS_PER_DAY: f64 = 86_400.0;

fn serial_epoch() -> NaiveDate {
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// The `c/@t` datatype attribute of a stored cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Date,
    Error,
    InlineString,
    Number,
    SharedString,
    String,
}

impl DataType {
    /// The attribute value used in worksheet XML.
    pub fn as_attr(self) -> &'static str {
        match self {
            DataType::Boolean => "b",
            DataType::Date => "d",
            DataType::Error => "e",
            DataType::InlineString => "inlineStr",
            DataType::Number => "n",
            DataType::SharedString => "s",
            DataType::String => "str",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "b" => DataType::Boolean,
            "d" => DataType::Date,
            "e" => DataType::Error,
            "inlineStr" => DataType::InlineString,
            "n" => DataType::Number,
            "s" => DataType::SharedString,
            "str" => DataType::String,
            _ => return None,
        })
    }
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Empty / unset cell value.
    Empty,
    /// Plain text.
    Text(String),
    /// Index into the workbook's shared-string table.
    Shared(u32),
    /// IEEE-754 double precision number.
    Number(f64),
    Bool(bool),
    /// Calendar value; stored as a serial number on the wire.
    DateTime(NaiveDateTime),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// The datatype attribute this value is stored under, `None` for empty.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(_) => Some(DataType::String),
            CellValue::Shared(_) => Some(DataType::SharedString),
            CellValue::Number(_) => Some(DataType::Number),
            CellValue::Bool(_) => Some(DataType::Boolean),
            CellValue::DateTime(_) => Some(DataType::Number),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(f64::from(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::DateTime(value.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

/// Builtin number-format ids that render a number as a date or time. A cell
/// whose format id is in this set decodes as a date.
pub fn is_date_format_id(id: u16) -> bool {
    matches!(id, 14..=22 | 27..=36 | 50..=58)
}

/// Convert a calendar value to its serial-number form.
pub fn datetime_to_serial(value: &NaiveDateTime) -> f64 {
    let days = (value.date() - serial_epoch()).num_days() as f64;
    let seconds =
        f64::from(value.time().num_seconds_from_midnight()) + f64::from(value.nanosecond()) / 1e9;
    days + seconds / SECONDS_PER_DAY
}

/// Convert a serial number back to a calendar value. Fails for serials
/// outside the representable calendar span.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    let mut seconds = ((serial - days) * SECONDS_PER_DAY).round() as i64;
    let mut days = days as i64;
    if seconds >= 86_400 {
        days += 1;
        seconds = 0;
    }
    let date = serial_epoch().checked_add_signed(Duration::days(days))?;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))
}

/// Render a value as stored text plus its datatype attribute. Empty cells
/// have no stored form.
pub fn encode(value: &CellValue) -> Option<(String, DataType)> {
    match value {
        CellValue::Empty => None,
        CellValue::Text(s) => Some((s.clone(), DataType::String)),
        CellValue::Shared(i) => Some((i.to_string(), DataType::SharedString)),
        CellValue::Number(n) => Some((n.to_string(), DataType::Number)),
        CellValue::Bool(b) => Some(((if *b { "1" } else { "0" }).to_string(), DataType::Boolean)),
        CellValue::DateTime(dt) => Some((datetime_to_serial(dt).to_string(), DataType::Number)),
    }
}

/// Interpret stored cell text.
///
/// With no datatype attribute the text is numeric; a date-rendering number
/// format turns it into a calendar value. Shared-string cells resolve through
/// `shared`. Unparseable input degrades to [`CellValue::Text`] rather than
/// failing the whole read.
pub fn decode(
    text: &str,
    data_type: Option<DataType>,
    num_fmt_id: Option<u16>,
    shared: &[String],
) -> CellValue {
    match data_type {
        None | Some(DataType::Number) => match text.parse::<f64>() {
            Ok(n) => {
                if num_fmt_id.is_some_and(is_date_format_id) {
                    match serial_to_datetime(n) {
                        Some(dt) => CellValue::DateTime(dt),
                        None => CellValue::Number(n),
                    }
                } else {
                    CellValue::Number(n)
                }
            }
            Err(_) => CellValue::Text(text.to_string()),
        },
        Some(DataType::Date) => match text.parse::<f64>().ok().and_then(serial_to_datetime) {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Text(text.to_string()),
        },
        Some(DataType::SharedString) => match text.parse::<usize>().ok().and_then(|i| shared.get(i))
        {
            Some(s) => CellValue::Text(s.clone()),
            None => CellValue::Text(text.to_string()),
        },
        Some(DataType::Boolean) => CellValue::Bool(text.trim() == "1"),
        Some(DataType::Error) | Some(DataType::InlineString) | Some(DataType::String) => {
            CellValue::Text(text.to_string())
        }
    }
}
