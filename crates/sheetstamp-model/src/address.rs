use core::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Matches a single A1-style reference with optional `$` anchors, e.g. `B5`,
/// `$AA$12`. Column letters are uppercase only; this is also the test used to
/// decide whether a formula token is a cell reference.
pub(crate) fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\$)?([A-Z]+)(\$)?([0-9]+)$").expect("reference pattern is valid")
    })
}

/// Convert a 1-based column index to its base-26 letter run (`1` → `A`,
/// `27` → `AA`, `703` → `AAA`).
pub fn column_letters(index: u32) -> Result<String, Error> {
    if index == 0 {
        return Err(Error::InvalidAddress(format!("column index {index}")));
    }
    let mut n = index;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    // Only ASCII letters are pushed above.
    Ok(String::from_utf8(out).unwrap_or_default())
}

/// Convert a base-26 letter run to its 1-based column index (`A` → `1`,
/// `AA` → `27`). Only uppercase `A`-`Z` is accepted.
pub fn column_index(letters: &str) -> Result<u32, Error> {
    if letters.is_empty() {
        return Err(Error::InvalidAddress(letters.to_string()));
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_uppercase() {
            return Err(Error::InvalidAddress(letters.to_string()));
        }
        let v = (b - b'A') as u32 + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or_else(|| Error::InvalidAddress(letters.to_string()))?;
    }
    Ok(col)
}

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **1-indexed**: `col = 1, row = 1` is cell `A1`. The
/// `$` anchors of the textual form are carried as flags; anchored axes do not
/// move under [`Address::translate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// 1-indexed column (`A` = 1).
    pub col: u32,
    /// 1-indexed row.
    pub row: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub col_absolute: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub row_absolute: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Address {
    /// Construct a relative reference. Both coordinates are 1-based; zero is
    /// never a valid coordinate.
    #[inline]
    pub const fn new(col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            col_absolute: false,
            row_absolute: false,
        }
    }

    /// Construct a fully anchored (`$A$1`) reference.
    #[inline]
    pub const fn absolute(col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            col_absolute: true,
            row_absolute: true,
        }
    }

    /// Parse an A1-style reference like `B5` or `$AA$12`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let caps = reference_pattern()
            .captures(text)
            .ok_or_else(|| Error::InvalidAddress(text.to_string()))?;
        let col = column_index(&caps[2])?;
        let row: u32 = caps[4]
            .parse()
            .map_err(|_| Error::InvalidAddress(text.to_string()))?;
        if row == 0 {
            return Err(Error::InvalidAddress(text.to_string()));
        }
        Ok(Self {
            col,
            row,
            col_absolute: caps.get(1).is_some(),
            row_absolute: caps.get(3).is_some(),
        })
    }

    /// Offset the reference by the given deltas. Anchored axes stay put.
    /// Fails if either coordinate would leave the sheet (reach zero or
    /// below, or overflow).
    pub fn translate(self, col_delta: i64, row_delta: i64) -> Result<Self, Error> {
        let col = shift(self.col, self.col_absolute, col_delta)
            .ok_or_else(|| Error::InvalidAddress(self.to_string()))?;
        let row = shift(self.row, self.row_absolute, row_delta)
            .ok_or_else(|| Error::InvalidAddress(self.to_string()))?;
        Ok(Self { col, row, ..self })
    }

    /// The textual form, e.g. `$B$5`.
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

fn shift(coord: u32, anchored: bool, delta: i64) -> Option<u32> {
    if anchored {
        return Some(coord);
    }
    let moved = i64::from(coord).checked_add(delta)?;
    if moved < 1 {
        return None;
    }
    u32::try_from(moved).ok()
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col_absolute {
            f.write_str("$")?;
        }
        let letters = column_letters(self.col).map_err(|_| fmt::Error)?;
        f.write_str(&letters)?;
        if self.row_absolute {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row)
    }
}
