use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, Error};

/// An inclusive rectangular region. `end` is `None` for a single-cell range;
/// when present it must lie at or below/right of `start`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Address>,
}

impl Range {
    /// Construct a range, rejecting inverted corners.
    pub fn new(start: Address, end: Option<Address>) -> Result<Self, Error> {
        if let Some(end) = end {
            if end.col < start.col || end.row < start.row {
                return Err(Error::InvalidRange(format!("{start}:{end}")));
            }
        }
        Ok(Self { start, end })
    }

    /// A range covering exactly one cell.
    pub const fn single(cell: Address) -> Self {
        Self {
            start: cell,
            end: None,
        }
    }

    /// Parse `A1` or `A1:B2` (with optional `$` anchors on either corner).
    pub fn parse(text: &str) -> Result<Self, Error> {
        match text.split_once(':') {
            None => Ok(Self::single(Address::parse(text)?)),
            Some((a, b)) => {
                if b.contains(':') {
                    return Err(Error::InvalidRange(text.to_string()));
                }
                Self::new(Address::parse(a)?, Some(Address::parse(b)?))
            }
        }
    }

    /// Bottom-right corner; equals `start` for a single-cell range.
    #[inline]
    pub fn last(&self) -> Address {
        self.end.unwrap_or(self.start)
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> u32 {
        self.last().col - self.start.col + 1
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> u32 {
        self.last().row - self.start.row + 1
    }

    /// Returns true if the 1-based cell coordinates fall inside the range.
    pub fn contains(&self, col: u32, row: u32) -> bool {
        let last = self.last();
        col >= self.start.col && col <= last.col && row >= self.start.row && row <= last.row
    }

    /// Returns true if `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &Range) -> bool {
        let last = other.last();
        self.contains(other.start.col, other.start.row) && self.contains(last.col, last.row)
    }

    /// Offset both corners. Anchored axes stay put, like [`Address::translate`].
    pub fn translate(self, col_delta: i64, row_delta: i64) -> Result<Self, Error> {
        Ok(Self {
            start: self.start.translate(col_delta, row_delta)?,
            end: match self.end {
                Some(end) => Some(end.translate(col_delta, row_delta)?),
                None => None,
            },
        })
    }

    /// The textual form, e.g. `A1:D4`.
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        if let Some(end) = self.end {
            write!(f, ":{end}")?;
        }
        Ok(())
    }
}
