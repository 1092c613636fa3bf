//! Row layout table and row factory.
//!
//! DESIGN
//! ======
//! Row shapes are a closed set. Each `RowType` maps to an ordered list of
//! column types, and that list fixes both the number of widgets in the row
//! and the column type of each position. The factory is the only place a
//! new row is built; everything it produces carries unassigned ids until
//! the remote store hands back the persisted row.

#[cfg(test)]
#[path = "layout_test.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{BoardId, Row, RowId, Widget, WidgetId};

// =============================================================================
// ROW TYPE
// =============================================================================

/// Shape tag of a row.
///
/// `Unknown` is what an unrecognized tag from the remote decodes to. It has
/// no columns, so the factory builds an empty row for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RowType {
    One,
    TwoA,
    TwoB,
    Three,
    Unknown,
}

impl RowType {
    /// Every known row type, in menu order.
    pub const ALL: [RowType; 4] = [RowType::One, RowType::TwoA, RowType::TwoB, RowType::Three];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::One => "1",
            Self::TwoA => "2a",
            Self::TwoB => "2b",
            Self::Three => "3",
            Self::Unknown => "unknown",
        }
    }

    /// Ordered column types this row must contain.
    #[must_use]
    pub fn columns(self) -> &'static [ColumnType] {
        match self {
            Self::One => &[ColumnType::One],
            Self::TwoA => &[ColumnType::Two, ColumnType::Three],
            Self::TwoB => &[ColumnType::Three, ColumnType::Two],
            Self::Three => &[ColumnType::Three, ColumnType::Three, ColumnType::Three],
            Self::Unknown => &[],
        }
    }

    /// Number of widgets a row of this type holds.
    #[must_use]
    pub fn arity(self) -> usize {
        self.columns().len()
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RowType {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" => Self::One,
            "2a" => Self::TwoA,
            "2b" => Self::TwoB,
            "3" => Self::Three,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for RowType {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<RowType> for String {
    fn from(row_type: RowType) -> Self {
        row_type.as_str().to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown row type `{0}` (expected 1, 2a, 2b or 3)")]
pub struct ParseRowTypeError(String);

/// Strict parse for user input. Wire decoding goes through `From<&str>`,
/// which maps unrecognized tags to `Unknown` instead.
impl FromStr for RowType {
    type Err = ParseRowTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from(s) {
            Self::Unknown => Err(ParseRowTypeError(s.to_owned())),
            known => Ok(known),
        }
    }
}

// =============================================================================
// COLUMN TYPE
// =============================================================================

/// Width class of a widget slot. Fixed by the slot's position in its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match self {
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
        };
        f.write_str(raw)
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Build an unpersisted row of `row_type` for `board_id`.
///
/// The row and every widget carry unassigned ids. Widgets are placeholders,
/// numbered `1..=arity` in column order, with column types copied from the
/// layout table.
#[must_use]
pub fn create_row(sort_order: i32, row_type: RowType, board_id: BoardId) -> Row {
    let widgets = row_type
        .columns()
        .iter()
        .zip(1..)
        .map(|(&column_type, position)| Widget {
            id: WidgetId::UNASSIGNED,
            row_id: RowId::UNASSIGNED,
            column_type,
            sort_order: position,
            kind: None,
            linked_accounts: Vec::new(),
        })
        .collect();

    Row { id: RowId::UNASSIGNED, board_id, row_type, sort_order, widgets }
}
