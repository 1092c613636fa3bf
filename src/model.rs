//! Board, row and widget values plus their identifiers.
//!
//! DESIGN
//! ======
//! Identifiers are newtypes over `Option<NonZeroI64>`: `None` is the
//! "not yet persisted" state of a draft, and it can never collide with an
//! id the remote store assigns. The wire format still encodes unassigned
//! as `0`, which is what the remote store expects.
//!
//! The structs serialize with the remote store's PascalCase field names so
//! the same values travel to and from the HTTP adapter unchanged.

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;

use std::fmt;
use std::num::NonZeroI64;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::compat::WidgetKind;
use crate::layout::{ColumnType, RowType};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Option<NonZeroI64>);

        impl $name {
            pub const UNASSIGNED: Self = Self(None);

            /// Wrap a raw id. `0` maps to [`Self::UNASSIGNED`].
            #[must_use]
            pub fn new(raw: i64) -> Self {
                Self(NonZeroI64::new(raw))
            }

            #[must_use]
            pub fn get(self) -> Option<i64> {
                self.0.map(NonZeroI64::get)
            }

            #[must_use]
            pub fn is_assigned(self) -> bool {
                self.0.is_some()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    Some(id) => write!(f, concat!($label, " #{}"), id),
                    None => f.write_str(concat!("unsaved ", $label)),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i64(self.get().unwrap_or(0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Option::<i64>::deserialize(deserializer).map(|raw| Self::new(raw.unwrap_or(0)))
            }
        }
    };
}

record_id!(
    /// Identity of a persisted board.
    BoardId,
    "board"
);
record_id!(
    /// Identity of a persisted row.
    RowId,
    "row"
);
record_id!(
    /// Identity of a persisted widget.
    WidgetId,
    "widget"
);

/// Go-style servers emit `null` for empty slices.
pub(crate) fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// =============================================================================
// ACCOUNT REF
// =============================================================================

/// Weak reference to an externally owned linked account.
///
/// The board payload lists a widget's accounts as
/// `{ WidgetID, LinkedAccountID, CreatedAt }` without the institution, so
/// `institution_id` decodes as `0` there and only the account id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountRef {
    #[serde(rename = "InstitutionID", default)]
    pub institution_id: i64,
    #[serde(rename = "AccountID", alias = "LinkedAccountID")]
    pub account_id: i64,
}

impl AccountRef {
    #[must_use]
    pub fn new(institution_id: i64, account_id: i64) -> Self {
        Self { institution_id, account_id }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.institution_id == 0 {
            write!(f, "{}", self.account_id)
        } else {
            write!(f, "{}/{}", self.institution_id, self.account_id)
        }
    }
}

// =============================================================================
// WIDGET
// =============================================================================

/// A single dashboard tile.
///
/// `kind == None` is the placeholder state and carries no accounts; a bound
/// widget carries at least one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(rename = "WidgetID")]
    pub id: WidgetId,
    #[serde(rename = "RowID")]
    pub row_id: RowId,
    #[serde(rename = "ColumnType")]
    pub column_type: ColumnType,
    #[serde(rename = "SortOrder")]
    pub sort_order: i32,
    #[serde(rename = "WidgetType", default)]
    pub kind: Option<WidgetKind>,
    #[serde(rename = "LinkedAccounts", default, deserialize_with = "nullable_vec")]
    pub linked_accounts: Vec<AccountRef>,
}

impl Widget {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.kind.is_none()
    }

    /// Copy of this widget bound to `kind` over a single account.
    #[must_use]
    pub fn bound(&self, kind: WidgetKind, account: AccountRef) -> Self {
        Self { kind: Some(kind), linked_accounts: vec![account], ..self.clone() }
    }

    /// Copy of this widget back in the placeholder state.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self { kind: None, linked_accounts: Vec::new(), ..self.clone() }
    }
}

// =============================================================================
// ROW
// =============================================================================

/// A horizontal band of widgets whose count and column types are fixed by
/// `row_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "RowID")]
    pub id: RowId,
    #[serde(rename = "WidgetBoardID")]
    pub board_id: BoardId,
    #[serde(rename = "RowType")]
    pub row_type: RowType,
    #[serde(rename = "SortOrder")]
    pub sort_order: i32,
    #[serde(rename = "Widgets", default, deserialize_with = "nullable_vec")]
    pub widgets: Vec<Widget>,
}

impl Row {
    /// A row is populated while any of its widgets is bound.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.widgets.iter().any(|w| !w.is_placeholder())
    }

    /// Whether `other` has this row's type and column sequence.
    #[must_use]
    pub fn same_shape(&self, other: &Row) -> bool {
        self.row_type == other.row_type
            && self.widgets.len() == other.widgets.len()
            && self
                .widgets
                .iter()
                .zip(&other.widgets)
                .all(|(a, b)| a.column_type == b.column_type)
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// A user's dashboard. Exactly one per user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    #[serde(rename = "WidgetBoardID")]
    pub id: BoardId,
    #[serde(rename = "UserID", default)]
    pub owner_id: i64,
    #[serde(rename = "WidgetBoardRows", default, deserialize_with = "nullable_vec")]
    pub rows: Vec<Row>,
}

impl Board {
    #[must_use]
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.rows.iter().flat_map(|r| &r.widgets).find(|w| w.id == id)
    }

    /// Sort order for a row appended after every existing row.
    #[must_use]
    pub fn next_sort_order(&self) -> i32 {
        self.rows
            .iter()
            .map(|r| r.sort_order)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Report every broken structural invariant. An empty result means the
    /// board is well formed.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        for pair in self.rows.windows(2) {
            if pair[1].sort_order <= pair[0].sort_order {
                out.push(Violation::RowOrder { row: pair[1].id });
            }
        }

        for row in &self.rows {
            let expected = row.row_type.columns();
            if row.widgets.len() != expected.len() {
                out.push(Violation::Arity { row: row.id, expected: expected.len(), actual: row.widgets.len() });
            }
            for (position, (widget, &column)) in row.widgets.iter().zip(expected).enumerate() {
                if widget.column_type != column {
                    out.push(Violation::ColumnType { widget: widget.id, position, expected: column });
                }
            }
            for pair in row.widgets.windows(2) {
                if pair[1].sort_order <= pair[0].sort_order {
                    out.push(Violation::WidgetOrder { widget: pair[1].id });
                }
            }
            for widget in &row.widgets {
                match (widget.kind, widget.linked_accounts.is_empty()) {
                    (Some(_), true) => out.push(Violation::BindingWithoutAccounts { widget: widget.id }),
                    (None, false) => out.push(Violation::AccountsWithoutBinding { widget: widget.id }),
                    _ => {}
                }
            }
        }

        out
    }
}

/// A broken structural invariant found by [`Board::violations`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("{row} holds {actual} widgets, its type requires {expected}")]
    Arity { row: RowId, expected: usize, actual: usize },
    #[error("{widget} at position {position} should have column type {expected}")]
    ColumnType { widget: WidgetId, position: usize, expected: ColumnType },
    #[error("{row} is not sorted after the row before it")]
    RowOrder { row: RowId },
    #[error("{widget} is not sorted after the widget before it")]
    WidgetOrder { widget: WidgetId },
    #[error("{widget} has a kind but no linked accounts")]
    BindingWithoutAccounts { widget: WidgetId },
    #[error("{widget} has linked accounts but no kind")]
    AccountsWithoutBinding { widget: WidgetId },
}
