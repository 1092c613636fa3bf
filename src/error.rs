//! Error taxonomy for board operations.
//!
//! ERROR HANDLING
//! ==============
//! - `LoadFailure`: the initial board fetch failed; the store sits in its
//!   `Error` phase until the caller retries.
//! - `MutationRejected`: the remote store refused a mutation; local state
//!   is unchanged and the message belongs next to the triggering control.
//! - `Validation`: a client-side precondition failed and no request left
//!   the process.
//! - `Cancelled`: the request was superseded or abandoned. Never shown to
//!   the user and never logged above `debug`.
//!
//! Nothing here retries automatically.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use crate::model::{AccountRef, RowId, WidgetId};
use crate::remote::RemoteError;
use crate::store::PendingKey;

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// A precondition checked before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("board is not loaded")]
    NotReady,
    #[error("board is already loaded")]
    AlreadyLoaded,
    #[error("a request for {0} is still in flight")]
    Busy(PendingKey),
    #[error("row type is not one of 1, 2a, 2b or 3")]
    UnknownRowType,
    #[error("row has not been saved yet")]
    UnassignedRow,
    #[error("widget has not been saved yet")]
    UnassignedWidget,
    #[error("{0} is not on this board")]
    RowNotFound(RowId),
    #[error("{0} is not on this board")]
    WidgetNotFound(WidgetId),
    #[error("{0} already exists on this board")]
    DuplicateRow(RowId),
    #[error("{0} is not sorted after the last row")]
    RowOutOfOrder(RowId),
    #[error("widgets of {0} are not in increasing sort order")]
    WidgetsOutOfOrder(RowId),
    #[error("{0} still has bound widgets; unbind them before deleting the row")]
    RowPopulated(RowId),
    #[error("{0} cannot change its row, column type or position")]
    WidgetMoved(WidgetId),
    #[error("{0} has a kind but no linked accounts")]
    BindingWithoutAccounts(WidgetId),
    #[error("{0} has linked accounts but no kind")]
    AccountsWithoutBinding(WidgetId),
    #[error("{0} is already bound; unbind it first")]
    AlreadyBound(WidgetId),
    #[error("{0} is not bound")]
    NotBound(WidgetId),
    #[error("Please select a widget type.")]
    NoKindSelected,
    #[error("Please select an account to add.")]
    NoAccountSelected,
    #[error("account {0} is not in the listed accounts")]
    UnknownAccount(AccountRef),
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotReady => "E_NOT_READY",
            Self::AlreadyLoaded => "E_ALREADY_LOADED",
            Self::Busy(_) => "E_BUSY",
            Self::UnknownRowType => "E_UNKNOWN_ROW_TYPE",
            Self::UnassignedRow | Self::UnassignedWidget => "E_UNASSIGNED_ID",
            Self::RowNotFound(_) => "E_ROW_NOT_FOUND",
            Self::WidgetNotFound(_) => "E_WIDGET_NOT_FOUND",
            Self::DuplicateRow(_) => "E_DUPLICATE_ROW",
            Self::RowOutOfOrder(_) | Self::WidgetsOutOfOrder(_) => "E_OUT_OF_ORDER",
            Self::RowPopulated(_) => "E_ROW_POPULATED",
            Self::WidgetMoved(_) => "E_WIDGET_MOVED",
            Self::BindingWithoutAccounts(_) | Self::AccountsWithoutBinding(_) => "E_INVALID_BINDING",
            Self::AlreadyBound(_) => "E_ALREADY_BOUND",
            Self::NotBound(_) => "E_NOT_BOUND",
            Self::NoKindSelected => "E_NO_KIND",
            Self::NoAccountSelected => "E_NO_ACCOUNT",
            Self::UnknownAccount(_) => "E_UNKNOWN_ACCOUNT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

// =============================================================================
// BOARD ERROR
// =============================================================================

/// Outcome of a failed store or binder operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("{0}")]
    LoadFailure(String),
    #[error("{0}")]
    MutationRejected(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request cancelled")]
    Cancelled,
}

impl BoardError {
    /// Build a `LoadFailure`, preferring the remote's own message.
    #[must_use]
    pub fn load(err: &RemoteError, fallback: &str) -> Self {
        Self::LoadFailure(err.message().unwrap_or(fallback).to_owned())
    }

    /// Build a `MutationRejected`, preferring the remote's own message.
    #[must_use]
    pub fn rejected(err: &RemoteError, fallback: &str) -> Self {
        Self::MutationRejected(err.message().unwrap_or(fallback).to_owned())
    }

    /// Cancellations are silent; everything else is shown near its control.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LoadFailure(_) => "E_LOAD_FAILURE",
            Self::MutationRejected(_) => "E_MUTATION_REJECTED",
            Self::Validation(inner) => inner.error_code(),
            Self::Cancelled => "E_CANCELLED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::LoadFailure(_) | Self::MutationRejected(_) => true,
            Self::Validation(inner) => inner.retryable(),
            Self::Cancelled => false,
        }
    }
}
