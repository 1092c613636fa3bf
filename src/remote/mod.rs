//! Remote store contract.
//!
//! ARCHITECTURE
//! ============
//! The board core never talks to the network directly. It depends on three
//! narrow ports, each an `async_trait` so callers hold `Arc<dyn ...>` and
//! tests swap in fakes:
//!
//! - [`RemoteStore`]: load the board and persist row/binding mutations.
//! - [`AccountSource`]: list the user's linked accounts and institutions.
//! - [`SessionGate`]: a yes/no authentication check plus logout.
//!
//! [`http::HttpRemoteStore`] implements all three over the server's JSON
//! routes; [`memory::MemoryRemote`] implements them in process.

pub mod http;
pub mod memory;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::compat::{AccountType, WidgetKind};
use crate::error::ErrorCode;
use crate::model::{AccountRef, Board, Row, RowId, WidgetId, nullable_vec};

// =============================================================================
// ERRORS
// =============================================================================

/// Failure reported by a port implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote answered with a non-success status.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The request never produced a response.
    #[error("remote request failed: {0}")]
    Transport(String),
    /// The response body did not match the contract.
    #[error("unexpected response body: {0}")]
    Decode(String),
    /// The session is missing or expired.
    #[error("session is not authenticated")]
    Unauthenticated,
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl RemoteError {
    /// The remote's own message, when it sent one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } if !message.is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

impl ErrorCode for RemoteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "E_REMOTE_REJECTED",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Decode(_) => "E_DECODE",
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::ClientBuild(_) => "E_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Every call the ports expose. Used for logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadBoard,
    AddRow,
    DeleteRow,
    BindWidget,
    UnbindWidget,
    ListAccounts,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadBoard => "load_board",
            Self::AddRow => "add_row",
            Self::DeleteRow => "delete_row",
            Self::BindWidget => "bind_widget",
            Self::UnbindWidget => "unbind_widget",
            Self::ListAccounts => "list_accounts",
        };
        f.write_str(name)
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Add-row payload: the board header carrying exactly one draft row.
///
/// The remote assigns every persisted id and the final ordering, so the
/// draft travels with unassigned ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRowRequest {
    #[serde(rename = "WidgetBoard")]
    pub board: Board,
}

impl AddRowRequest {
    #[must_use]
    pub fn new(board: &Board, draft: Row) -> Self {
        Self { board: Board { id: board.id, owner_id: board.owner_id, rows: vec![draft] } }
    }

    /// The draft row, if the payload carries exactly one.
    #[must_use]
    pub fn draft(&self) -> Option<&Row> {
        match self.board.rows.as_slice() {
            [row] => Some(row),
            _ => None,
        }
    }
}

/// Bind payload. Institution and account ids are parallel lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    #[serde(rename = "WidgetID")]
    pub widget_id: WidgetId,
    #[serde(rename = "WidgetType")]
    pub kind: WidgetKind,
    #[serde(rename = "InstitutionID")]
    pub institution_ids: Vec<i64>,
    #[serde(rename = "AccountID")]
    pub account_ids: Vec<i64>,
}

impl BindRequest {
    #[must_use]
    pub fn single(widget_id: WidgetId, kind: WidgetKind, account: AccountRef) -> Self {
        Self {
            widget_id,
            kind,
            institution_ids: vec![account.institution_id],
            account_ids: vec![account.account_id],
        }
    }

    /// Pair the parallel id lists back into account references.
    #[must_use]
    pub fn accounts(&self) -> Vec<AccountRef> {
        self.institution_ids
            .iter()
            .zip(&self.account_ids)
            .map(|(&institution_id, &account_id)| AccountRef::new(institution_id, account_id))
            .collect()
    }
}

// =============================================================================
// ACCOUNT LISTING
// =============================================================================

/// A linked account as reported by the account source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    #[serde(rename = "AccountID")]
    pub account_id: i64,
    #[serde(rename = "LinkedInstitutionID")]
    pub institution_id: i64,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Mask", default)]
    pub mask: Option<String>,
    #[serde(rename = "Type")]
    pub account_type: AccountType,
    #[serde(rename = "CreatedAt", default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl LinkedAccount {
    #[must_use]
    pub fn account_ref(&self) -> AccountRef {
        AccountRef::new(self.institution_id, self.account_id)
    }
}

/// A linked institution as reported by the account source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    #[serde(rename = "LinkedInstitutionID")]
    pub institution_id: i64,
    #[serde(rename = "InstitutionName", default)]
    pub name: String,
}

/// Everything the account source returns in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountListing {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub accounts: Vec<LinkedAccount>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub institutions: Vec<Institution>,
}

impl AccountListing {
    #[must_use]
    pub fn account(&self, account: AccountRef) -> Option<&LinkedAccount> {
        self.accounts.iter().find(|a| a.account_ref() == account)
    }

    #[must_use]
    pub fn institution_name(&self, institution_id: i64) -> Option<&str> {
        self.institutions
            .iter()
            .find(|i| i.institution_id == institution_id)
            .map(|i| i.name.as_str())
    }
}

// =============================================================================
// PORTS
// =============================================================================

/// Persistence contract the board store relies on.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the user's board, created empty on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails or is rejected.
    async fn load_board(&self) -> Result<Board, RemoteError>;

    /// Persist the draft row carried by `request` and return it with its
    /// assigned ids.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails or is rejected.
    async fn add_row(&self, request: AddRowRequest) -> Result<Row, RemoteError>;

    /// Delete a persisted row.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails or is rejected.
    async fn delete_row(&self, row_id: RowId) -> Result<(), RemoteError>;

    /// Bind a widget to a kind and its accounts.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails or is rejected.
    async fn bind_widget(&self, request: BindRequest) -> Result<(), RemoteError>;

    /// Return a widget to the placeholder state.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails or is rejected.
    async fn unbind_widget(&self, widget_id: WidgetId) -> Result<(), RemoteError>;
}

/// Source of the user's already-linked accounts.
#[async_trait::async_trait]
pub trait AccountSource: Send + Sync {
    /// List every linked account and institution.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the request fails.
    async fn list_accounts(&self) -> Result<AccountListing, RemoteError>;
}

/// Authentication gate owned by the session collaborator.
#[async_trait::async_trait]
pub trait SessionGate: Send + Sync {
    /// Whether the current session is signed in.
    async fn is_authenticated(&self) -> bool;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the logout request fails.
    async fn logout(&self) -> Result<(), RemoteError>;
}
