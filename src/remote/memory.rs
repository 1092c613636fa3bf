//! In-process remote store.
//!
//! DESIGN
//! ======
//! `MemoryRemote` plays the server side of the contract without a network:
//! it owns a board and a set of linked accounts, assigns ids from
//! counters that never yield zero, and re-checks the rules a server should
//! enforce (populated rows cannot be deleted, bindings must use listed,
//! compatible accounts). Tests use `fail_next` to script rejections and
//! `calls` to prove that a refused operation never reached the remote.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    AccountListing, AccountSource, AddRowRequest, BindRequest, Institution, LinkedAccount, Operation, RemoteError,
    RemoteStore, SessionGate,
};
use crate::compat::AccountType;
use crate::layout::{RowType, create_row};
use crate::model::{Board, BoardId, Row, RowId, WidgetId};

const REJECTED_STATUS: u16 = 500;

struct MemoryInner {
    board: Board,
    listing: AccountListing,
    next_row_id: i64,
    next_widget_id: i64,
    failures: HashMap<Operation, String>,
    calls: HashMap<Operation, usize>,
    authenticated: bool,
}

impl MemoryInner {
    fn record(&mut self, op: Operation) -> Result<(), RemoteError> {
        *self.calls.entry(op).or_default() += 1;
        debug!(%op, "memory remote call");
        match self.failures.remove(&op) {
            Some(message) => Err(rejected(message)),
            None => Ok(()),
        }
    }

    fn persist(&mut self, mut row: Row) -> Row {
        row.id = RowId::new(self.next_row_id);
        self.next_row_id += 1;
        row.board_id = self.board.id;
        row.sort_order = self.board.next_sort_order();
        for widget in &mut row.widgets {
            widget.id = WidgetId::new(self.next_widget_id);
            self.next_widget_id += 1;
            widget.row_id = row.id;
            widget.kind = None;
            widget.linked_accounts.clear();
        }
        self.board.rows.push(row.clone());
        row
    }
}

fn rejected(message: impl Into<String>) -> RemoteError {
    RemoteError::Rejected { status: REJECTED_STATUS, message: message.into() }
}

/// Shared in-memory implementation of every remote port.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRemote {
    /// Empty board owned by `owner_id`, no linked accounts, signed in.
    #[must_use]
    pub fn new(owner_id: i64) -> Self {
        let board = Board { id: BoardId::new(1), owner_id, rows: Vec::new() };
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                board,
                listing: AccountListing::default(),
                next_row_id: 1,
                next_widget_id: 1,
                failures: HashMap::new(),
                calls: HashMap::new(),
                authenticated: true,
            })),
        }
    }

    /// A small board with a handful of linked accounts, for the CLI demo.
    #[must_use]
    pub fn demo() -> Self {
        let remote = Self::new(1).with_accounts(demo_listing());
        remote.seed_row(RowType::TwoA);
        remote.seed_row(RowType::Three);
        remote
    }

    #[must_use]
    pub fn with_accounts(self, listing: AccountListing) -> Self {
        self.lock().listing = listing;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist an empty row directly, bypassing the request path.
    pub fn seed_row(&self, row_type: RowType) -> Row {
        let mut inner = self.lock();
        let draft = create_row(0, row_type, inner.board.id);
        inner.persist(draft)
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.lock().failures.insert(op, message.into());
    }

    /// How many times `op` reached this remote.
    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// The persisted board as the remote sees it.
    #[must_use]
    pub fn snapshot(&self) -> Board {
        self.lock().board.clone()
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.lock().authenticated = authenticated;
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemote {
    async fn load_board(&self) -> Result<Board, RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::LoadBoard)?;
        Ok(inner.board.clone())
    }

    async fn add_row(&self, request: AddRowRequest) -> Result<Row, RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::AddRow)?;
        let Some(draft) = request.draft() else {
            return Err(rejected("No data for rows received"));
        };
        if request.board.id != inner.board.id || draft.id.is_assigned() {
            return Err(rejected("Could not add row to widget."));
        }
        Ok(inner.persist(draft.clone()))
    }

    async fn delete_row(&self, row_id: RowId) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::DeleteRow)?;
        let Some(index) = inner.board.rows.iter().position(|r| r.id == row_id) else {
            return Err(rejected("Could not delete row from widget."));
        };
        if inner.board.rows[index].is_populated() {
            return Err(rejected("Could not delete row from widget."));
        }
        inner.board.rows.remove(index);
        Ok(())
    }

    async fn bind_widget(&self, request: BindRequest) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::BindWidget)?;
        let accounts = request.accounts();
        let valid = !accounts.is_empty()
            && request.institution_ids.len() == request.account_ids.len()
            && accounts.iter().all(|&account| {
                inner
                    .listing
                    .account(account)
                    .is_some_and(|a| request.kind.accepts(&a.account_type))
            });
        if !valid {
            return Err(rejected("Could not save account to widget."));
        }
        let Some(widget) = inner
            .board
            .rows
            .iter_mut()
            .flat_map(|r| r.widgets.iter_mut())
            .find(|w| w.id == request.widget_id)
        else {
            return Err(rejected("Could not save account to widget."));
        };
        widget.kind = Some(request.kind);
        widget.linked_accounts = accounts;
        Ok(())
    }

    async fn unbind_widget(&self, widget_id: WidgetId) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::UnbindWidget)?;
        let Some(widget) = inner
            .board
            .rows
            .iter_mut()
            .flat_map(|r| r.widgets.iter_mut())
            .find(|w| w.id == widget_id)
        else {
            return Err(rejected("Could not delete account from widget."));
        };
        widget.kind = None;
        widget.linked_accounts.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountSource for MemoryRemote {
    async fn list_accounts(&self) -> Result<AccountListing, RemoteError> {
        let mut inner = self.lock();
        inner.record(Operation::ListAccounts)?;
        Ok(inner.listing.clone())
    }
}

#[async_trait::async_trait]
impl SessionGate for MemoryRemote {
    async fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        self.lock().authenticated = false;
        Ok(())
    }
}

fn demo_listing() -> AccountListing {
    let account = |account_id: i64, institution_id: i64, name: &str, mask: &str, account_type: AccountType| {
        LinkedAccount {
            account_id,
            institution_id,
            name: name.to_owned(),
            mask: Some(mask.to_owned()),
            account_type,
            created_at: None,
        }
    };
    AccountListing {
        accounts: vec![
            account(101, 1, "Everyday Checking", "0042", AccountType::Depository),
            account(102, 1, "Rewards Card", "7781", AccountType::Credit),
            account(201, 2, "Brokerage", "5150", AccountType::Investment),
            account(202, 2, "Auto Loan", "3309", AccountType::Loan),
        ],
        institutions: vec![
            Institution { institution_id: 1, name: "First Plaid Bank".to_owned() },
            Institution { institution_id: 2, name: "Tartan Credit Union".to_owned() },
        ],
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
