//! Board store: the authoritative in-memory board and its mutations.
//!
//! DESIGN
//! ======
//! `BoardStore` is a cheap clonable handle over shared state. The board
//! moves through `Uninitialized → Loading → Ready | Error`; once `Ready`,
//! failed mutations report through their own `Result` and never move the
//! board out of `Ready`.
//!
//! Mutations are confirmed, not optimistic: the request goes out, and only
//! an acknowledged result is folded in through the reducer. While a request
//! is in flight its entity carries a pending marker. A second request for
//! the same entity is refused with `Busy`, which is what a view checks to
//! disable the triggering control. Markers are held by [`PendingGuard`] and
//! released when it drops, so a request future dropped mid-flight never
//! leaves its entity locked.
//!
//! The state mutex is never held across an `.await`.

pub mod reducer;

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{BoardError, ValidationError};
use crate::layout::{RowType, create_row};
use crate::model::{Board, Row, RowId, Widget, WidgetId};
use crate::remote::{AddRowRequest, RemoteStore};
use reducer::BoardAction;

pub const LOAD_FAILED: &str = "Could not load widget board.";
pub const ADD_ROW_FAILED: &str = "Could not add row to widget.";
pub const DELETE_ROW_FAILED: &str = "Could not delete row from widget.";

// =============================================================================
// TYPES
// =============================================================================

/// Lifecycle of the board as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoardPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready(Board),
    /// Initial load failed. Terminal until `load` is called again.
    Error(String),
}

/// Entity a request is in flight for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PendingKey {
    Load,
    AddRow,
    Row(RowId),
    Widget(WidgetId),
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => f.write_str("board load"),
            Self::AddRow => f.write_str("new row"),
            Self::Row(id) => write!(f, "{id}"),
            Self::Widget(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    phase: BoardPhase,
    pending: BTreeSet<PendingKey>,
}

impl StoreInner {
    fn board(&self) -> Result<&Board, ValidationError> {
        match &self.phase {
            BoardPhase::Ready(board) => Ok(board),
            _ => Err(ValidationError::NotReady),
        }
    }

    fn reserve(&mut self, key: PendingKey) -> Result<(), ValidationError> {
        if self.pending.insert(key) { Ok(()) } else { Err(ValidationError::Busy(key)) }
    }
}

// =============================================================================
// PENDING GUARD
// =============================================================================

/// Holds a pending marker until dropped.
#[must_use = "the pending marker is released as soon as the guard drops"]
pub struct PendingGuard {
    inner: Arc<Mutex<StoreInner>>,
    key: PendingKey,
    /// Phase to put back if a load is abandoned before it settles.
    restore: Option<BoardPhase>,
}

impl PendingGuard {
    #[must_use]
    pub fn key(&self) -> PendingKey {
        self.key
    }

    fn settle(&mut self) {
        self.restore = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.pending.remove(&self.key);
        if let Some(prior) = self.restore.take() {
            if inner.phase == BoardPhase::Loading {
                debug!("board load abandoned; restoring prior phase");
                inner.phase = prior;
            }
        }
    }
}

// =============================================================================
// BOARD STORE
// =============================================================================

/// Shared handle to the board and the remote store behind it.
#[derive(Clone)]
pub struct BoardStore {
    inner: Arc<Mutex<StoreInner>>,
    remote: Arc<dyn RemoteStore>,
}

impl BoardStore {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { inner: Arc::new(Mutex::new(StoreInner::default())), remote }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self, key: PendingKey) -> PendingGuard {
        PendingGuard { inner: Arc::clone(&self.inner), key, restore: None }
    }

    /// The remote store this board persists to.
    #[must_use]
    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    #[must_use]
    pub fn phase(&self) -> BoardPhase {
        self.lock().phase.clone()
    }

    /// The board, when loaded.
    #[must_use]
    pub fn board(&self) -> Option<Board> {
        self.lock().board().ok().cloned()
    }

    #[must_use]
    pub fn is_pending(&self, key: PendingKey) -> bool {
        self.lock().pending.contains(&key)
    }

    #[must_use]
    pub fn pending(&self) -> Vec<PendingKey> {
        self.lock().pending.iter().copied().collect()
    }

    /// Reserve `key` for one outstanding request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Busy`] if `key` is already reserved.
    pub fn begin(&self, key: PendingKey) -> Result<PendingGuard, ValidationError> {
        self.lock().reserve(key)?;
        Ok(self.guard(key))
    }

    /// Reserve a widget for a binding request.
    ///
    /// # Errors
    ///
    /// Fails when the board is not loaded, the widget is unknown, or the
    /// widget or its row already has a request in flight.
    pub fn begin_widget(&self, widget_id: WidgetId) -> Result<PendingGuard, ValidationError> {
        if !widget_id.is_assigned() {
            return Err(ValidationError::UnassignedWidget);
        }
        let mut inner = self.lock();
        let row_id = inner
            .board()?
            .widget(widget_id)
            .map(|w| w.row_id)
            .ok_or(ValidationError::WidgetNotFound(widget_id))?;
        if inner.pending.contains(&PendingKey::Row(row_id)) {
            return Err(ValidationError::Busy(PendingKey::Row(row_id)));
        }
        inner.reserve(PendingKey::Widget(widget_id))?;
        drop(inner);
        Ok(self.guard(PendingKey::Widget(widget_id)))
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Fetch the persisted board.
    ///
    /// Valid from `Uninitialized` and, as a manual retry, from `Error`.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailure` (and enters `Error`) if the fetch fails,
    /// `Busy` if a load is already running, and `AlreadyLoaded` once `Ready`.
    pub async fn load(&self) -> Result<(), BoardError> {
        let mut guard = {
            let mut inner = self.lock();
            match inner.phase {
                BoardPhase::Ready(_) => return Err(ValidationError::AlreadyLoaded.into()),
                BoardPhase::Loading => return Err(ValidationError::Busy(PendingKey::Load).into()),
                BoardPhase::Uninitialized | BoardPhase::Error(_) => {}
            }
            inner.reserve(PendingKey::Load)?;
            let prior = std::mem::replace(&mut inner.phase, BoardPhase::Loading);
            let mut guard = self.guard(PendingKey::Load);
            guard.restore = Some(prior);
            guard
        };

        let result = self.remote.load_board().await;
        guard.settle();

        match result {
            Ok(board) => {
                for violation in board.violations() {
                    warn!(%violation, "loaded board breaks a layout invariant");
                }
                info!(board_id = %board.id, rows = board.rows.len(), "board loaded");
                self.lock().phase = BoardPhase::Ready(board);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "board load failed");
                let err = BoardError::load(&e, LOAD_FAILED);
                self.lock().phase = BoardPhase::Error(err.to_string());
                Err(err)
            }
        }
    }

    // =========================================================================
    // ROWS
    // =========================================================================

    /// Persist a new row of `row_type` and append it once acknowledged.
    ///
    /// The board is untouched while the request is in flight and after a
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns `MutationRejected` if the remote refuses the row or answers
    /// with a row that does not match the draft, and a validation error if
    /// the board is not ready, another add is in flight, or `row_type` is
    /// unknown.
    pub async fn add_row(&self, row_type: RowType) -> Result<Row, BoardError> {
        if row_type == RowType::Unknown {
            return Err(ValidationError::UnknownRowType.into());
        }
        let (_guard, request) = {
            let mut inner = self.lock();
            let board = inner.board()?;
            let draft = create_row(board.next_sort_order(), row_type, board.id);
            let request = AddRowRequest::new(board, draft);
            inner.reserve(PendingKey::AddRow)?;
            (self.guard(PendingKey::AddRow), request)
        };
        let draft = request.board.rows[0].clone();

        let row = match self.remote.add_row(request).await {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, %row_type, "add row rejected");
                return Err(BoardError::rejected(&e, ADD_ROW_FAILED));
            }
        };

        if !acknowledges(&draft, &row) {
            warn!(row_id = %row.id, %row_type, "remote returned a row that does not match the draft");
            return Err(BoardError::MutationRejected(ADD_ROW_FAILED.to_owned()));
        }

        if let Err(e) = self.dispatch(BoardAction::RowAdded(row.clone())) {
            warn!(error = %e, row_id = %row.id, %row_type, "acknowledged row does not fit the board");
            return Err(BoardError::MutationRejected(ADD_ROW_FAILED.to_owned()));
        }
        info!(row_id = %row.id, %row_type, "row added");
        Ok(row)
    }

    /// Delete an unpopulated row.
    ///
    /// A row holding any bound widget is refused before any request is sent.
    ///
    /// # Errors
    ///
    /// Returns `RowPopulated`, `RowNotFound` or `Busy` as validation errors,
    /// and `MutationRejected` if the remote refuses the delete.
    pub async fn delete_row(&self, row_id: RowId) -> Result<(), BoardError> {
        if !row_id.is_assigned() {
            return Err(ValidationError::UnassignedRow.into());
        }
        let _guard = {
            let mut inner = self.lock();
            let row = inner.board()?.row(row_id).ok_or(ValidationError::RowNotFound(row_id))?;
            if row.is_populated() {
                return Err(ValidationError::RowPopulated(row_id).into());
            }
            if let Some(busy) = row
                .widgets
                .iter()
                .map(|w| PendingKey::Widget(w.id))
                .find(|key| inner.pending.contains(key))
            {
                return Err(ValidationError::Busy(busy).into());
            }
            inner.reserve(PendingKey::Row(row_id))?;
            self.guard(PendingKey::Row(row_id))
        };

        if let Err(e) = self.remote.delete_row(row_id).await {
            warn!(error = %e, %row_id, "delete row rejected");
            return Err(BoardError::rejected(&e, DELETE_ROW_FAILED));
        }

        self.dispatch(BoardAction::RowRemoved(row_id))?;
        info!(%row_id, "row deleted");
        Ok(())
    }

    // =========================================================================
    // WIDGETS
    // =========================================================================

    /// Merge an already-confirmed widget into the board by id.
    ///
    /// Makes no request; callers use this after the remote acknowledged a
    /// bind or unbind. Every other row and widget is left as it was.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the board is not ready, the widget is
    /// unknown, or the new value would move it or break its binding.
    pub fn replace_widget(&self, widget: Widget) -> Result<(), BoardError> {
        let widget_id = widget.id;
        self.dispatch(BoardAction::WidgetReplaced(widget))?;
        debug!(%widget_id, "widget replaced");
        Ok(())
    }

    fn dispatch(&self, action: BoardAction) -> Result<(), ValidationError> {
        let mut inner = self.lock();
        match &mut inner.phase {
            BoardPhase::Ready(board) => reducer::apply(board, action),
            _ => Err(ValidationError::NotReady),
        }
    }
}

/// Whether `row` is a persisted copy of `draft`.
fn acknowledges(draft: &Row, row: &Row) -> bool {
    row.id.is_assigned() && row.widgets.iter().all(|w| w.id.is_assigned()) && row.same_shape(draft)
}
