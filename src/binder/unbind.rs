//! Unbind confirmation.
//!
//! Unbinding asks once, then sends only the widget id. The row and every
//! other widget stay as they are.

use tracing::{debug, info, warn};

use crate::error::{BoardError, ValidationError};
use crate::model::{Widget, WidgetId};
use crate::store::BoardStore;

pub const UNBIND_FAILED: &str = "Could not delete account from widget.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnbindState {
    Confirming,
    Done,
    Cancelled,
}

pub struct UnbindPrompt {
    store: BoardStore,
    widget: Widget,
    state: UnbindState,
}

impl UnbindPrompt {
    /// Ask to unbind a bound widget.
    ///
    /// # Errors
    ///
    /// Fails when the board is not loaded, the widget is unknown, or the
    /// widget is not bound.
    pub fn new(store: BoardStore, widget_id: WidgetId) -> Result<Self, BoardError> {
        let board = store.board().ok_or(ValidationError::NotReady)?;
        let widget = board
            .widget(widget_id)
            .cloned()
            .ok_or(ValidationError::WidgetNotFound(widget_id))?;
        if widget.is_placeholder() {
            return Err(ValidationError::NotBound(widget_id).into());
        }
        Ok(Self { store, widget, state: UnbindState::Confirming })
    }

    #[must_use]
    pub fn state(&self) -> &UnbindState {
        &self.state
    }

    #[must_use]
    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    /// Dismiss without sending anything.
    pub fn cancel(&mut self) {
        if self.state == UnbindState::Confirming {
            debug!(widget_id = %self.widget.id, "unbind cancelled");
            self.state = UnbindState::Cancelled;
        }
    }

    /// Send the unbind and clear the widget on the board.
    ///
    /// A failed request leaves the prompt open so the user can confirm
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` after `cancel` or a prior success, `Busy` while
    /// another request holds the widget, and `MutationRejected` if the
    /// remote refuses.
    pub async fn confirm(&mut self) -> Result<Widget, BoardError> {
        if self.state != UnbindState::Confirming {
            return Err(BoardError::Cancelled);
        }
        let widget_id = self.widget.id;
        let _pending = self.store.begin_widget(widget_id)?;

        if let Err(e) = self.store.remote().unbind_widget(widget_id).await {
            warn!(error = %e, %widget_id, "unbind rejected");
            return Err(BoardError::MutationRejected(UNBIND_FAILED.to_owned()));
        }

        let cleared = self
            .store
            .board()
            .and_then(|board| board.widget(widget_id).cloned())
            .unwrap_or_else(|| self.widget.clone())
            .cleared();
        self.store.replace_widget(cleared.clone())?;
        self.widget = cleared.clone();
        self.state = UnbindState::Done;
        info!(%widget_id, "widget unbound");
        Ok(cleared)
    }
}
