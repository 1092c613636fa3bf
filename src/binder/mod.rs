//! Account binder: the two-step wizard that binds one widget.
//!
//! DESIGN
//! ======
//! The user first picks a widget kind, then one linked account that kind
//! accepts. Picking a kind (re-)fetches the account listing. Fetches are
//! not ordered on the wire, so each carries a [`Generation`]; a response
//! is applied only while its generation is still current, and anything
//! older is dropped silently.
//!
//! Closing the binder bumps the generation and fires a `watch` signal
//! that in-flight fetches select on, so an abandoned fetch resolves as
//! `Cancelled` without waiting for the network. Nothing the user picked
//! reaches the board unless `submit` is acknowledged by the remote store.
//!
//! ERROR HANDLING
//! ==============
//! A failed listing fetch is shown in the listing itself and retried by
//! choosing the kind again. A failed submit keeps the binder open with a
//! retryable message and an idle submit state. Actions on a closed binder
//! return `BoardError::Cancelled`, which callers do not surface.

pub mod options;
pub mod unbind;

#[cfg(test)]
#[path = "binder_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::compat::WidgetKind;
use crate::error::{BoardError, ValidationError};
use crate::model::{AccountRef, Widget, WidgetId};
use crate::remote::{AccountSource, BindRequest};
use crate::store::{BoardStore, PendingKey};
use options::{AccountOption, build_options};

pub const LISTING_FAILED: &str = "Error loading account data";
pub const BIND_FAILED: &str = "Could not save account to widget, please try again.";
pub const DEFAULT_SUCCESS_DISPLAY: Duration = Duration::from_millis(1000);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinderConfig {
    /// How long the success state stays up before `finish` closes.
    pub success_display: Duration,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self { success_display: DEFAULT_SUCCESS_DISPLAY }
    }
}

/// Monotonic tag for account-listing fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    Loading,
    Loaded(Vec<AccountOption>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinderPhase {
    ChoosingKind,
    ChoosingAccount { kind: WidgetKind, listing: ListingState, selected: Option<AccountRef> },
    Succeeded,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitState {
    #[default]
    Idle,
    Busy,
    Success,
}

/// What became of one account-listing fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The listing was applied to the binder.
    Applied,
    /// A later kind choice replaced this fetch; its result was dropped.
    Superseded,
    /// The binder closed before the fetch finished.
    Cancelled,
    /// The source failed; the listing shows the message.
    Failed(String),
}

#[derive(Debug)]
struct BinderInner {
    phase: BinderPhase,
    generation: Generation,
    submit: SubmitState,
    error: Option<String>,
}

/// Puts a busy submit back to idle however the submit future ends.
struct SubmitReset<'a>(&'a Mutex<BinderInner>);

impl Drop for SubmitReset<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.submit == SubmitState::Busy {
            inner.submit = SubmitState::Idle;
        }
    }
}

// =============================================================================
// BINDER
// =============================================================================

pub struct AccountBinder {
    store: BoardStore,
    source: Arc<dyn AccountSource>,
    widget_id: WidgetId,
    config: BinderConfig,
    inner: Mutex<BinderInner>,
    closed: watch::Sender<bool>,
}

impl AccountBinder {
    /// Open a binder for a placeholder widget on the loaded board.
    ///
    /// # Errors
    ///
    /// Fails when the board is not loaded, the widget is unknown, or the
    /// widget is already bound.
    pub fn new(
        store: BoardStore,
        source: Arc<dyn AccountSource>,
        widget_id: WidgetId,
        config: BinderConfig,
    ) -> Result<Self, BoardError> {
        let widget = current_widget(&store, widget_id)?;
        if !widget.is_placeholder() {
            return Err(ValidationError::AlreadyBound(widget_id).into());
        }
        let (closed, _) = watch::channel(false);
        Ok(Self {
            store,
            source,
            widget_id,
            config,
            inner: Mutex::new(BinderInner {
                phase: BinderPhase::ChoosingKind,
                generation: Generation::default(),
                submit: SubmitState::Idle,
                error: None,
            }),
            closed,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BinderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn widget_id(&self) -> WidgetId {
        self.widget_id
    }

    #[must_use]
    pub fn phase(&self) -> BinderPhase {
        self.lock().phase.clone()
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    #[must_use]
    pub fn kind(&self) -> Option<WidgetKind> {
        match self.lock().phase {
            BinderPhase::ChoosingAccount { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// The selectable accounts, once the current fetch has been applied.
    #[must_use]
    pub fn options(&self) -> Option<Vec<AccountOption>> {
        match &self.lock().phase {
            BinderPhase::ChoosingAccount { listing: ListingState::Loaded(options), .. } => Some(options.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<AccountRef> {
        match self.lock().phase {
            BinderPhase::ChoosingAccount { selected, .. } => selected,
            _ => None,
        }
    }

    #[must_use]
    pub fn submit_state(&self) -> SubmitState {
        self.lock().submit
    }

    /// Message to show next to the submit control.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().phase == BinderPhase::Closed
    }

    // =========================================================================
    // STEPS
    // =========================================================================

    /// Pick a widget kind and fetch the accounts it accepts.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` once the binder has closed or succeeded, and
    /// `Busy` while a submit is in flight.
    pub async fn choose_kind(&self, kind: WidgetKind) -> Result<FetchOutcome, BoardError> {
        let generation = {
            let mut inner = self.lock();
            match inner.phase {
                BinderPhase::Closed | BinderPhase::Succeeded => return Err(BoardError::Cancelled),
                BinderPhase::ChoosingKind | BinderPhase::ChoosingAccount { .. } => {}
            }
            if inner.submit == SubmitState::Busy {
                return Err(ValidationError::Busy(PendingKey::Widget(self.widget_id)).into());
            }
            inner.generation = inner.generation.next();
            inner.phase = BinderPhase::ChoosingAccount { kind, listing: ListingState::Loading, selected: None };
            inner.error = None;
            inner.generation
        };

        let mut closed = self.closed.subscribe();
        let result = tokio::select! {
            result = self.source.list_accounts() => Some(result),
            _ = closed.wait_for(|closed| *closed) => None,
        };
        let Some(result) = result else {
            debug!(widget_id = %self.widget_id, %kind, "account fetch cancelled");
            return Ok(FetchOutcome::Cancelled);
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(widget_id = %self.widget_id, %kind, "stale account fetch discarded");
            return Ok(if inner.phase == BinderPhase::Closed {
                FetchOutcome::Cancelled
            } else {
                FetchOutcome::Superseded
            });
        }

        match result {
            Ok(listing) => {
                let options = build_options(kind, &listing);
                debug!(widget_id = %self.widget_id, %kind, options = options.len(), "accounts loaded");
                inner.phase =
                    BinderPhase::ChoosingAccount { kind, listing: ListingState::Loaded(options), selected: None };
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                warn!(error = %e, widget_id = %self.widget_id, %kind, "account fetch failed");
                inner.phase = BinderPhase::ChoosingAccount {
                    kind,
                    listing: ListingState::Failed(LISTING_FAILED.to_owned()),
                    selected: None,
                };
                Ok(FetchOutcome::Failed(LISTING_FAILED.to_owned()))
            }
        }
    }

    /// Select one of the loaded options.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAccount` if `account` is not among the options,
    /// `NoKindSelected` before a kind is chosen, and `Cancelled` once closed.
    pub fn select_account(&self, account: AccountRef) -> Result<(), BoardError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &mut inner.phase {
            BinderPhase::Closed | BinderPhase::Succeeded => Err(BoardError::Cancelled),
            BinderPhase::ChoosingKind => Err(ValidationError::NoKindSelected.into()),
            BinderPhase::ChoosingAccount { listing, selected, .. } => {
                let known = matches!(listing, ListingState::Loaded(options) if options.iter().any(|o| o.account == account));
                if !known {
                    return Err(ValidationError::UnknownAccount(account).into());
                }
                *selected = Some(account);
                inner.error = None;
                Ok(())
            }
        }
    }

    /// Send the binding and fold the acknowledged widget into the board.
    ///
    /// The store is updated before this returns; the success display is
    /// left to [`Self::finish`].
    ///
    /// # Errors
    ///
    /// Returns `NoKindSelected` or `NoAccountSelected` without sending,
    /// `Busy` while another request holds the widget, `Cancelled` once
    /// closed, and `MutationRejected` if the remote refuses the binding.
    pub async fn submit(&self) -> Result<Widget, BoardError> {
        let (kind, account) = {
            let mut inner = self.lock();
            let picked = match &inner.phase {
                BinderPhase::Closed | BinderPhase::Succeeded => return Err(BoardError::Cancelled),
                BinderPhase::ChoosingKind => Err(ValidationError::NoKindSelected),
                BinderPhase::ChoosingAccount { selected: None, .. } => Err(ValidationError::NoAccountSelected),
                BinderPhase::ChoosingAccount { kind, selected: Some(account), .. } => Ok((*kind, *account)),
            };
            match picked {
                Ok(picked) => picked,
                Err(e) => {
                    inner.error = Some(e.to_string());
                    return Err(e.into());
                }
            }
        };

        let widget = current_widget(&self.store, self.widget_id)?;
        if !widget.is_placeholder() {
            return Err(ValidationError::AlreadyBound(self.widget_id).into());
        }
        let _pending = self.store.begin_widget(self.widget_id)?;
        let _reset = SubmitReset(&self.inner);
        {
            let mut inner = self.lock();
            inner.submit = SubmitState::Busy;
            inner.error = None;
        }

        let request = BindRequest::single(self.widget_id, kind, account);
        if let Err(e) = self.store.remote().bind_widget(request).await {
            warn!(error = %e, widget_id = %self.widget_id, %kind, %account, "bind rejected");
            self.lock().error = Some(BIND_FAILED.to_owned());
            return Err(BoardError::MutationRejected(BIND_FAILED.to_owned()));
        }

        let bound = widget.bound(kind, account);
        self.store.replace_widget(bound.clone())?;
        info!(widget_id = %self.widget_id, %kind, %account, "widget bound");

        let mut inner = self.lock();
        inner.submit = SubmitState::Success;
        if inner.phase != BinderPhase::Closed {
            inner.phase = BinderPhase::Succeeded;
        }
        Ok(bound)
    }

    /// Hold the success state for the configured interval, then close.
    pub async fn finish(&self) {
        if self.lock().phase != BinderPhase::Succeeded {
            return;
        }
        tokio::time::sleep(self.config.success_display).await;
        if self.lock().phase == BinderPhase::Succeeded {
            self.close();
        }
    }

    /// Close the binder, dropping any selection and cancelling fetches.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.generation = inner.generation.next();
        inner.phase = BinderPhase::Closed;
        inner.error = None;
        drop(inner);
        self.closed.send_replace(true);
        debug!(widget_id = %self.widget_id, "binder closed");
    }
}

fn current_widget(store: &BoardStore, widget_id: WidgetId) -> Result<Widget, ValidationError> {
    let board = store.board().ok_or(ValidationError::NotReady)?;
    board
        .widget(widget_id)
        .cloned()
        .ok_or(ValidationError::WidgetNotFound(widget_id))
}
