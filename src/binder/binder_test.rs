use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{Semaphore, oneshot};

use super::options::{AccountOption, build_options};
use super::unbind::{UNBIND_FAILED, UnbindPrompt, UnbindState};
use super::*;
use crate::compat::AccountType;
use crate::remote::memory::MemoryRemote;
use crate::model::{Board, Row, RowId};
use crate::remote::{AccountListing, AddRowRequest, Institution, LinkedAccount, Operation, RemoteError, RemoteStore};

// =============================================================
// Test doubles
// =============================================================

type Reply = Result<AccountListing, RemoteError>;

/// Answers each fetch with the next queued reply, once the test sends it.
struct QueuedSource {
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    calls: AtomicUsize,
}

impl QueuedSource {
    fn new(count: usize) -> (Arc<Self>, Vec<oneshot::Sender<Reply>>) {
        let (senders, receivers): (Vec<_>, VecDeque<_>) = (0..count).map(|_| oneshot::channel()).unzip();
        (Arc::new(Self { replies: Mutex::new(receivers), calls: AtomicUsize::new(0) }), senders)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AccountSource for QueuedSource {
    async fn list_accounts(&self) -> Reply {
        let reply = self.replies.lock().unwrap().pop_front().expect("unexpected account fetch");
        self.calls.fetch_add(1, Ordering::SeqCst);
        reply.await.unwrap_or_else(|_| Err(RemoteError::Transport("reply dropped".into())))
    }
}

/// Holds every bind until the test adds a permit.
struct HeldBinds {
    inner: MemoryRemote,
    permits: Arc<Semaphore>,
}

#[async_trait::async_trait]
impl RemoteStore for HeldBinds {
    async fn load_board(&self) -> Result<Board, RemoteError> {
        self.inner.load_board().await
    }

    async fn add_row(&self, request: AddRowRequest) -> Result<Row, RemoteError> {
        self.inner.add_row(request).await
    }

    async fn delete_row(&self, row_id: RowId) -> Result<(), RemoteError> {
        self.inner.delete_row(row_id).await
    }

    async fn bind_widget(&self, request: BindRequest) -> Result<(), RemoteError> {
        self.permits.acquire().await.unwrap().forget();
        self.inner.bind_widget(request).await
    }

    async fn unbind_widget(&self, widget_id: WidgetId) -> Result<(), RemoteError> {
        self.inner.unbind_widget(widget_id).await
    }
}

fn account(account_id: i64, institution_id: i64, name: &str, account_type: AccountType) -> LinkedAccount {
    LinkedAccount {
        account_id,
        institution_id,
        name: name.to_owned(),
        mask: None,
        account_type,
        created_at: None,
    }
}

fn listing_of(accounts: Vec<LinkedAccount>) -> AccountListing {
    AccountListing { accounts, institutions: vec![Institution { institution_id: 1, name: "Bank".into() }] }
}

async fn loaded_demo() -> (MemoryRemote, BoardStore) {
    let remote = MemoryRemote::demo();
    let store = BoardStore::new(Arc::new(remote.clone()));
    store.load().await.unwrap();
    (remote, store)
}

fn open(store: &BoardStore, source: Arc<dyn AccountSource>, widget_id: i64) -> AccountBinder {
    let config = BinderConfig { success_display: Duration::from_millis(5) };
    AccountBinder::new(store.clone(), source, WidgetId::new(widget_id), config).unwrap()
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        tokio::task::yield_now().await;
    }
}

fn option_accounts(binder: &AccountBinder) -> Vec<AccountRef> {
    binder.options().unwrap_or_default().iter().map(|o| o.account).collect()
}

// =============================================================
// Options
// =============================================================

#[test]
fn options_carry_display_fields() {
    let mut checking = account(101, 1, "Everyday Checking", AccountType::Depository);
    checking.mask = Some("0042".into());
    checking.created_at = Some(OffsetDateTime::from_unix_timestamp(1_709_632_800).unwrap());
    let orphan = account(7, 99, "Card", AccountType::Credit);
    let listing = listing_of(vec![checking, orphan, account(8, 1, "Brokerage", AccountType::Investment)]);

    let options = build_options(WidgetKind::SpendAnalyzer, &listing);
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].label(), "Bank Everyday Checking");
    assert_eq!(options[0].masked().as_deref(), Some("••••0042"));
    assert_eq!(options[0].added().as_deref(), Some("Added: March 5, 2024"));
    assert_eq!(options[1].label(), "Card");
    assert_eq!(options[1].masked(), None);
    assert_eq!(options[1].added(), None);
}

#[test]
fn other_account_types_are_never_offered() {
    let listing = listing_of(vec![account(1, 1, "Odd", AccountType::Other("brokerage".into()))]);
    for kind in WidgetKind::ALL {
        let options: Vec<AccountOption> = build_options(kind, &listing);
        assert!(options.is_empty(), "{kind} offered an unsupported account");
    }
}

// =============================================================
// Choosing a kind
// =============================================================

#[tokio::test]
async fn choose_kind_filters_listing() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote.clone()), 1);
    assert_eq!(binder.phase(), BinderPhase::ChoosingKind);

    assert_eq!(binder.choose_kind(WidgetKind::SpendAnalyzer).await, Ok(FetchOutcome::Applied));
    assert_eq!(binder.kind(), Some(WidgetKind::SpendAnalyzer));
    assert_eq!(option_accounts(&binder), vec![AccountRef::new(1, 101), AccountRef::new(1, 102)]);

    binder.choose_kind(WidgetKind::InvestmentGraph).await.unwrap();
    assert_eq!(option_accounts(&binder), vec![AccountRef::new(1, 101), AccountRef::new(2, 201)]);

    binder.choose_kind(WidgetKind::Transactions).await.unwrap();
    assert_eq!(option_accounts(&binder).len(), 4);
    assert_eq!(remote.calls(Operation::ListAccounts), 3);
}

#[tokio::test]
async fn changing_kind_clears_selection() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote), 1);
    binder.choose_kind(WidgetKind::Transactions).await.unwrap();
    binder.select_account(AccountRef::new(2, 202)).unwrap();
    assert_eq!(binder.selected(), Some(AccountRef::new(2, 202)));

    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    assert_eq!(binder.selected(), None);
}

#[tokio::test]
async fn late_response_for_previous_kind_is_discarded() {
    let (_, store) = loaded_demo().await;
    let (source, mut replies) = QueuedSource::new(2);
    let binder = open(&store, source.clone(), 3);
    let reply_b = replies.pop().unwrap();
    let reply_a = replies.pop().unwrap();

    let (a, b, ()) = tokio::join!(
        binder.choose_kind(WidgetKind::InvestmentGraph),
        async {
            wait_until(|| source.calls() == 1).await;
            binder.choose_kind(WidgetKind::SpendAnalyzer).await
        },
        async {
            wait_until(|| source.calls() == 2).await;
            reply_b.send(Ok(listing_of(vec![account(11, 1, "Checking", AccountType::Depository)]))).unwrap();
            wait_until(|| binder.options().is_some()).await;
            reply_a.send(Ok(listing_of(vec![account(12, 1, "Brokerage", AccountType::Investment)]))).unwrap();
        },
    );

    assert_eq!(a, Ok(FetchOutcome::Superseded));
    assert_eq!(b, Ok(FetchOutcome::Applied));
    assert_eq!(binder.kind(), Some(WidgetKind::SpendAnalyzer));
    assert_eq!(option_accounts(&binder), vec![AccountRef::new(1, 11)]);
}

#[tokio::test]
async fn closing_mid_fetch_cancels_quietly() {
    let (_, store) = loaded_demo().await;
    let before = store.board();
    let (source, replies) = QueuedSource::new(1);
    let binder = open(&store, source.clone(), 3);

    let (outcome, ()) = tokio::join!(binder.choose_kind(WidgetKind::Transactions), async {
        wait_until(|| source.calls() == 1).await;
        binder.close();
    });

    assert_eq!(outcome, Ok(FetchOutcome::Cancelled));
    assert!(binder.is_closed());
    assert_eq!(binder.options(), None);
    assert_eq!(binder.submit().await, Err(BoardError::Cancelled));
    assert_eq!(binder.choose_kind(WidgetKind::Transactions).await, Err(BoardError::Cancelled));
    assert_eq!(store.board(), before);
    drop(replies);
}

#[tokio::test]
async fn failed_fetch_is_retryable() {
    let (remote, store) = loaded_demo().await;
    remote.fail_next(Operation::ListAccounts, "plaid unavailable");
    let binder = open(&store, Arc::new(remote), 1);

    let outcome = binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    assert_eq!(outcome, FetchOutcome::Failed(LISTING_FAILED.into()));
    assert!(matches!(
        binder.phase(),
        BinderPhase::ChoosingAccount { listing: ListingState::Failed(_), .. }
    ));

    assert_eq!(binder.choose_kind(WidgetKind::SpendAnalyzer).await, Ok(FetchOutcome::Applied));
    assert!(binder.options().is_some());
}

// =============================================================
// Selecting and submitting
// =============================================================

#[tokio::test]
async fn select_requires_listed_compatible_account() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote), 1);
    assert_eq!(
        binder.select_account(AccountRef::new(1, 101)),
        Err(ValidationError::NoKindSelected.into())
    );

    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    assert_eq!(
        binder.select_account(AccountRef::new(2, 202)),
        Err(ValidationError::UnknownAccount(AccountRef::new(2, 202)).into())
    );
    assert_eq!(binder.selected(), None);
}

#[tokio::test]
async fn submit_requires_kind_and_account() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote.clone()), 1);

    assert_eq!(binder.submit().await, Err(ValidationError::NoKindSelected.into()));
    assert_eq!(binder.error().as_deref(), Some("Please select a widget type."));

    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    assert_eq!(binder.submit().await, Err(ValidationError::NoAccountSelected.into()));
    assert_eq!(binder.error().as_deref(), Some("Please select an account to add."));
    assert_eq!(remote.calls(Operation::BindWidget), 0);
}

#[tokio::test]
async fn submit_updates_store_before_finish() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote.clone()), 1);
    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    binder.select_account(AccountRef::new(1, 101)).unwrap();

    let bound = binder.submit().await.unwrap();
    assert_eq!(bound.kind, Some(WidgetKind::SpendAnalyzer));
    assert_eq!(bound.linked_accounts, vec![AccountRef::new(1, 101)]);
    assert_eq!(store.board().unwrap().widget(bound.id), Some(&bound));
    assert_eq!(remote.snapshot().widget(bound.id), Some(&bound));
    assert_eq!(binder.phase(), BinderPhase::Succeeded);
    assert_eq!(binder.submit_state(), SubmitState::Success);
    assert!(store.pending().is_empty());

    binder.finish().await;
    assert!(binder.is_closed());
    assert_eq!(store.board().unwrap().widget(bound.id), Some(&bound));
}

#[tokio::test]
async fn close_during_submit_keeps_acknowledged_bind() {
    let remote = MemoryRemote::demo();
    let permits = Arc::new(Semaphore::new(0));
    let store = BoardStore::new(Arc::new(HeldBinds { inner: remote.clone(), permits: Arc::clone(&permits) }));
    store.load().await.unwrap();
    let binder = Arc::new(open(&store, Arc::new(remote.clone()), 1));
    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    binder.select_account(AccountRef::new(1, 101)).unwrap();

    let submit = tokio::spawn({
        let binder = Arc::clone(&binder);
        async move { binder.submit().await }
    });
    wait_until(|| binder.submit_state() == SubmitState::Busy).await;
    binder.close();
    permits.add_permits(1);

    let bound = submit.await.unwrap().unwrap();
    assert!(binder.is_closed());
    assert_ne!(binder.submit_state(), SubmitState::Busy);
    assert_eq!(store.board().unwrap().widget(bound.id), Some(&bound));
    assert_eq!(remote.snapshot().widget(bound.id), Some(&bound));
    assert!(store.pending().is_empty());
}

#[tokio::test]
async fn submit_failure_stays_open_and_idle() {
    let (remote, store) = loaded_demo().await;
    let before = store.board();
    let binder = open(&store, Arc::new(remote.clone()), 4);
    binder.choose_kind(WidgetKind::Transactions).await.unwrap();
    binder.select_account(AccountRef::new(2, 202)).unwrap();
    remote.fail_next(Operation::BindWidget, "Could not save account to widget.");

    assert_eq!(binder.submit().await, Err(BoardError::MutationRejected(BIND_FAILED.into())));
    assert_eq!(binder.submit_state(), SubmitState::Idle);
    assert_eq!(binder.error().as_deref(), Some(BIND_FAILED));
    assert_eq!(binder.selected(), Some(AccountRef::new(2, 202)));
    assert_eq!(store.board(), before);
    assert!(store.pending().is_empty());

    let bound = binder.submit().await.unwrap();
    assert_eq!(bound.kind, Some(WidgetKind::Transactions));
    assert_eq!(binder.error(), None);
}

#[tokio::test]
async fn submit_while_widget_busy_sends_nothing() {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote.clone()), 1);
    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    binder.select_account(AccountRef::new(1, 102)).unwrap();

    let held = store.begin_widget(WidgetId::new(1)).unwrap();
    assert_eq!(
        binder.submit().await,
        Err(ValidationError::Busy(PendingKey::Widget(WidgetId::new(1))).into())
    );
    assert_eq!(binder.submit_state(), SubmitState::Idle);
    assert_eq!(remote.calls(Operation::BindWidget), 0);
    drop(held);
}

#[tokio::test]
async fn binder_refuses_bound_or_unknown_widgets() {
    let (remote, store) = loaded_demo().await;
    let source: Arc<dyn AccountSource> = Arc::new(remote.clone());
    let first = open(&store, Arc::clone(&source), 2);
    first.choose_kind(WidgetKind::Transactions).await.unwrap();
    first.select_account(AccountRef::new(1, 102)).unwrap();
    first.submit().await.unwrap();

    let again = AccountBinder::new(store.clone(), Arc::clone(&source), WidgetId::new(2), BinderConfig::default());
    assert_eq!(again.err(), Some(ValidationError::AlreadyBound(WidgetId::new(2)).into()));

    let missing = AccountBinder::new(store, source, WidgetId::new(404), BinderConfig::default());
    assert_eq!(missing.err(), Some(ValidationError::WidgetNotFound(WidgetId::new(404)).into()));
}

// =============================================================
// Unbind
// =============================================================

async fn bound_demo(widget_id: i64) -> (MemoryRemote, BoardStore) {
    let (remote, store) = loaded_demo().await;
    let binder = open(&store, Arc::new(remote.clone()), widget_id);
    binder.choose_kind(WidgetKind::SpendAnalyzer).await.unwrap();
    binder.select_account(AccountRef::new(1, 101)).unwrap();
    binder.submit().await.unwrap();
    (remote, store)
}

#[tokio::test]
async fn confirm_clears_binding_and_keeps_row() {
    let (remote, store) = bound_demo(1).await;
    let row_before = store.board().unwrap().rows[0].clone();
    let mut prompt = UnbindPrompt::new(store.clone(), WidgetId::new(1)).unwrap();
    assert_eq!(prompt.state(), &UnbindState::Confirming);

    let cleared = prompt.confirm().await.unwrap();
    assert!(cleared.is_placeholder());
    assert!(cleared.linked_accounts.is_empty());
    assert_eq!(prompt.state(), &UnbindState::Done);

    let row = store.board().unwrap().rows[0].clone();
    assert_eq!(row.widgets.len(), 2);
    assert_eq!(row.widgets[0], cleared);
    assert_eq!(row.widgets[1], row_before.widgets[1]);
    assert!(remote.snapshot().widget(WidgetId::new(1)).unwrap().is_placeholder());
    assert_eq!(prompt.confirm().await, Err(BoardError::Cancelled));
}

#[tokio::test]
async fn cancel_sends_nothing() {
    let (remote, store) = bound_demo(1).await;
    let mut prompt = UnbindPrompt::new(store.clone(), WidgetId::new(1)).unwrap();
    prompt.cancel();

    assert_eq!(prompt.state(), &UnbindState::Cancelled);
    assert_eq!(prompt.confirm().await, Err(BoardError::Cancelled));
    assert_eq!(remote.calls(Operation::UnbindWidget), 0);
    assert!(!store.board().unwrap().widget(WidgetId::new(1)).unwrap().is_placeholder());
}

#[tokio::test]
async fn unbind_failure_can_be_confirmed_again() {
    let (remote, store) = bound_demo(3).await;
    let before = store.board();
    remote.fail_next(Operation::UnbindWidget, "");
    let mut prompt = UnbindPrompt::new(store.clone(), WidgetId::new(3)).unwrap();

    assert_eq!(prompt.confirm().await, Err(BoardError::MutationRejected(UNBIND_FAILED.into())));
    assert_eq!(prompt.state(), &UnbindState::Confirming);
    assert_eq!(store.board(), before);

    prompt.confirm().await.unwrap();
    assert!(store.board().unwrap().widget(WidgetId::new(3)).unwrap().is_placeholder());
}

#[tokio::test]
async fn unbind_requires_bound_widget() {
    let (_, store) = loaded_demo().await;
    assert_eq!(
        UnbindPrompt::new(store, WidgetId::new(1)).err(),
        Some(ValidationError::NotBound(WidgetId::new(1)).into())
    );
}
