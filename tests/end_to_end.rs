use std::sync::Arc;
use std::time::Duration;

use widgetboard::binder::unbind::UnbindPrompt;
use widgetboard::binder::{AccountBinder, BinderConfig, FetchOutcome};
use widgetboard::compat::{AccountType, WidgetKind};
use widgetboard::layout::{ColumnType, RowType};
use widgetboard::model::AccountRef;
use widgetboard::remote::memory::MemoryRemote;
use widgetboard::remote::{AccountListing, Institution, LinkedAccount, Operation};
use widgetboard::store::BoardStore;

fn listing() -> AccountListing {
    AccountListing {
        accounts: vec![
            LinkedAccount {
                account_id: 31,
                institution_id: 3,
                name: "Checking".into(),
                mask: Some("9911".into()),
                account_type: AccountType::Depository,
                created_at: None,
            },
            LinkedAccount {
                account_id: 32,
                institution_id: 3,
                name: "Brokerage".into(),
                mask: None,
                account_type: AccountType::Investment,
                created_at: None,
            },
        ],
        institutions: vec![Institution { institution_id: 3, name: "Harbor Bank".into() }],
    }
}

#[tokio::test]
async fn bind_then_unbind_leaves_row_intact() {
    let remote = MemoryRemote::new(42).with_accounts(listing());
    remote.seed_row(RowType::TwoA);
    let store = BoardStore::new(Arc::new(remote.clone()));
    store.load().await.unwrap();

    let row = store.board().unwrap().rows[0].clone();
    assert_eq!(row.widgets.len(), 2);
    assert!(row.widgets.iter().all(|w| w.is_placeholder()));
    let first = row.widgets[0].id;

    let config = BinderConfig { success_display: Duration::from_millis(1) };
    let binder = AccountBinder::new(store.clone(), Arc::new(remote.clone()), first, config).unwrap();
    assert_eq!(binder.choose_kind(WidgetKind::SpendAnalyzer).await, Ok(FetchOutcome::Applied));
    let options = binder.options().unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].label(), "Harbor Bank Checking");
    binder.select_account(options[0].account).unwrap();
    binder.submit().await.unwrap();

    let bound = store.board().unwrap().widget(first).cloned().unwrap();
    assert_eq!(bound.kind, Some(WidgetKind::SpendAnalyzer));
    assert_eq!(bound.linked_accounts, vec![AccountRef::new(3, 31)]);
    binder.finish().await;
    assert!(binder.is_closed());

    let mut prompt = UnbindPrompt::new(store.clone(), first).unwrap();
    prompt.confirm().await.unwrap();

    let board = store.board().unwrap();
    let widget = board.widget(first).unwrap();
    assert_eq!(widget.kind, None);
    assert!(widget.linked_accounts.is_empty());
    assert_eq!(board.rows.len(), 1);
    assert_eq!(board.rows[0].widgets.len(), 2);
    assert_eq!(
        board.rows[0].widgets.iter().map(|w| w.column_type).collect::<Vec<_>>(),
        vec![ColumnType::Two, ColumnType::Three]
    );
    assert_eq!(board, remote.snapshot());
    assert!(board.violations().is_empty());
}

#[tokio::test]
async fn rows_grow_and_shrink_through_the_store() {
    let remote = MemoryRemote::new(42);
    let store = BoardStore::new(Arc::new(remote.clone()));
    store.load().await.unwrap();

    let mut ids = Vec::new();
    for row_type in RowType::ALL {
        let row = store.add_row(row_type).await.unwrap();
        assert_eq!(row.widgets.len(), row_type.arity());
        ids.push(row.id);
    }
    let board = store.board().unwrap();
    assert_eq!(board.rows.len(), 4);
    assert!(board.violations().is_empty());

    store.delete_row(ids[1]).await.unwrap();
    let board = store.board().unwrap();
    assert_eq!(board.rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[0], ids[2], ids[3]]);
    assert_eq!(remote.calls(Operation::AddRow), 4);
    assert_eq!(remote.calls(Operation::DeleteRow), 1);
}
