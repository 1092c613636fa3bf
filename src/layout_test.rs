use super::*;

// =============================================================
// Layout table
// =============================================================

#[test]
fn arity_matches_layout_table() {
    assert_eq!(RowType::One.arity(), 1);
    assert_eq!(RowType::TwoA.arity(), 2);
    assert_eq!(RowType::TwoB.arity(), 2);
    assert_eq!(RowType::Three.arity(), 3);
    assert_eq!(RowType::Unknown.arity(), 0);
}

#[test]
fn two_column_rows_mirror_each_other() {
    assert_eq!(RowType::TwoA.columns(), &[ColumnType::Two, ColumnType::Three]);
    assert_eq!(RowType::TwoB.columns(), &[ColumnType::Three, ColumnType::Two]);
}

#[test]
fn row_type_parses_wire_tags() {
    assert_eq!(RowType::from("1"), RowType::One);
    assert_eq!(RowType::from("2A"), RowType::TwoA);
    assert_eq!(RowType::from(" 2b "), RowType::TwoB);
    assert_eq!(RowType::from("3"), RowType::Three);
    assert_eq!(RowType::from("4"), RowType::Unknown);
}

#[test]
fn strict_parse_rejects_unknown_tags() {
    assert_eq!("2a".parse::<RowType>(), Ok(RowType::TwoA));
    assert!("wide".parse::<RowType>().is_err());
}

#[test]
fn row_type_serializes_as_tag() {
    assert_eq!(serde_json::to_string(&RowType::TwoB).unwrap(), "\"2b\"");
    let parsed: RowType = serde_json::from_str("\"banner\"").unwrap();
    assert_eq!(parsed, RowType::Unknown);
}

#[test]
fn column_type_serializes_as_digit() {
    assert_eq!(serde_json::to_string(&ColumnType::Three).unwrap(), "\"3\"");
    let parsed: ColumnType = serde_json::from_str("\"2\"").unwrap();
    assert_eq!(parsed, ColumnType::Two);
}

// =============================================================
// create_row
// =============================================================

#[test]
fn create_row_follows_layout_for_every_type() {
    let board_id = BoardId::new(9);
    for row_type in RowType::ALL {
        let row = create_row(1, row_type, board_id);
        assert_eq!(row.widgets.len(), row_type.arity(), "{row_type}");
        let columns: Vec<ColumnType> = row.widgets.iter().map(|w| w.column_type).collect();
        assert_eq!(columns, row_type.columns(), "{row_type}");
    }
}

#[test]
fn create_row_uses_unassigned_ids() {
    let row = create_row(4, RowType::Three, BoardId::new(1));
    assert!(!row.id.is_assigned());
    assert!(row.widgets.iter().all(|w| !w.id.is_assigned()));
    assert!(row.widgets.iter().all(|w| !w.row_id.is_assigned()));
}

#[test]
fn create_row_keeps_board_and_sort_order() {
    let row = create_row(7, RowType::TwoA, BoardId::new(3));
    assert_eq!(row.board_id, BoardId::new(3));
    assert_eq!(row.sort_order, 7);
    assert_eq!(row.row_type, RowType::TwoA);
}

#[test]
fn create_row_numbers_widgets_in_column_order() {
    let row = create_row(1, RowType::Three, BoardId::new(1));
    let orders: Vec<i32> = row.widgets.iter().map(|w| w.sort_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[test]
fn create_row_widgets_are_placeholders() {
    let row = create_row(1, RowType::TwoB, BoardId::new(1));
    assert!(row.widgets.iter().all(Widget::is_placeholder));
    assert!(row.widgets.iter().all(|w| w.linked_accounts.is_empty()));
}

#[test]
fn create_row_unknown_type_is_empty() {
    let row = create_row(2, RowType::Unknown, BoardId::new(1));
    assert!(row.widgets.is_empty());
    assert_eq!(row.sort_order, 2);
}
