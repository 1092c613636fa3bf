//! Pure board reducer.
//!
//! Every acknowledged mutation is expressed as a [`BoardAction`] and folded
//! into the board here. `apply` checks the action against the current board
//! first and only then mutates, so a rejected action leaves the board
//! exactly as it was. No I/O.

use crate::error::ValidationError;
use crate::model::{Board, Row, RowId, Widget};

/// An acknowledged change to fold into the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardAction {
    /// A row the remote persisted; appended after every existing row.
    RowAdded(Row),
    /// A row the remote deleted.
    RowRemoved(RowId),
    /// A widget whose new binding the remote confirmed.
    WidgetReplaced(Widget),
}

/// Fold `action` into `board`.
///
/// # Errors
///
/// Returns a [`ValidationError`] and leaves `board` untouched when the
/// action would break a board invariant.
pub fn apply(board: &mut Board, action: BoardAction) -> Result<(), ValidationError> {
    match action {
        BoardAction::RowAdded(row) => add_row(board, row),
        BoardAction::RowRemoved(row_id) => remove_row(board, row_id),
        BoardAction::WidgetReplaced(widget) => replace_widget(board, widget),
    }
}

fn add_row(board: &mut Board, row: Row) -> Result<(), ValidationError> {
    if !row.id.is_assigned() {
        return Err(ValidationError::UnassignedRow);
    }
    if board.row(row.id).is_some() {
        return Err(ValidationError::DuplicateRow(row.id));
    }
    if board.rows.last().is_some_and(|last| row.sort_order <= last.sort_order) {
        return Err(ValidationError::RowOutOfOrder(row.id));
    }
    if row.widgets.windows(2).any(|pair| pair[1].sort_order <= pair[0].sort_order) {
        return Err(ValidationError::WidgetsOutOfOrder(row.id));
    }
    board.rows.push(row);
    Ok(())
}

fn remove_row(board: &mut Board, row_id: RowId) -> Result<(), ValidationError> {
    let index = board
        .rows
        .iter()
        .position(|r| r.id == row_id)
        .ok_or(ValidationError::RowNotFound(row_id))?;
    if board.rows[index].is_populated() {
        return Err(ValidationError::RowPopulated(row_id));
    }
    board.rows.remove(index);
    Ok(())
}

fn replace_widget(board: &mut Board, widget: Widget) -> Result<(), ValidationError> {
    if !widget.id.is_assigned() {
        return Err(ValidationError::UnassignedWidget);
    }
    match (widget.kind, widget.linked_accounts.is_empty()) {
        (Some(_), true) => return Err(ValidationError::BindingWithoutAccounts(widget.id)),
        (None, false) => return Err(ValidationError::AccountsWithoutBinding(widget.id)),
        _ => {}
    }

    let slot = board
        .rows
        .iter_mut()
        .flat_map(|r| r.widgets.iter_mut())
        .find(|w| w.id == widget.id)
        .ok_or(ValidationError::WidgetNotFound(widget.id))?;

    if slot.row_id != widget.row_id || slot.column_type != widget.column_type || slot.sort_order != widget.sort_order {
        return Err(ValidationError::WidgetMoved(widget.id));
    }

    *slot = widget;
    Ok(())
}

#[cfg(test)]
#[path = "reducer_test.rs"]
mod tests;
