use std::error::Error;

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1])[1]
}

/// Outermost message plus its direct cause, e.g.
/// `failed to insert reminder: database is locked`. For SQLite failures the
/// direct cause already carries SQLite's own message.
pub(crate) fn surface_error(err: &(dyn Error + 'static)) -> String {
    match err.source() {
        Some(cause) => format!("{err}: {cause}"),
        None => err.to_string(),
    }
}

/// Keep `selected` inside a list of `len` rows.
pub(crate) fn clamp_selection(selected: usize, len: usize) -> usize {
    selected.min(len.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn error_text_includes_the_root_cause() {
        let err = StoreError::Database {
            action: "insert reminder",
            source: rusqlite::Error::QueryReturnedNoRows,
        };
        assert_eq!(
            surface_error(&err),
            "failed to insert reminder: Query returned no rows"
        );
        assert_eq!(
            surface_error(&StoreError::Poisoned),
            "reminder store lock was poisoned"
        );
    }

    #[test]
    fn sqlite_message_wins_over_the_error_code() {
        let err = StoreError::Database {
            action: "insert reminder",
            source: rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER),
                Some("disk full".into()),
            ),
        };
        assert_eq!(surface_error(&err), "failed to insert reminder: disk full");
    }

    #[test]
    fn selection_stays_in_bounds() {
        assert_eq!(clamp_selection(4, 3), 2);
        assert_eq!(clamp_selection(1, 3), 1);
        assert_eq!(clamp_selection(2, 0), 0);
    }
}
