use std::future::Future;
use std::mem;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::error::StoreError;
use crate::models::{Reminder, ReminderFields, ReminderId};
use crate::reconcile::{DateTimeFormat, ReminderList, ReminderRow};
use crate::store::{ChangeStream, ReminderStore};

use super::forms::{ConfirmDelete, ReminderField, ReminderForm};
use super::helpers::{centered_rect, clamp_selection, surface_error};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;

/// Fine-grained modes layered over the reminder list.
enum Mode {
    Normal,
    Adding(ReminderForm),
    /// The target id travels with the form rather than through shared state.
    Editing {
        id: ReminderId,
        form: ReminderForm,
    },
    ConfirmDelete(ConfirmDelete),
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// Result of a background write, delivered back to the UI thread.
struct WriteOutcome {
    kind: WriteKind,
    ticket: u64,
    /// `Ok(false)` means the target record was already gone.
    result: Result<bool, StoreError>,
}

/// Central application state shared across the TUI.
pub struct App {
    store: ReminderStore,
    runtime: Handle,
    changes: ChangeStream,
    list: ReminderList,
    selected: usize,
    mode: Mode,
    status: Option<StatusMessage>,
    /// Ticket of the save the open form is waiting on, if any.
    awaiting: Option<u64>,
    next_ticket: u64,
    outcomes_tx: UnboundedSender<WriteOutcome>,
    outcomes_rx: UnboundedReceiver<WriteOutcome>,
}

impl App {
    /// Subscribe to `store` and build an empty list that fills in on the
    /// first [`App::pump`].
    pub fn new(store: ReminderStore, runtime: Handle, format: DateTimeFormat) -> Result<Self> {
        let changes = store.subscribe().context("failed to subscribe to reminders")?;
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Ok(Self {
            store,
            runtime,
            changes,
            list: ReminderList::new(format),
            selected: 0,
            mode: Mode::Normal,
            status: None,
            awaiting: None,
            next_ticket: 0,
            outcomes_tx,
            outcomes_rx,
        })
    }

    /// Drain pending change events and write outcomes. Called once per tick
    /// from the terminal loop; each event is applied to completion before the
    /// next one is read.
    pub fn pump(&mut self) {
        while let Some(event) = self.changes.try_recv() {
            let focus = self.current_row().map(|row| row.reminder().id);
            self.list.apply(&event);
            self.selected = focus
                .and_then(|id| self.list.position(id))
                .unwrap_or_else(|| clamp_selection(self.selected, self.list.len()));
        }

        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.finish_write(outcome);
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit),
            Mode::Adding(form) => match self.handle_form_key(code, None, form) {
                Some(form) => Mode::Adding(form),
                None => Mode::Normal,
            },
            Mode::Editing { id, form } => match self.handle_form_key(code, Some(id), form) {
                Some(form) => Mode::Editing { id, form },
                None => Mode::Normal,
            },
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm),
        };

        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Mode {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                *exit = true;
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-5),
            KeyCode::PageDown => self.move_selection(5),
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = clamp_selection(usize::MAX, self.list.len()),
            KeyCode::Char('+') | KeyCode::Char('a') => {
                self.clear_status();
                return Mode::Adding(ReminderForm::starting_at(Local::now().naive_local()));
            }
            KeyCode::Enter | KeyCode::Char('e') | KeyCode::Char('E') => {
                if let Some(reminder) = self.current_reminder().cloned() {
                    self.clear_status();
                    return Mode::Editing {
                        id: reminder.id,
                        form: ReminderForm::from_reminder(&reminder, &Local),
                    };
                }
                self.set_status("No reminder selected to edit.", StatusKind::Error);
            }
            KeyCode::Char('-') | KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(reminder) = self.current_reminder().cloned() {
                    self.clear_status();
                    return Mode::ConfirmDelete(ConfirmDelete { reminder });
                }
                self.set_status("No reminder selected to remove.", StatusKind::Error);
            }
            _ => {}
        }
        Mode::Normal
    }

    /// Shared key handling for the add and edit forms. Returns `None` once the
    /// form should close.
    fn handle_form_key(
        &mut self,
        code: KeyCode,
        target: Option<ReminderId>,
        mut form: ReminderForm,
    ) -> Option<ReminderForm> {
        if code == KeyCode::Esc {
            // A save still in flight may land later; its outcome no longer
            // touches any form.
            self.awaiting = None;
            self.set_status("Cancelled.", StatusKind::Info);
            return None;
        }
        if form.saving {
            return Some(form);
        }

        match code {
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Left => form.cycle_repeat(-1),
            KeyCode::Right => form.cycle_repeat(1),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match form.parse_inputs(&Local) {
                Ok(fields) => {
                    form.error = None;
                    form.saving = true;
                    self.awaiting = Some(self.save(target, fields));
                }
                Err(err) => {
                    let message = err.to_string();
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }
        Some(form)
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Mode {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                let store = self.store.clone();
                let reminder = confirm.reminder;
                self.spawn_write(WriteKind::Delete, async move { store.delete(&reminder).await });
                Mode::Normal
            }
            _ => Mode::ConfirmDelete(confirm),
        }
    }

    /// Hand validated fields to the store: an update when the form was opened
    /// for `target`, otherwise a create. Returns the write's ticket.
    fn save(&mut self, target: Option<ReminderId>, fields: ReminderFields) -> u64 {
        let store = self.store.clone();
        match target {
            Some(id) => self.spawn_write(WriteKind::Update, async move {
                store.update(id, fields).await
            }),
            None => self.spawn_write(WriteKind::Insert, async move {
                store.create(fields).await.map(|_| true)
            }),
        }
    }

    fn spawn_write<F>(&mut self, kind: WriteKind, write: F) -> u64
    where
        F: Future<Output = Result<bool, StoreError>> + Send + 'static,
    {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let outcomes = self.outcomes_tx.clone();
        self.runtime.spawn(async move {
            let result = write.await;
            // The receiver lives as long as the app; nothing to do if it is gone.
            let _ = outcomes.send(WriteOutcome {
                kind,
                ticket,
                result,
            });
        });
        ticket
    }

    fn finish_write(&mut self, outcome: WriteOutcome) {
        let owns_form = self.awaiting == Some(outcome.ticket);
        if owns_form {
            self.awaiting = None;
        }

        match (outcome.kind, outcome.result) {
            (WriteKind::Insert, Ok(_)) => {
                self.close_form(owns_form);
                self.set_status("Reminder saved successfully", StatusKind::Info);
            }
            (WriteKind::Update, Ok(true)) => {
                self.close_form(owns_form);
                self.set_status("Reminder updated successfully", StatusKind::Info);
            }
            (WriteKind::Update, Ok(false)) => {
                self.close_form(owns_form);
                self.set_status("That reminder no longer exists.", StatusKind::Error);
            }
            (WriteKind::Delete, Ok(true)) => {
                self.set_status("Reminder deleted.", StatusKind::Info);
            }
            (WriteKind::Delete, Ok(false)) => {
                self.set_status("Reminder was already deleted.", StatusKind::Info);
            }
            (kind, Err(err)) => {
                let message = surface_error(&err);
                warn!(?kind, error = %message, "reminder write failed");
                // Keep the form and its input so the user can retry.
                if let (true, Mode::Adding(form) | Mode::Editing { form, .. }) =
                    (owns_form, &mut self.mode)
                {
                    form.saving = false;
                    form.error = Some(message.clone());
                }
                self.set_status(message, StatusKind::Error);
            }
        }
    }

    /// Close the open form, but only when it is the one that issued the write.
    fn close_form(&mut self, owns_form: bool) {
        if owns_form && matches!(self.mode, Mode::Adding(_) | Mode::Editing { .. }) {
            self.mode = Mode::Normal;
        }
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let footer_height = FOOTER_HEIGHT.min(area.height);

        let (content_area, footer_area) = if area.height > footer_height {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(footer_height)])
                .split(area);
            (chunks[0], chunks[1])
        } else {
            (area, area)
        };

        self.draw_reminder_list(frame, content_area);

        if area.height >= footer_height {
            self.draw_footer(frame, footer_area);
        }

        match &self.mode {
            Mode::Adding(form) => self.draw_form(frame, area, "Add Reminder", form),
            Mode::Editing { form, .. } => self.draw_form(frame, area, "Update Reminder", form),
            Mode::ConfirmDelete(confirm) => self.draw_confirm_delete(frame, area, confirm),
            Mode::Normal => {}
        }
    }

    fn draw_reminder_list(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().title("My Reminders").borders(Borders::ALL);

        if !self.list.is_loaded() || self.list.is_empty() {
            let text = if self.list.is_loaded() {
                "No reminders yet. Press + to add one."
            } else {
                "Loading reminders..."
            };
            let paragraph = Paragraph::new(Line::from(Span::styled(
                text,
                Style::default().fg(Color::DarkGray),
            )))
            .alignment(Alignment::Center)
            .block(block);
            frame.render_widget(paragraph, area);
            return;
        }

        let items: Vec<ListItem> = self.list.rows().iter().map(reminder_item).collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let paragraph = Paragraph::new(vec![status_line, self.footer_instructions()])
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match &self.mode {
            Mode::Normal => &[
                ("[↑↓]", " Navigate   "),
                ("[+]", " Add   "),
                ("[E]", " Edit   "),
                ("[-]", " Delete   "),
                ("[Q]", " Quit"),
            ],
            Mode::Adding(_) | Mode::Editing { .. } => &[
                ("[Tab]", " Next Field   "),
                ("[←→]", " Repeat   "),
                ("[Enter]", " Save   "),
                ("[Esc]", " Cancel"),
            ],
            Mode::ConfirmDelete(_) => &[("[Y]", " Delete   "), ("[N]", " Keep")],
        };

        let spans = keys
            .iter()
            .flat_map(|(key, action)| [Span::styled(*key, key_style), Span::raw(*action)])
            .collect::<Vec<_>>();
        Line::from(spans)
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &ReminderForm) {
        let popup_area = centered_rect(70, 50, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines = vec![
            form.build_line(ReminderField::Title),
            form.build_line(ReminderField::Description),
            form.build_line(ReminderField::Date),
            form.build_line(ReminderField::Time),
            form.build_line(ReminderField::Repeat),
            Line::from(""),
        ];

        if form.saving {
            lines.push(Line::from(Span::styled(
                "Saving...",
                Style::default().fg(Color::Yellow),
            )));
        } else if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Date as YYYY-MM-DD, time as HH:MM (24h)",
                Style::default().fg(Color::Gray),
            )));
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
        frame.render_widget(paragraph, inner);

        if let Some((column, row)) = form.cursor() {
            frame.set_cursor_position((inner.x + column, inner.y + row));
        }
    }

    fn draw_confirm_delete(&self, frame: &mut Frame, area: Rect, confirm: &ConfirmDelete) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title("Confirm Removal")
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let lines = vec![
            Line::from(format!("Delete \"{}\"?", confirm.reminder.title)),
            Line::from(""),
            Line::from(Span::styled(
                "Press Y to confirm or N / Esc to cancel.",
                Style::default().fg(Color::Gray),
            )),
        ];

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn current_row(&self) -> Option<&ReminderRow> {
        self.list.get(self.selected)
    }

    fn current_reminder(&self) -> Option<&Reminder> {
        self.current_row().map(ReminderRow::reminder)
    }

    fn move_selection(&mut self, offset: isize) {
        if self.list.is_empty() {
            self.selected = 0;
            return;
        }
        let next = self.selected.saturating_add_signed(offset);
        self.selected = clamp_selection(next, self.list.len());
    }
}

fn reminder_item(row: &ReminderRow) -> ListItem<'static> {
    let reminder = row.reminder();
    ListItem::new(vec![
        Line::from(Span::styled(
            reminder.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(reminder.description.clone()),
        Line::from(format!("Date: {}", row.when())),
        Line::from(format!("Repeat: {}", reminder.repeat.label())),
        Line::from(""),
    ])
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    use super::*;
    use crate::models::RepeatInterval;

    struct Harness {
        app: App,
        store: ReminderStore,
        runtime: Runtime,
        path: PathBuf,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.sqlite");
        let store = ReminderStore::open(&path).unwrap();
        let runtime = Runtime::new().unwrap();
        let mut app = App::new(
            store.clone(),
            runtime.handle().clone(),
            DateTimeFormat::default(),
        )
        .unwrap();
        app.pump();
        Harness {
            app,
            store,
            runtime,
            path,
            _dir: dir,
        }
    }

    impl Harness {
        fn press(&mut self, code: KeyCode) {
            self.app.handle_key(code).unwrap();
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch));
            }
        }

        fn create(&self, title: &str) -> Reminder {
            let fields = ReminderFields::new(title, "details", Utc::now(), RepeatInterval::None);
            self.runtime.block_on(self.store.create(fields)).unwrap()
        }

        fn delete(&self, reminder: &Reminder) {
            assert!(self.runtime.block_on(self.store.delete(reminder)).unwrap());
        }

        /// Pump until `done` holds; background writes finish on the runtime.
        fn settle(&mut self, done: impl Fn(&App) -> bool) {
            for _ in 0..500 {
                self.app.pump();
                if done(&self.app) {
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }
            panic!("app never reached the expected state");
        }

        fn reject_inserts(&self, reject: bool) {
            let conn = rusqlite::Connection::open(&self.path).unwrap();
            let sql = if reject {
                "CREATE TRIGGER reject_inserts BEFORE INSERT ON reminders
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
            } else {
                "DROP TRIGGER reject_inserts;"
            };
            conn.execute_batch(sql).unwrap();
        }
    }

    fn status(app: &App) -> Option<&str> {
        app.status.as_ref().map(|status| status.text.as_str())
    }

    fn open_form(app: &App) -> Option<&ReminderForm> {
        match &app.mode {
            Mode::Adding(form) | Mode::Editing { form, .. } => Some(form),
            _ => None,
        }
    }

    fn selected_title(app: &App) -> Option<String> {
        app.current_reminder().map(|reminder| reminder.title.clone())
    }

    #[test]
    fn failed_save_keeps_the_form_and_a_retry_closes_it() {
        let mut h = harness();
        h.reject_inserts(true);

        h.press(KeyCode::Char('a'));
        h.type_text("Hi");
        h.press(KeyCode::Tab);
        h.type_text("There");
        h.press(KeyCode::Enter);
        assert!(open_form(&h.app).is_some_and(|form| form.saving));

        h.settle(|app| open_form(app).is_some_and(|form| !form.saving));
        let form = open_form(&h.app).unwrap();
        assert!(matches!(h.app.mode, Mode::Adding(_)));
        assert_eq!(form.title, "Hi");
        assert_eq!(form.description, "There");
        assert_eq!(
            form.error.as_deref(),
            Some("failed to insert reminder: disk full")
        );
        assert_eq!(status(&h.app), Some("failed to insert reminder: disk full"));
        assert!(h.app.list.is_empty());

        h.reject_inserts(false);
        h.press(KeyCode::Enter);
        h.settle(|app| matches!(app.mode, Mode::Normal) && app.list.len() == 1);
        assert_eq!(status(&h.app), Some("Reminder saved successfully"));
        assert_eq!(selected_title(&h.app).as_deref(), Some("Hi"));
    }

    #[test]
    fn edits_report_success_and_vanished_targets() {
        let mut h = harness();
        let original = h.create("Gone");
        h.settle(|app| app.list.len() == 1);

        h.press(KeyCode::Char('e'));
        h.type_text("!");
        h.press(KeyCode::Enter);
        h.settle(|app| {
            matches!(app.mode, Mode::Normal) && selected_title(app).as_deref() == Some("Gone!")
        });
        assert_eq!(status(&h.app), Some("Reminder updated successfully"));

        h.press(KeyCode::Char('e'));
        assert!(matches!(h.app.mode, Mode::Editing { id, .. } if id == original.id));
        h.delete(&original);
        h.settle(|app| app.list.is_empty());
        assert!(open_form(&h.app).is_some());

        h.press(KeyCode::Enter);
        h.settle(|app| matches!(app.mode, Mode::Normal));
        assert_eq!(status(&h.app), Some("That reminder no longer exists."));
    }

    #[test]
    fn selection_stays_on_the_focused_reminder() {
        let mut h = harness();
        h.create("Hi");
        let other = h.create("Other");
        h.settle(|app| app.list.len() == 2);

        h.press(KeyCode::Down);
        assert_eq!(selected_title(&h.app).as_deref(), Some("Hi"));

        let newer = h.create("Newer");
        h.settle(|app| app.list.len() == 3);
        assert_eq!(h.app.selected, 2);
        assert_eq!(selected_title(&h.app).as_deref(), Some("Hi"));

        h.delete(&newer);
        h.delete(&other);
        h.settle(|app| app.list.len() == 1);
        assert_eq!(h.app.selected, 0);
        assert_eq!(selected_title(&h.app).as_deref(), Some("Hi"));
    }

    #[test]
    fn escape_leaves_a_pending_save_and_its_outcome_spares_the_next_form() {
        let mut h = harness();

        h.press(KeyCode::Char('a'));
        h.type_text("Hi");
        h.press(KeyCode::Tab);
        h.type_text("There");
        h.press(KeyCode::Enter);
        h.press(KeyCode::Esc);
        assert!(matches!(h.app.mode, Mode::Normal));

        h.press(KeyCode::Char('a'));
        h.settle(|app| {
            status(app) == Some("Reminder saved successfully") && app.list.len() == 1
        });
        let form = open_form(&h.app).unwrap();
        assert!(matches!(h.app.mode, Mode::Adding(_)));
        assert!(form.title.is_empty());
        assert!(!form.saving);
    }
}
