use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use thiserror::Error;

use crate::models::{Reminder, ReminderFields, RepeatInterval};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Validation failures, checked in declaration order. None of them reach the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum FormError {
    #[error("Title cannot be empty")]
    TitleEmpty,
    #[error("Description cannot be empty")]
    DescriptionEmpty,
    #[error("Date must look like YYYY-MM-DD")]
    InvalidDate,
    #[error("Time must look like HH:MM")]
    InvalidTime,
}

/// Fields available within the reminder form, in tab order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum ReminderField {
    #[default]
    Title,
    Description,
    Date,
    Time,
    Repeat,
}

impl ReminderField {
    const ORDER: [ReminderField; 5] = [
        ReminderField::Title,
        ReminderField::Description,
        ReminderField::Date,
        ReminderField::Time,
        ReminderField::Repeat,
    ];

    fn offset(self, by: isize) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0) as isize;
        let len = Self::ORDER.len() as isize;
        Self::ORDER[(idx + by).rem_euclid(len) as usize]
    }

    fn label(self) -> &'static str {
        match self {
            ReminderField::Title => "Title",
            ReminderField::Description => "Description",
            ReminderField::Date => "Date",
            ReminderField::Time => "Time",
            ReminderField::Repeat => "Repeat",
        }
    }
}

/// Internal representation of the add/edit form. Date and time are kept as
/// text while typing and only parsed on save.
#[derive(Default, Clone, Debug)]
pub(crate) struct ReminderForm {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) date: String,
    pub(crate) time: String,
    pub(crate) repeat: RepeatInterval,
    pub(crate) active: ReminderField,
    pub(crate) error: Option<String>,
    /// Set while the write is in flight; input is ignored until it resolves.
    pub(crate) saving: bool,
}

impl ReminderForm {
    /// Blank form with the date and time preset to `now`.
    pub(crate) fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            date: now.date().format(DATE_FORMAT).to_string(),
            time: now.time().format(TIME_FORMAT).to_string(),
            ..Self::default()
        }
    }

    /// Populate the form from an existing reminder, showing its instant in `tz`.
    pub(crate) fn from_reminder<Tz: TimeZone>(reminder: &Reminder, tz: &Tz) -> Self {
        let local = reminder.scheduled_at.with_timezone(tz).naive_local();
        Self {
            title: reminder.title.clone(),
            description: reminder.description.clone(),
            repeat: reminder.repeat,
            ..Self::starting_at(local)
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.active = self.active.offset(1);
    }

    pub(crate) fn previous_field(&mut self) {
        self.active = self.active.offset(-1);
    }

    /// Left/right on the repeat row cycles through the fixed options.
    pub(crate) fn cycle_repeat(&mut self, offset: isize) {
        if self.active == ReminderField::Repeat {
            self.repeat = self.repeat.step(offset);
            self.error = None;
        }
    }

    /// Append a character to the active field, validating allowed input.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        let (value, allowed) = match self.active {
            ReminderField::Title => (&mut self.title, !ch.is_control()),
            ReminderField::Description => (&mut self.description, !ch.is_control()),
            ReminderField::Date => (&mut self.date, ch.is_ascii_digit() || ch == '-'),
            ReminderField::Time => (&mut self.time, ch.is_ascii_digit() || ch == ':'),
            ReminderField::Repeat => return false,
        };
        if allowed {
            value.push(ch);
        }
        allowed
    }

    pub(crate) fn backspace(&mut self) {
        if let Some(value) = self.text_mut(self.active) {
            value.pop();
        }
    }

    /// Validate the inputs and return fields ready for the store. Blank text
    /// is rejected, but title and description are stored as typed.
    pub(crate) fn parse_inputs<Tz: TimeZone>(&self, tz: &Tz) -> Result<ReminderFields, FormError> {
        if self.title.trim().is_empty() {
            return Err(FormError::TitleEmpty);
        }
        if self.description.trim().is_empty() {
            return Err(FormError::DescriptionEmpty);
        }
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .map_err(|_| FormError::InvalidDate)?;
        let time = NaiveTime::parse_from_str(self.time.trim(), TIME_FORMAT)
            .map_err(|_| FormError::InvalidTime)?;

        Ok(ReminderFields::at_local(
            self.title.clone(),
            self.description.clone(),
            tz,
            date,
            time,
            self.repeat,
        ))
    }

    /// Render a single line for the form widget.
    pub(crate) fn build_line(&self, field: ReminderField) -> Line<'static> {
        let is_active = self.active == field;
        let value = match field {
            ReminderField::Repeat => format!("< {} >", self.repeat.label()),
            other => self.text(other).to_string(),
        };
        let display = if value.is_empty() {
            "<required>".to_string()
        } else {
            value
        };

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if self.text(field).is_empty() && field != ReminderField::Repeat {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        Line::from(vec![
            Span::raw(format!("{}: ", field.label())),
            Span::styled(display, style),
        ])
    }

    /// Column offset for the cursor on the active row, or `None` on the
    /// repeat row which has no text cursor.
    pub(crate) fn cursor(&self) -> Option<(u16, u16)> {
        let row = ReminderField::ORDER.iter().position(|f| *f == self.active)? as u16;
        let text = self.text_ref(self.active)?;
        let column = self.active.label().len() + 2 + text.chars().count();
        Some((column as u16, row))
    }

    fn text(&self, field: ReminderField) -> &str {
        self.text_ref(field).map(String::as_str).unwrap_or("")
    }

    fn text_ref(&self, field: ReminderField) -> Option<&String> {
        match field {
            ReminderField::Title => Some(&self.title),
            ReminderField::Description => Some(&self.description),
            ReminderField::Date => Some(&self.date),
            ReminderField::Time => Some(&self.time),
            ReminderField::Repeat => None,
        }
    }

    fn text_mut(&mut self, field: ReminderField) -> Option<&mut String> {
        match field {
            ReminderField::Title => Some(&mut self.title),
            ReminderField::Description => Some(&mut self.description),
            ReminderField::Date => Some(&mut self.date),
            ReminderField::Time => Some(&mut self.time),
            ReminderField::Repeat => None,
        }
    }
}

/// Pending delete confirmation. Holds the row as it was when the user asked;
/// the store re-resolves it by id.
#[derive(Clone)]
pub(crate) struct ConfirmDelete {
    pub(crate) reminder: Reminder,
}
