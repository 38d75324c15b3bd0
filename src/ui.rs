//! Ratatui front-end: a reminder list, an add/edit form and a delete
//! confirmation. All store writes run in the background; the list itself only
//! changes when the store's change stream says so.

mod app;
mod forms;
mod helpers;
mod terminal;

pub use app::App;
pub use terminal::run_app;
