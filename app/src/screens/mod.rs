//! Screen modules for the TUI.

pub mod dashboard;
pub mod details;

use crate::App;
use ratatui::{layout::Rect, Frame};

/// Trait for TUI screens.
pub trait Screen {
    fn render(&self, frame: &mut Frame, area: Rect, app: &App);
}
