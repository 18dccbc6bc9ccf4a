//! Details dialog showing the revealed agent transcript.

use crate::{
    app::{App, ScreenAction},
    reveal::RevealState,
    screens::Screen,
};
use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

pub struct DetailsDialog;

impl DetailsDialog {
    pub fn handle_key(&self, key: KeyCode) -> ScreenAction {
        match key {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('d') => ScreenAction::CloseDetails,
            _ => ScreenAction::None,
        }
    }
}

/// Centered rectangle taking the given percentages of `area`.
fn centered(area: Rect, width_pct: u16, height_pct: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - height_pct) / 2),
            Constraint::Percentage(height_pct),
            Constraint::Percentage((100 - height_pct) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_pct) / 2),
            Constraint::Percentage(width_pct),
            Constraint::Percentage((100 - width_pct) / 2),
        ])
        .split(vertical[1])[1]
}

impl Screen for DetailsDialog {
    fn render(&self, frame: &mut Frame, area: Rect, app: &App) {
        let popup = centered(area, 70, 70);
        frame.render_widget(Clear, popup);

        let view = app.reveal_view();
        let mut lines: Vec<Line> = view
            .lines
            .iter()
            .map(|l| Line::from(Span::styled(format!(" > {}", l), Style::default().fg(Color::Green))))
            .collect();

        match view.state {
            RevealState::Revealing(_) => lines.push(Line::from(Span::styled(
                " ▌",
                Style::default().fg(Color::Green).add_modifier(Modifier::SLOW_BLINK),
            ))),
            RevealState::Done if view.lines.is_empty() => lines.push(Line::from(Span::styled(
                " No data from the agent yet",
                Style::default().fg(Color::DarkGray),
            ))),
            _ => {}
        }

        let body = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightBlue))
                .title(Span::styled(
                    " Arbitrage Agent Details ",
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ))
                .title_bottom(Line::from(Span::styled(
                    " [Esc] Close ",
                    Style::default().fg(Color::DarkGray),
                )).alignment(Alignment::Center)));
        frame.render_widget(body, popup);
    }
}
