//! Arbitrage dashboard: agent configuration form, lifecycle state and controls.

use crate::{
    app::{App, ScreenAction},
    lifecycle::BotLifecycleState,
    screens::Screen,
    tokens::{Token, TokenRegistry},
};
use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    InputToken,
    TargetToken,
    Allowance,
    Slippage,
}

impl FormField {
    fn next(self) -> Self {
        match self {
            FormField::InputToken => FormField::TargetToken,
            FormField::TargetToken => FormField::Allowance,
            FormField::Allowance => FormField::Slippage,
            FormField::Slippage => FormField::InputToken,
        }
    }
}

pub struct DashboardScreen {
    pub focus: FormField,
    pub input_index: usize,
    pub target_index: usize,
    /// Display units, as typed
    pub allowance: String,
    /// Percent, as typed
    pub slippage: String,
}

impl DashboardScreen {
    pub fn new(registry: &TokenRegistry, default_slippage: &str) -> Self {
        let count = registry.tokens().len().max(1);
        Self {
            focus: FormField::Allowance,
            input_index: 0,
            target_index: 1 % count,
            allowance: String::new(),
            slippage: default_slippage.to_string(),
        }
    }

    pub fn input_token(&self, registry: &TokenRegistry) -> Token {
        token_at(registry, self.input_index)
    }

    pub fn target_token(&self, registry: &TokenRegistry) -> Token {
        token_at(registry, self.target_index)
    }

    pub fn handle_key(&mut self, key: KeyCode, registry: &TokenRegistry) -> ScreenAction {
        let count = registry.tokens().len();
        match key {
            KeyCode::Tab | KeyCode::Down => self.focus = self.focus.next(),
            KeyCode::Left | KeyCode::Right if count > 0 => {
                let forward = key == KeyCode::Right;
                match self.focus {
                    FormField::InputToken => self.input_index = cycle(self.input_index, count, forward),
                    FormField::TargetToken => {
                        self.target_index = cycle(self.target_index, count, forward)
                    }
                    _ => {}
                }
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                if let Some(field) = self.text_field() {
                    field.push(c);
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = self.text_field() {
                    field.pop();
                }
            }
            KeyCode::Char('s') | KeyCode::Enter => return ScreenAction::Start,
            KeyCode::Char('x') => return ScreenAction::Stop,
            KeyCode::Char('d') => return ScreenAction::OpenDetails,
            _ => {}
        }
        ScreenAction::None
    }

    fn text_field(&mut self) -> Option<&mut String> {
        match self.focus {
            FormField::Allowance => Some(&mut self.allowance),
            FormField::Slippage => Some(&mut self.slippage),
            _ => None,
        }
    }

    fn field_line<'a>(&self, field: FormField, label: &'a str, value: String) -> Line<'a> {
        let focused = self.focus == field;
        let marker = if focused { "▸ " } else { "  " };
        let value_style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Cyan)),
            Span::styled(label, Style::default().fg(Color::DarkGray)),
            Span::styled(value, value_style),
        ])
    }
}

fn token_at(registry: &TokenRegistry, index: usize) -> Token {
    registry
        .tokens()
        .get(index)
        .cloned()
        .unwrap_or_else(|| Token::unknown(""))
}

fn cycle(index: usize, count: usize, forward: bool) -> usize {
    if forward {
        (index + 1) % count
    } else {
        (index + count - 1) % count
    }
}

fn state_style(state: BotLifecycleState) -> Style {
    let color = match state {
        BotLifecycleState::Running => Color::Green,
        BotLifecycleState::Idle => Color::DarkGray,
        _ => Color::Yellow,
    };
    Style::default().fg(color)
}

impl Screen for DashboardScreen {
    fn render(&self, frame: &mut Frame, area: Rect, app: &App) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Length(5), // Agent status
                Constraint::Length(6), // Configuration form
                Constraint::Min(3),    // Messages
                Constraint::Length(2), // Footer
            ])
            .split(area);

        let state = app.state();
        let wallet = app
            .identity
            .short_address()
            .unwrap_or_else(|| "not connected".to_string());

        // Title bar
        let title = Paragraph::new(Line::from(vec![
            Span::styled(" DELTAFI ", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled("│ ", Style::default().fg(Color::DarkGray)),
            Span::styled("Arbitrage Agent", Style::default().fg(Color::LightBlue)),
            Span::styled(" │ ", Style::default().fg(Color::DarkGray)),
            Span::styled(wallet, Style::default().fg(Color::Cyan)),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)));
        frame.render_widget(title, chunks[0]);

        // Agent status card
        let profit_symbol = app
            .snapshot
            .as_ref()
            .map(|s| s.input_token.symbol.clone())
            .unwrap_or_else(|| self.input_token(app.parser.registry()).symbol);
        let status_lines = vec![
            Line::from(vec![
                Span::styled("  State   ", Style::default().fg(Color::DarkGray)),
                Span::styled(format!("● {}", state), state_style(state)),
            ]),
            Line::from(vec![
                Span::styled("  Profit  ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("{} {}", app.profit_display, profit_symbol),
                    Style::default().fg(Color::Green),
                ),
            ]),
            Line::from(vec![
                Span::styled("  Agent   ", Style::default().fg(Color::DarkGray)),
                Span::styled(app.lifecycle.agent_process_id(), Style::default().fg(Color::White)),
            ]),
        ];
        let status = Paragraph::new(status_lines)
            .block(Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(" Agent ", Style::default().fg(Color::White))));
        frame.render_widget(status, chunks[1]);

        // Configuration form
        let registry = app.parser.registry();
        let cursor = |field: FormField, text: &str| {
            if self.focus == field {
                format!("{}│", text)
            } else if text.is_empty() {
                "-".to_string()
            } else {
                text.to_string()
            }
        };
        let form_lines = vec![
            self.field_line(
                FormField::InputToken,
                "Input token   ",
                format!("◂ {} ▸", self.input_token(registry).symbol),
            ),
            self.field_line(
                FormField::TargetToken,
                "Target token  ",
                format!("◂ {} ▸", self.target_token(registry).symbol),
            ),
            self.field_line(
                FormField::Allowance,
                "Max allowance ",
                cursor(FormField::Allowance, &self.allowance),
            ),
            self.field_line(
                FormField::Slippage,
                "Slippage %    ",
                cursor(FormField::Slippage, &self.slippage),
            ),
        ];
        let form = Paragraph::new(form_lines)
            .block(Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(" Configuration ", Style::default().fg(Color::White))));
        frame.render_widget(form, chunks[2]);

        // Messages
        let mut message_lines = vec![];
        if let Some(pending) = app.lifecycle.pending() {
            message_lines.push(Line::from(Span::styled(
                format!("  ⏳ {} in progress...", pending),
                Style::default().fg(Color::Yellow),
            )));
        }
        if let Some(msg) = &app.status_message {
            message_lines.push(Line::from(Span::styled(
                format!("  {}", msg),
                Style::default().fg(Color::White),
            )));
        }
        if let Some(err) = &app.error_message {
            message_lines.push(Line::from(vec![
                Span::styled("  ✗ ", Style::default().fg(Color::Red)),
                Span::styled(err.as_str(), Style::default().fg(Color::Red)),
            ]));
        }
        let messages = Paragraph::new(message_lines)
            .block(Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(" Activity ", Style::default().fg(Color::White))));
        frame.render_widget(messages, chunks[3]);

        // Footer
        let footer = Paragraph::new(Line::from(vec![
            Span::styled("[Tab] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Field", Style::default().fg(Color::DarkGray)),
            Span::styled("  [◂/▸] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Token", Style::default().fg(Color::DarkGray)),
            Span::styled("  [S] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Start", Style::default().fg(Color::DarkGray)),
            Span::styled("  [X] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Stop", Style::default().fg(Color::DarkGray)),
            Span::styled("  [D] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Details", Style::default().fg(Color::DarkGray)),
            Span::styled("  [Q] ", Style::default().fg(Color::DarkGray)),
            Span::styled("Quit", Style::default().fg(Color::DarkGray)),
        ]))
        .alignment(Alignment::Center);
        frame.render_widget(footer, chunks[4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_and_token_cycling() {
        let registry = TokenRegistry::builtin();
        let mut screen = DashboardScreen::new(&registry, "0.3");
        assert_ne!(screen.input_token(&registry), screen.target_token(&registry));

        for c in ['1', '.', '5'] {
            screen.handle_key(KeyCode::Char(c), &registry);
        }
        assert_eq!(screen.allowance, "1.5");
        screen.handle_key(KeyCode::Backspace, &registry);
        assert_eq!(screen.allowance, "1.");

        screen.focus = FormField::TargetToken;
        screen.handle_key(KeyCode::Right, &registry);
        assert_eq!(screen.input_token(&registry), screen.target_token(&registry));
    }

    #[test]
    fn command_keys_map_to_actions() {
        let registry = TokenRegistry::builtin();
        let mut screen = DashboardScreen::new(&registry, "0.3");
        assert_eq!(screen.handle_key(KeyCode::Char('s'), &registry), ScreenAction::Start);
        assert_eq!(screen.handle_key(KeyCode::Char('x'), &registry), ScreenAction::Stop);
        assert_eq!(screen.handle_key(KeyCode::Char('d'), &registry), ScreenAction::OpenDetails);
        assert_eq!(screen.handle_key(KeyCode::Tab, &registry), ScreenAction::None);
        assert_eq!(screen.focus, FormField::Slippage);
    }
}
