//! Yes/No confirmation for destructive session actions

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use super::DialogResult;
use crate::session::SessionKey;
use crate::tui::styles::Theme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Remove(SessionKey),
    Stop(SessionKey),
    Clean,
}

pub struct ConfirmDialog {
    title: String,
    message: String,
    action: ConfirmAction,
    selected: bool, // true = Yes
}

impl ConfirmDialog {
    pub fn new(title: &str, message: impl Into<String>, action: ConfirmAction) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            action,
            selected: false,
        }
    }

    pub fn action(&self) -> &ConfirmAction {
        &self.action
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogResult<ConfirmAction> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => DialogResult::Cancel,
            KeyCode::Enter if self.selected => DialogResult::Submit(self.action.clone()),
            KeyCode::Enter => DialogResult::Cancel,
            KeyCode::Char('y') | KeyCode::Char('Y') => DialogResult::Submit(self.action.clone()),
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected = true;
                DialogResult::Continue
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected = false;
                DialogResult::Continue
            }
            KeyCode::Tab => {
                self.selected = !self.selected;
                DialogResult::Continue
            }
            _ => DialogResult::Continue,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let dialog_area = super::centered_rect(area, 50, 8);
        frame.render_widget(Clear, dialog_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.error))
            .style(Style::default().bg(theme.background))
            .title(format!(" {} ", self.title))
            .title_style(Style::default().fg(theme.error).bold());

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(inner);

        frame.render_widget(
            Paragraph::new(self.message.as_str())
                .style(Style::default().fg(theme.text))
                .wrap(Wrap { trim: true }),
            chunks[0],
        );

        let yes_style = if self.selected {
            Style::default().fg(theme.error).bold()
        } else {
            Style::default().fg(theme.dimmed)
        };
        let no_style = if self.selected {
            Style::default().fg(theme.dimmed)
        } else {
            Style::default().fg(theme.running).bold()
        };

        let buttons = Line::from(vec![
            Span::styled("[Yes]", yes_style),
            Span::raw("    "),
            Span::styled("[No]", no_style),
        ]);
        frame.render_widget(
            Paragraph::new(buttons).alignment(Alignment::Center),
            chunks[1],
        );
    }
}
