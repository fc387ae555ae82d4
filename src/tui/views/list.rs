//! Session list

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use super::Action;
use crate::cli::{format_age, truncate};
use crate::engine::HandoffResult;
use crate::session::Session;
use crate::tui::dialogs::ConfirmAction;
use crate::tui::styles::Theme;

#[derive(Debug, Default)]
pub struct ListView {
    cursor: usize,
    /// Last listing error, shown until the next successful poll.
    pub error: Option<String>,
}

impl ListView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected<'a>(&self, sessions: &'a [Session]) -> Option<&'a Session> {
        sessions.get(self.cursor.min(sessions.len().saturating_sub(1)))
    }

    pub fn handle_key(&mut self, key: KeyEvent, sessions: &[Session]) -> Option<Action> {
        let len = sessions.len();
        match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ToggleHelp),
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.cursor = (self.cursor + 1).min(len - 1);
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.cursor = self.cursor.saturating_sub(1);
                None
            }
            KeyCode::Char('g') => {
                self.cursor = 0;
                None
            }
            KeyCode::Char('G') => {
                self.cursor = len.saturating_sub(1);
                None
            }
            KeyCode::Char('n') => Some(Action::ShowPrompt),
            KeyCode::Char('S') => Some(Action::NewShell),
            KeyCode::Char('r') => Some(Action::Refresh),
            KeyCode::Char('c') => Some(Action::Confirm(ConfirmAction::Clean)),
            KeyCode::Enter => self.selected(sessions).map(|s| Action::ShowDetail(s.key())),
            KeyCode::Char('a') => self
                .selected(sessions)
                .map(|s| Action::Handoff(HandoffResult::AttachSession(s.key()))),
            KeyCode::Char('s') => self
                .selected(sessions)
                .map(|s| Action::Handoff(HandoffResult::ExecShell(s.key()))),
            KeyCode::Char('d') => self
                .selected(sessions)
                .map(|s| Action::Confirm(ConfirmAction::Remove(s.key()))),
            _ => None,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, sessions: &[Session], theme: &Theme) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        let header = Row::new(["NAME", "STATUS", "AGENT", "WHERE", "REPO", "AGE"])
            .style(Style::default().fg(theme.dimmed).bold());

        let selected = self.cursor.min(sessions.len().saturating_sub(1));
        let rows: Vec<Row> = sessions
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let style = if i == selected {
                    Style::default().bg(theme.selection)
                } else {
                    Style::default()
                };
                Row::new([
                    Cell::from(truncate(&s.name, 40)).style(Style::default().fg(theme.text)),
                    Cell::from(s.status.label()).style(theme.status_style(&s.status)),
                    Cell::from(s.agent.as_str()).style(Style::default().fg(theme.text)),
                    Cell::from(s.provider.as_str()).style(Style::default().fg(theme.dimmed)),
                    Cell::from(truncate(&s.repo, 30)).style(Style::default().fg(theme.dimmed)),
                    Cell::from(format_age(s.created)).style(Style::default().fg(theme.dimmed)),
                ])
                .style(style)
            })
            .collect();

        let title = match &self.error {
            Some(e) => format!(" Sessions ({}) · {} ", sessions.len(), truncate(e, 60)),
            None => format!(" Sessions ({}) ", sessions.len()),
        };
        let title_color = if self.error.is_some() {
            theme.error
        } else {
            theme.title
        };

        let table = Table::new(
            rows,
            [
                Constraint::Min(20),
                Constraint::Length(12),
                Constraint::Length(9),
                Constraint::Length(6),
                Constraint::Min(16),
                Constraint::Length(6),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(title)
                .title_style(Style::default().fg(title_color).bold()),
        );
        frame.render_widget(table, chunks[0]);

        if sessions.is_empty() {
            let inner = chunks[0].inner(Margin::new(2, 2));
            frame.render_widget(
                Paragraph::new("No sessions. Press n to start one.")
                    .style(Style::default().fg(theme.dimmed)),
                inner,
            );
        }

        frame.render_widget(
            Paragraph::new(
                "Enter detail · n new · a attach · s shell · S scratch shell · d delete · c clean · r refresh · ? help · q quit",
            )
            .style(Style::default().fg(theme.hint)),
            chunks[1],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProviderKind;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn sessions() -> Vec<Session> {
        ["a", "b", "c"]
            .iter()
            .map(|id| Session::new(*id, *id, ProviderKind::Local))
            .collect()
    }

    #[test]
    fn test_cursor_is_clamped() {
        let list = sessions();
        let mut view = ListView::new();
        for _ in 0..5 {
            view.handle_key(key(KeyCode::Down), &list);
        }
        assert_eq!(view.selected(&list).map(|s| s.id.as_str()), Some("c"));
        view.handle_key(key(KeyCode::Char('g')), &list);
        assert_eq!(view.selected(&list).map(|s| s.id.as_str()), Some("a"));
    }

    #[test]
    fn test_cursor_survives_shrinking_list() {
        let list = sessions();
        let mut view = ListView::new();
        view.handle_key(key(KeyCode::Char('G')), &list);
        let shorter = &list[..1];
        assert_eq!(view.selected(shorter).map(|s| s.id.as_str()), Some("a"));
    }

    #[test]
    fn test_actions_target_selected_session() {
        let list = sessions();
        let mut view = ListView::new();
        view.handle_key(key(KeyCode::Down), &list);

        match view.handle_key(key(KeyCode::Char('d')), &list) {
            Some(Action::Confirm(ConfirmAction::Remove(k))) => assert_eq!(k.id, "b"),
            other => panic!("unexpected {:?}", other),
        }
        match view.handle_key(key(KeyCode::Char('a')), &list) {
            Some(Action::Handoff(HandoffResult::AttachSession(k))) => assert_eq!(k.id, "b"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_list_has_no_target() {
        let mut view = ListView::new();
        assert!(view.handle_key(key(KeyCode::Enter), &[]).is_none());
        assert!(matches!(
            view.handle_key(key(KeyCode::Char('n')), &[]),
            Some(Action::ShowPrompt)
        ));
    }
}
