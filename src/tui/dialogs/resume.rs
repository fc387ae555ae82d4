//! Resume dialog: pick how to continue an earlier session

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use super::DialogResult;
use crate::engine::ResumeRequest;
use crate::provider::ResumeMode;
use crate::session::Session;
use crate::tui::components::TextField;
use crate::tui::styles::Theme;

const MODES: [ResumeMode; 3] = [
    ResumeMode::Interactive,
    ResumeMode::Detached,
    ResumeMode::Shell,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Mode,
    Prompt,
    Model,
}

pub struct ResumeDialog {
    session: Session,
    mode: usize,
    prompt: TextField,
    model: TextField,
    focus: Focus,
}

impl ResumeDialog {
    pub fn new(session: Session) -> Self {
        let model = TextField::new("Model: ").with_value(session.model.clone());
        Self {
            session,
            mode: 0,
            prompt: TextField::new("Prompt:").with_placeholder("(detached only)"),
            model,
            focus: Focus::Mode,
        }
    }

    fn mode(&self) -> ResumeMode {
        MODES[self.mode]
    }

    fn request(&self) -> ResumeRequest {
        let model = self
            .model
            .non_empty()
            .filter(|m| *m != self.session.model);
        ResumeRequest {
            key: self.session.key(),
            mode: self.mode(),
            prompt: self.prompt.non_empty(),
            model,
            extra_args: Vec::new(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogResult<ResumeRequest> {
        match key.code {
            KeyCode::Esc => DialogResult::Cancel,
            KeyCode::Enter => {
                if self.mode() == ResumeMode::Detached && self.prompt.non_empty().is_none() {
                    self.focus = Focus::Prompt;
                    return DialogResult::Continue;
                }
                DialogResult::Submit(self.request())
            }
            KeyCode::Tab | KeyCode::Down => {
                self.focus = match self.focus {
                    Focus::Mode => Focus::Prompt,
                    Focus::Prompt => Focus::Model,
                    Focus::Model => Focus::Mode,
                };
                DialogResult::Continue
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = match self.focus {
                    Focus::Mode => Focus::Model,
                    Focus::Prompt => Focus::Mode,
                    Focus::Model => Focus::Prompt,
                };
                DialogResult::Continue
            }
            KeyCode::Left | KeyCode::Right if self.focus == Focus::Mode => {
                self.mode = if key.code == KeyCode::Left {
                    (self.mode + MODES.len() - 1) % MODES.len()
                } else {
                    (self.mode + 1) % MODES.len()
                };
                DialogResult::Continue
            }
            _ => {
                match self.focus {
                    Focus::Prompt => self.prompt.handle_key(key),
                    Focus::Model => self.model.handle_key(key),
                    Focus::Mode => {}
                }
                DialogResult::Continue
            }
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let dialog_area = super::centered_rect(area, 60, 9);
        frame.render_widget(Clear, dialog_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.accent))
            .style(Style::default().bg(theme.background))
            .title(format!(" Resume {} ", self.session.name))
            .title_style(Style::default().fg(theme.title).bold());
        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
            ])
            .split(inner);

        let mut spans = vec![Span::styled(
            "Mode:   ",
            if self.focus == Focus::Mode {
                Style::default().fg(theme.accent).underlined()
            } else {
                Style::default().fg(theme.text)
            },
        )];
        for (i, mode) in MODES.iter().enumerate() {
            let style = if i == self.mode {
                Style::default().fg(theme.background).bg(theme.accent)
            } else {
                Style::default().fg(theme.dimmed)
            };
            spans.push(Span::styled(format!(" {} ", mode.as_str()), style));
            spans.push(Span::raw(" "));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), rows[0]);

        self.prompt
            .render(frame, rows[1], self.focus == Focus::Prompt, theme);
        self.model
            .render(frame, rows[2], self.focus == Focus::Model, theme);
        frame.render_widget(
            Paragraph::new("←/→ mode · Tab next field · Enter resume · Esc cancel")
                .style(Style::default().fg(theme.hint)),
            rows[3],
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

    fn session() -> Session {
        let mut s = Session::new("abc", "fix-bug", ProviderKind::Local);
        s.model = "sonnet".to_string();
        s
    }

    #[test]
    fn test_default_submit_is_interactive_without_overrides() {
        let mut d = ResumeDialog::new(session());
        match d.handle_key(key(KeyCode::Enter)) {
            DialogResult::Submit(req) => {
                assert_eq!(req.mode, ResumeMode::Interactive);
                assert_eq!(req.key.id, "abc");
                assert!(req.prompt.is_none());
                assert!(req.model.is_none());
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_detached_requires_prompt() {
        let mut d = ResumeDialog::new(session());
        d.handle_key(key(KeyCode::Right));
        assert!(matches!(d.handle_key(key(KeyCode::Enter)), DialogResult::Continue));
        assert_eq!(d.focus, Focus::Prompt);

        for c in "go on".chars() {
            d.handle_key(key(KeyCode::Char(c)));
        }
        match d.handle_key(key(KeyCode::Enter)) {
            DialogResult::Submit(req) => {
                assert_eq!(req.mode, ResumeMode::Detached);
                assert_eq!(req.prompt.as_deref(), Some("go on"));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_mode_wraps_left() {
        let mut d = ResumeDialog::new(session());
        d.handle_key(key(KeyCode::Left));
        assert_eq!(d.mode(), ResumeMode::Shell);
    }
}
