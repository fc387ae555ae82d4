//! Single-session detail: fields, PR, live resource usage

use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use super::Action;
use crate::collab::PrInfo;
use crate::engine::HandoffResult;
use crate::provider::SessionStats;
use crate::session::{Session, SessionKey};
use crate::tui::dialogs::ConfirmAction;
use crate::tui::styles::Theme;

pub struct DetailView {
    pub key: SessionKey,
    pub session: Option<Session>,
    pub pr: Option<PrInfo>,
    pub stats: Option<SessionStats>,
    /// Last detail poll error.
    pub error: Option<String>,
    /// Set when the provider reported the session gone.
    pub gone_at: Option<Instant>,
}

impl DetailView {
    pub fn new(key: SessionKey, session: Option<Session>) -> Self {
        Self {
            key,
            session,
            pr: None,
            stats: None,
            error: None,
            gone_at: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if self.gone_at.is_some() {
            return match key.code {
                KeyCode::Char('q') => Some(Action::Quit),
                _ => Some(Action::ShowList),
            };
        }

        match key.code {
            KeyCode::Esc | KeyCode::Backspace => Some(Action::ShowList),
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ToggleHelp),
            KeyCode::Char('r') => Some(Action::Refresh),
            KeyCode::Char('a') | KeyCode::Enter => {
                Some(Action::Handoff(HandoffResult::AttachSession(self.key.clone())))
            }
            KeyCode::Char('s') => Some(Action::Handoff(HandoffResult::ExecShell(self.key.clone()))),
            KeyCode::Char('l') => match &self.session {
                Some(s) if s.has_logs() => Some(Action::ShowLogs(self.key.clone())),
                _ => None,
            },
            KeyCode::Char('x') => match &self.session {
                Some(s) if s.status.is_running() => {
                    Some(Action::Confirm(ConfirmAction::Stop(self.key.clone())))
                }
                _ => None,
            },
            KeyCode::Char('d') => Some(Action::Confirm(ConfirmAction::Remove(self.key.clone()))),
            KeyCode::Char('R') => self.session.clone().map(Action::Resume),
            _ => None,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let show_stats = self.stats.is_some();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(8),
                Constraint::Length(if show_stats { 4 } else { 0 }),
                Constraint::Length(1),
            ])
            .split(area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(format!(" {} ", self.title()))
            .title_style(Style::default().fg(theme.title).bold());

        let lines = match (&self.session, self.gone_at) {
            (_, Some(_)) => vec![Line::from(Span::styled(
                "This session no longer exists. Returning to the list...",
                Style::default().fg(theme.error),
            ))],
            (None, None) => vec![Line::from(Span::styled(
                "Loading...",
                Style::default().fg(theme.dimmed),
            ))],
            (Some(s), None) => self.field_lines(s, theme),
        };
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
            chunks[0],
        );

        if let Some(stats) = &self.stats {
            let text = vec![
                Line::from(format!("CPU     {:>6.1}%", stats.cpu_percent)),
                Line::from(format!(
                    "Memory  {:>6.1}%  {}",
                    stats.memory_percent, stats.memory_usage
                )),
            ];
            frame.render_widget(
                Paragraph::new(text)
                    .style(Style::default().fg(theme.text))
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .border_style(Style::default().fg(theme.border))
                            .title(" Resources "),
                    ),
                chunks[1],
            );
        }

        frame.render_widget(
            Paragraph::new("a attach · s shell · l logs · x stop · R resume · d delete · Esc back")
                .style(Style::default().fg(theme.hint)),
            chunks[2],
        );
    }

    fn title(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| self.key.to_string())
    }

    fn field_lines(&self, s: &Session, theme: &Theme) -> Vec<Line<'static>> {
        let field = |name: &str, value: String, style: Style| {
            Line::from(vec![
                Span::styled(format!("{:<12}", name), Style::default().fg(theme.dimmed)),
                Span::styled(value, style),
            ])
        };
        let text = Style::default().fg(theme.text);

        let mut lines = vec![
            field("Status", s.status.label(), theme.status_style(&s.status)),
            field("ID", s.id.clone(), text),
            field("Branch", s.branch.clone(), text),
            field("Agent", format!("{} ({})", s.agent, s.model), text),
            field("Provider", s.provider.to_string(), text),
            field("Repo", s.repo.clone(), text),
            field(
                "Created",
                s.created.format("%Y-%m-%d %H:%M:%S").to_string(),
                text,
            ),
            field(
                "Mode",
                if s.interactive { "interactive" } else { "detached" }.to_string(),
                text,
            ),
        ];
        if let Some(dir) = &s.mount_dir {
            lines.push(field("Mount", dir.clone(), text));
        }
        if let Some(from) = &s.resumed_from {
            lines.push(field("Resumed", format!("from {}", from), text));
        }
        if let Some(region) = &s.region {
            lines.push(field("Region", region.clone(), text));
        }
        if let Some(pr) = &self.pr {
            let draft = if pr.is_draft { " draft" } else { "" };
            lines.push(field(
                "PR",
                format!("#{} {} ({}{})", pr.number, pr.title, pr.state.to_lowercase(), draft),
                Style::default().fg(theme.accent),
            ));
            lines.push(field("", pr.url.clone(), Style::default().fg(theme.dimmed)));
        }
        if !s.prompt.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Prompt",
                Style::default().fg(theme.dimmed),
            )));
            for l in s.prompt.lines() {
                lines.push(Line::from(Span::styled(l.to_string(), text)));
            }
        }
        if let Some(e) = &self.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("Refresh failed: {}", e),
                Style::default().fg(theme.error),
            )));
        }
        lines
    }
}
