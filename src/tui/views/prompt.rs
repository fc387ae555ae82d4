//! New-session prompt

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::*;

use super::Action;
use crate::agents::{Agent, AGENTS};
use crate::engine::StartRequest;
use crate::session::{EngineConfig, ProviderKind, RunMode};
use crate::tui::components::TextField;
use crate::tui::styles::Theme;

const MODES: [RunMode; 3] = [RunMode::Interactive, RunMode::Plan, RunMode::Async];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Prompt,
    Agent,
    Model,
    Mode,
    Provider,
    Mount,
}

const FOCUS_ORDER: [Focus; 6] = [
    Focus::Prompt,
    Focus::Agent,
    Focus::Model,
    Focus::Mode,
    Focus::Provider,
    Focus::Mount,
];

pub struct PromptView {
    prompt: TextField,
    model: TextField,
    agent: Agent,
    mode: RunMode,
    provider: ProviderKind,
    /// Mount the current directory instead of cloning.
    mount: bool,
    focus: Focus,
    /// Step label of the workflow in progress.
    pub running: Option<String>,
    pub notice: Option<String>,
}

impl PromptView {
    pub fn new(config: &EngineConfig, notice: Option<String>) -> Self {
        Self {
            prompt: TextField::new("Prompt:  ").with_placeholder("what should the agent do?"),
            model: TextField::new("Model:   ").with_value(config.model.clone()),
            agent: config.agent,
            mode: RunMode::default(),
            provider: config.provider(),
            mount: false,
            focus: Focus::Prompt,
            running: None,
            notice,
        }
    }

    /// Prefilled from a request the workflow is about to run again.
    pub fn from_request(config: &EngineConfig, req: &StartRequest) -> Self {
        let mut view = Self::new(config, None);
        view.prompt = view.prompt.with_value(req.prompt.clone());
        if let Some(agent) = req.agent {
            view.agent = agent;
        }
        if let Some(model) = &req.model {
            view.model = TextField::new("Model:   ").with_value(model.clone());
        }
        view.mode = req.mode;
        if let Some(provider) = req.provider {
            view.provider = provider;
        }
        view.mount = req.mount_dir.is_some();
        view
    }

    pub fn request(&self, cwd: &str) -> StartRequest {
        StartRequest {
            prompt: self.prompt.value().trim().to_string(),
            agent: Some(self.agent),
            model: self.model.non_empty(),
            mode: self.mode,
            mount_dir: self.mount.then(|| cwd.to_string()),
            provider: Some(self.provider),
            extra_args: Vec::new(),
        }
    }

    fn step_focus(&mut self, forward: bool) {
        let i = FOCUS_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        let n = FOCUS_ORDER.len();
        self.focus = FOCUS_ORDER[if forward { (i + 1) % n } else { (i + n - 1) % n }];
    }

    fn cycle(&mut self, forward: bool) {
        match self.focus {
            Focus::Agent => {
                let i = AGENTS.iter().position(|d| d.agent == self.agent).unwrap_or(0);
                let n = AGENTS.len();
                let next = AGENTS[if forward { (i + 1) % n } else { (i + n - 1) % n }].agent;
                // Keep a custom model, swap a default one.
                if self.model.value() == self.agent.default_model() || self.model.value().is_empty() {
                    self.model = TextField::new("Model:   ").with_value(next.default_model());
                }
                self.agent = next;
            }
            Focus::Mode => {
                let i = MODES.iter().position(|m| *m == self.mode).unwrap_or(0);
                let n = MODES.len();
                self.mode = MODES[if forward { (i + 1) % n } else { (i + n - 1) % n }];
            }
            Focus::Provider => self.provider = self.provider.other(),
            Focus::Mount => self.mount = !self.mount,
            Focus::Prompt | Focus::Model => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, cwd: &str) -> Option<Action> {
        if self.running.is_some() {
            return match key.code {
                KeyCode::Esc => Some(Action::ShowList),
                _ => None,
            };
        }

        match key.code {
            KeyCode::Esc => Some(Action::ShowList),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Enter => {
                self.notice = None;
                Some(Action::Start(self.request(cwd)))
            }
            KeyCode::Tab | KeyCode::Down => {
                self.step_focus(true);
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.step_focus(false);
                None
            }
            KeyCode::Left | KeyCode::Right
                if !matches!(self.focus, Focus::Prompt | Focus::Model) =>
            {
                self.cycle(key.code == KeyCode::Right);
                None
            }
            KeyCode::Char(' ') if self.focus == Focus::Mount => {
                self.mount = !self.mount;
                None
            }
            _ => {
                match self.focus {
                    Focus::Prompt => self.prompt.handle_key(key),
                    Focus::Model => self.model.handle_key(key),
                    _ => {}
                }
                None
            }
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(" New session ")
            .title_style(Style::default().fg(theme.title).bold());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(inner);

        self.prompt
            .render(frame, rows[0], self.focus == Focus::Prompt, theme);
        self.choice(frame, rows[1], "Agent:   ", self.agent.as_str(), Focus::Agent, theme);
        self.model
            .render(frame, rows[2], self.focus == Focus::Model, theme);
        self.choice(frame, rows[3], "Mode:    ", self.mode.as_str(), Focus::Mode, theme);
        self.choice(
            frame,
            rows[4],
            "Where:   ",
            self.provider.as_str(),
            Focus::Provider,
            theme,
        );
        self.choice(
            frame,
            rows[5],
            "Mount:   ",
            if self.mount { "current directory" } else { "clone repository" },
            Focus::Mount,
            theme,
        );

        let status = match (&self.running, &self.notice) {
            (Some(step), _) => Line::from(Span::styled(
                format!("⟳ {}...", step),
                Style::default().fg(theme.waiting),
            )),
            (None, Some(notice)) => Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(theme.error),
            )),
            (None, None) => Line::from(""),
        };
        frame.render_widget(Paragraph::new(status).wrap(Wrap { trim: true }), rows[7]);

        frame.render_widget(
            Paragraph::new("Tab next field · ←/→ change · Enter start · Esc back")
                .style(Style::default().fg(theme.hint)),
            rows[8],
        );
    }

    fn choice(
        &self,
        frame: &mut Frame,
        area: Rect,
        label: &'static str,
        value: &str,
        focus: Focus,
        theme: &Theme,
    ) {
        let focused = self.focus == focus;
        let label_style = if focused {
            Style::default().fg(theme.accent).underlined()
        } else {
            Style::default().fg(theme.text)
        };
        let value_style = if focused {
            Style::default().fg(theme.background).bg(theme.accent)
        } else {
            Style::default().fg(theme.text)
        };
        let line = Line::from(vec![
            Span::styled(label, label_style),
            Span::raw(" "),
            Span::styled(format!("‹ {} ›", value), value_style),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}
