//! Log tail for a detached session

use std::collections::VecDeque;

use ansi_to_tui::IntoText;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Action;
use crate::session::SessionKey;
use crate::tui::styles::Theme;

const MAX_LINES: usize = 5000;

pub struct LogsView {
    pub key: SessionKey,
    lines: VecDeque<Line<'static>>,
    rx: mpsc::UnboundedReceiver<String>,
    /// Lines scrolled up from the bottom; 0 follows new output.
    offset: usize,
    ended: bool,
    task: JoinHandle<()>,
}

impl LogsView {
    /// `task` feeds `rx` and is aborted with the view.
    pub fn new(key: SessionKey, rx: mpsc::UnboundedReceiver<String>, task: JoinHandle<()>) -> Self {
        Self {
            key,
            lines: VecDeque::new(),
            rx,
            offset: 0,
            ended: false,
            task,
        }
    }

    /// Pull whatever has arrived; true when anything changed.
    pub fn drain(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(line) => {
                    self.push(&line);
                    changed = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if !self.ended {
                        self.ended = true;
                        changed = true;
                    }
                    break;
                }
            }
        }
        changed
    }

    fn push(&mut self, raw: &str) {
        let line = match raw.as_bytes().into_text() {
            Ok(text) => text
                .lines
                .into_iter()
                .next()
                .unwrap_or_else(|| Line::from("")),
            Err(_) => Line::from(raw.to_string()),
        };
        self.lines.push_back(line);
        if self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Some(Action::ShowDetail(self.key.clone())),
            KeyCode::Char('k') | KeyCode::Up => {
                self.offset = (self.offset + 1).min(self.lines.len().saturating_sub(1));
                None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.offset = self.offset.saturating_sub(1);
                None
            }
            KeyCode::PageUp => {
                self.offset = (self.offset + 20).min(self.lines.len().saturating_sub(1));
                None
            }
            KeyCode::PageDown => {
                self.offset = self.offset.saturating_sub(20);
                None
            }
            KeyCode::Char('G') | KeyCode::End => {
                self.offset = 0;
                None
            }
            _ => None,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let height = area.height.saturating_sub(2) as usize;
        let end = self.lines.len().saturating_sub(self.offset);
        let start = end.saturating_sub(height);
        let visible: Vec<Line> = self.lines.range(start..end).cloned().collect();

        let state = if self.ended {
            "ended"
        } else if self.offset == 0 {
            "following"
        } else {
            "paused"
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(format!(" Logs {} ({}) ", self.key.id, state))
            .title_style(Style::default().fg(theme.title).bold());

        frame.render_widget(Paragraph::new(visible).block(block), area);
    }
}

impl Drop for LogsView {
    fn drop(&mut self) {
        self.task.abort();
    }
}
