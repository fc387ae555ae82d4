//! Transient notifications drawn over the bottom of the screen

use std::time::{Duration, Instant};

use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::tui::styles::Theme;

pub const TOAST_DURATION: Duration = Duration::from_secs(4);
const MAX_VISIBLE: usize = 3;

#[derive(Debug, Clone)]
struct Toast {
    message: String,
    error: bool,
    expires: Instant,
}

#[derive(Debug, Default)]
pub struct Toasts {
    items: Vec<Toast>,
}

impl Toasts {
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message.into(), false, Instant::now());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message.into(), true, Instant::now());
    }

    fn push(&mut self, message: String, error: bool, now: Instant) {
        self.items.push(Toast {
            message,
            error,
            expires: now + TOAST_DURATION,
        });
    }

    /// Drops expired toasts; true when anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.items.len();
        self.items.retain(|t| t.expires > now);
        before != self.items.len()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.items.iter().map(|t| t.message.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let visible: Vec<&Toast> = self.items.iter().rev().take(MAX_VISIBLE).collect();
        if visible.is_empty() {
            return;
        }

        let height = visible.len() as u16 + 2;
        let width = area.width.min(70);
        let toast_area = Rect {
            x: area.x + area.width.saturating_sub(width + 1),
            y: area.y + area.height.saturating_sub(height + 1),
            width,
            height: height.min(area.height),
        };

        let lines: Vec<Line> = visible
            .iter()
            .rev()
            .map(|t| {
                let color = if t.error { theme.error } else { theme.text };
                Line::from(Span::styled(t.message.clone(), Style::default().fg(color)))
            })
            .collect();

        frame.render_widget(Clear, toast_area);
        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(theme.border))
                        .style(Style::default().bg(theme.background)),
                ),
            toast_area,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toasts_expire_after_duration() {
        let mut toasts = Toasts::default();
        let start = Instant::now();
        toasts.push("Removed".to_string(), false, start);
        toasts.push("Failed".to_string(), true, start + Duration::from_secs(2));

        assert!(!toasts.expire(start + Duration::from_secs(3)));
        assert_eq!(toasts.messages(), vec!["Removed", "Failed"]);

        assert!(toasts.expire(start + TOAST_DURATION));
        assert_eq!(toasts.messages(), vec!["Failed"]);

        toasts.expire(start + Duration::from_secs(6));
        assert!(toasts.is_empty());
    }
}
