//! Single-line text field backed by `tui_input`

use crossterm::event::{Event, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::tui::styles::Theme;

pub struct TextField {
    label: &'static str,
    placeholder: Option<&'static str>,
    input: Input,
}

impl TextField {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            placeholder: None,
            input: Input::default(),
        }
    }

    pub fn with_placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.input = Input::new(value.into());
        self
    }

    pub fn value(&self) -> &str {
        self.input.value()
    }

    /// `None` when blank.
    pub fn non_empty(&self) -> Option<String> {
        let v = self.input.value().trim();
        (!v.is_empty()).then(|| v.to_string())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.input.handle_event(&Event::Key(key));
    }

    /// Focused fields show an inverse-video cursor over the current position.
    pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool, theme: &Theme) {
        let label_style = if focused {
            Style::default().fg(theme.accent).underlined()
        } else {
            Style::default().fg(theme.text)
        };
        let value_style = if focused {
            Style::default().fg(theme.accent)
        } else {
            Style::default().fg(theme.text)
        };

        let value = self.input.value();
        let mut spans = vec![Span::styled(self.label, label_style), Span::raw(" ")];

        if value.is_empty() && !focused {
            if let Some(placeholder) = self.placeholder {
                spans.push(Span::styled(placeholder, Style::default().fg(theme.dimmed)));
            }
        } else if focused {
            let cursor = self.input.visual_cursor();
            let cursor_style = Style::default().fg(theme.background).bg(theme.accent);

            let before: String = value.chars().take(cursor).collect();
            let at: String = value
                .chars()
                .nth(cursor)
                .map(|c| c.to_string())
                .unwrap_or_else(|| " ".to_string());
            let after: String = value.chars().skip(cursor + 1).collect();

            if !before.is_empty() {
                spans.push(Span::styled(before, value_style));
            }
            spans.push(Span::styled(at, cursor_style));
            if !after.is_empty() {
                spans.push(Span::styled(after, value_style));
            }
        } else {
            spans.push(Span::styled(value.to_string(), value_style));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_typing_and_non_empty() {
        let mut field = TextField::new("Prompt:");
        assert_eq!(field.non_empty(), None);

        for c in "  hi ".chars() {
            field.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(field.value(), "  hi ");
        assert_eq!(field.non_empty().as_deref(), Some("hi"));

        field.handle_key(key(KeyCode::Backspace));
        field.handle_key(key(KeyCode::Backspace));
        assert_eq!(field.value(), "  h");
    }

    #[test]
    fn test_with_value() {
        let field = TextField::new("Model:").with_value("sonnet");
        assert_eq!(field.value(), "sonnet");
    }
}
