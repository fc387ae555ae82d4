//! Help overlay component

use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::tui::dialogs::centered_rect;
use crate::tui::styles::Theme;

const WIDTH: u16 = 48;
const KEY_WIDTH: usize = 8;

type Section = (&'static str, &'static [(&'static str, &'static str)]);

const SECTIONS: &[Section] = &[
    (
        "Sessions",
        &[
            ("j k", "Move"),
            ("Enter", "Open detail"),
            ("n", "New session"),
            ("S", "Scratch shell"),
            ("a", "Attach"),
            ("s", "Shell"),
            ("d", "Delete"),
            ("c", "Clean finished"),
            ("r", "Refresh now"),
        ],
    ),
    (
        "Detail",
        &[
            ("l", "Follow logs"),
            ("x", "Stop"),
            ("R", "Resume"),
            ("Esc", "Back"),
        ],
    ),
    ("Anywhere", &[("?", "Toggle help"), ("q", "Quit")]),
];

fn lines(theme: &Theme) -> Vec<Line<'static>> {
    let mut out = Vec::new();
    for (i, (title, keys)) in SECTIONS.iter().enumerate() {
        if i > 0 {
            out.push(Line::from(""));
        }
        out.push(Line::from(Span::styled(
            *title,
            Style::default().fg(theme.accent).bold(),
        )));
        for (key, desc) in keys.iter() {
            out.push(Line::from(vec![
                Span::styled(
                    format!("  {:<width$}", key, width = KEY_WIDTH),
                    Style::default().fg(theme.waiting),
                ),
                Span::styled(*desc, Style::default().fg(theme.text)),
            ]));
        }
    }
    out
}

pub struct HelpOverlay;

impl HelpOverlay {
    pub fn render(frame: &mut Frame, area: Rect, theme: &Theme) {
        let body = lines(theme);
        let rect = centered_rect(area, WIDTH, body.len() as u16 + 2);
        frame.render_widget(Clear, rect);

        let block = Block::default()
            .style(Style::default().bg(theme.background))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(" Keys ")
            .title_style(Style::default().fg(theme.title).bold());
        frame.render_widget(Paragraph::new(body).block(block), rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_row_fits_the_overlay_width() {
        let inner = WIDTH as usize - 2;
        for line in lines(&Theme::default()) {
            assert!(line.width() <= inner, "{:?} is too wide", line);
        }
    }

    #[test]
    fn test_sections_are_separated_by_one_blank_line() {
        let rows = lines(&Theme::default());
        let keys: usize = SECTIONS.iter().map(|(_, k)| k.len()).sum();
        assert_eq!(rows.len(), keys + SECTIONS.len() * 2 - 1);
    }
}
