//! TUI theme and styling

use ratatui::style::{Color, Style};

use crate::session::SessionStatus;

#[derive(Debug, Clone)]
pub struct Theme {
    // Background and borders
    pub background: Color,
    pub border: Color,
    pub selection: Color,

    // Text colors
    pub title: Color,
    pub text: Color,
    pub dimmed: Color,
    pub hint: Color,

    // Status colors
    pub running: Color,
    pub complete: Color,
    pub waiting: Color,
    pub error: Color,
    pub unknown: Color,

    pub accent: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::phosphor()
    }
}

impl Theme {
    pub fn phosphor() -> Self {
        Self {
            background: Color::Rgb(16, 20, 18),
            border: Color::Rgb(45, 70, 55),
            selection: Color::Rgb(30, 50, 40),

            title: Color::Rgb(57, 255, 20),
            text: Color::Rgb(180, 255, 180),
            dimmed: Color::Rgb(80, 120, 90),
            hint: Color::Rgb(100, 160, 120),

            running: Color::Rgb(0, 255, 180),
            complete: Color::Rgb(130, 170, 255),
            waiting: Color::Rgb(255, 180, 60),
            error: Color::Rgb(255, 100, 80),
            unknown: Color::Rgb(60, 100, 70),

            accent: Color::Rgb(57, 255, 20),
        }
    }

    pub fn status_color(&self, status: &SessionStatus) -> Color {
        match status {
            SessionStatus::Running => self.running,
            SessionStatus::Exited { exit_code: 0 } => self.complete,
            SessionStatus::Exited { .. } => self.error,
            SessionStatus::Stopped => self.waiting,
            SessionStatus::Unknown => self.unknown,
        }
    }

    pub fn status_style(&self, status: &SessionStatus) -> Style {
        Style::default().fg(self.status_color(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_and_complete_differ() {
        let theme = Theme::default();
        assert_ne!(
            theme.status_color(&SessionStatus::Exited { exit_code: 0 }),
            theme.status_color(&SessionStatus::Exited { exit_code: 2 })
        );
        assert_eq!(
            theme.status_color(&SessionStatus::Exited { exit_code: 2 }),
            theme.error
        );
    }
}
