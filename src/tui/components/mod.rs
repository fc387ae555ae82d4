//! TUI components

mod help;
mod text_input;
mod toast;

pub use help::HelpOverlay;
pub use text_input::TextField;
pub use toast::Toasts;
