//! The four screens: session list, session detail, new-session prompt, logs.
//!
//! Views own only their own UI state. Anything that talks to a provider is
//! returned as an `Action` for the app to carry out.

mod detail;
mod list;
mod logs;
mod prompt;

pub use detail::DetailView;
pub use list::ListView;
pub use logs::LogsView;
pub use prompt::PromptView;

use crate::engine::{HandoffResult, StartRequest};
use crate::session::{Session, SessionKey};
use crate::tui::dialogs::ConfirmAction;

#[derive(Debug, Clone)]
pub enum Action {
    Quit,
    Handoff(HandoffResult),
    ShowList,
    ShowDetail(SessionKey),
    ShowPrompt,
    ShowLogs(SessionKey),
    /// Ad hoc shell in a disposable session.
    NewShell,
    Refresh,
    Confirm(ConfirmAction),
    Resume(Session),
    Start(StartRequest),
    ToggleHelp,
}
