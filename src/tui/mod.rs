//! Terminal User Interface module

mod app;
mod components;
mod dialogs;
mod styles;
mod views;

pub use app::{App, AppDeps};

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    cursor, event, execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use crate::cli::Services;
use crate::collab::GhPrLookup;
use crate::engine::{run_controller, HandoffResult, NextView, PrCache, UiLoop};
use crate::session::Config;

type Term = Terminal<CrosstermBackend<Stdout>>;

/// The ratatui surface. Owns the terminal only while `run` is executing.
pub struct Tui {
    app: App,
    notices: Vec<String>,
}

impl Tui {
    pub fn new(app: App) -> Self {
        Self {
            app,
            notices: Vec::new(),
        }
    }
}

fn enter_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    // Keystrokes typed into the child are still queued.
    while event::poll(Duration::from_millis(0))? {
        let _ = event::read();
    }
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    Write::flush(terminal.backend_mut())?;
    Ok(())
}

#[async_trait]
impl UiLoop for Tui {
    async fn run(&mut self, seed: NextView) -> Result<HandoffResult> {
        let mut terminal = match enter_terminal() {
            Ok(t) => t,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
                return Err(e);
            }
        };

        for notice in self.notices.drain(..) {
            self.app.toast_error(notice);
        }
        self.app.enter(seed);
        let result = self.app.run(&mut terminal).await;
        self.app.leave();

        // Restore before surfacing any error from the loop.
        let restored = restore_terminal(&mut terminal);
        let result = result?;
        restored?;
        Ok(result)
    }

    fn report(&mut self, message: String) {
        self.notices.push(message);
    }
}

/// Build the real collaborators and run the UI until the user quits.
pub async fn run(config: Config) -> Result<()> {
    let max_concurrent_removals = config.tasks.max_concurrent_removals;
    let services = Services::new(config, None)?;

    let app = App::new(AppDeps {
        providers: services.providers.clone(),
        workflow: services.workflow.clone(),
        config: services.reader.clone(),
        repo: services.repo.clone(),
        pr_cache: PrCache::new(Arc::new(GhPrLookup)),
        max_concurrent_removals,
        cwd: services.cwd.clone(),
    });

    let mut tui = Tui::new(app);
    let children = services.children();
    run_controller(&mut tui, &children, NextView::List).await
}
