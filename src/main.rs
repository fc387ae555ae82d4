//! Agent Sandbox - sandboxed AI coding agent sessions

use std::sync::Mutex;

use agent_sandbox::cli::{self, Cli, Commands, Services};
use agent_sandbox::session::{get_app_dir, Config};
use agent_sandbox::tui;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

/// Logs go to a file: the TUI owns stdout.
fn init_tracing() -> Result<()> {
    let path = get_app_dir()?.join("debug.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_sandbox=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("AGENT_SANDBOX_DEBUG").is_ok() {
        init_tracing()?;
    }

    let cli = Cli::parse();

    if let Some(Commands::Completion { shell }) = cli.command {
        generate(shell, &mut Cli::command(), "asb", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load()?;
    let Some(command) = cli.command else {
        return tui::run(config).await;
    };

    let only = cli.provider;
    let services = Services::new(config, only)?;
    match command {
        Commands::Start(args) => cli::session::start(&services, only, args).await,
        Commands::Resume(args) => cli::session::resume(&services, only, args).await,
        Commands::List(args) => cli::list::run(&services, only, args).await,
        Commands::Show(args) => cli::list::show(&services, only, args).await,
        Commands::Attach(args) => cli::session::attach(&services, only, args).await,
        Commands::Shell(args) => cli::session::shell(&services, only, args).await,
        Commands::Logs(args) => cli::session::logs(&services, only, args).await,
        Commands::Stop(args) => cli::session::stop(&services, only, args).await,
        Commands::Rm(args) => cli::session::remove(&services, only, args).await,
        Commands::Clean => cli::session::clean(&services, only).await,
        Commands::Completion { .. } => Ok(()),
    }
}
