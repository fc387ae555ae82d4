//! Command-line definition

use clap::{Parser, Subcommand};

use super::list::{ListArgs, ShowArgs};
use super::session::{
    AttachArgs, LogsArgs, RemoveArgs, ResumeArgs, ShellArgs, StartArgs, StopArgs,
};
use crate::session::ProviderKind;

#[derive(Parser)]
#[command(name = "asb")]
#[command(about = "Sandboxed AI coding agent sessions, locally or in the cloud")]
#[command(version)]
pub struct Cli {
    /// Sandbox provider namespace to use; searches both when omitted
    #[arg(long, global = true, value_enum)]
    pub provider: Option<ProviderKind>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new agent session
    Start(StartArgs),

    /// Resume a stopped or finished session
    Resume(ResumeArgs),

    /// List sessions
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one session
    Show(ShowArgs),

    /// Attach the terminal to a running session
    Attach(AttachArgs),

    /// Open a shell in a session, or in a scratch sandbox
    Shell(ShellArgs),

    /// Follow the output of a detached session
    Logs(LogsArgs),

    /// Stop a running session
    Stop(StopArgs),

    /// Remove sessions
    #[command(alias = "remove")]
    Rm(RemoveArgs),

    /// Remove every finished or stopped session
    Clean,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
