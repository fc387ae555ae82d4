//! `asb list` and `asb show` command implementations

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::{load_sessions, resolve_session, Services};
use crate::session::{ProviderKind, Session};

const TABLE_COL_ID: usize = 12;
const TABLE_COL_NAME: usize = 24;
const TABLE_COL_PROVIDER: usize = 8;
const TABLE_COL_AGENT: usize = 8;
const TABLE_COL_STATUS: usize = 12;
const TABLE_COL_REPO: usize = 28;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Args)]
pub struct ListArgs {
    /// Include finished and stopped sessions in the table
    #[arg(long)]
    pub all: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Session id, id prefix or name
    pub id: String,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

fn table_header() -> String {
    let header = format!(
        "{:<w_id$} {:<w_name$} {:<w_provider$} {:<w_agent$} {:<w_status$} {:<w_repo$} AGE",
        "ID",
        "NAME",
        "PROVIDER",
        "AGENT",
        "STATUS",
        "REPO",
        w_id = TABLE_COL_ID,
        w_name = TABLE_COL_NAME,
        w_provider = TABLE_COL_PROVIDER,
        w_agent = TABLE_COL_AGENT,
        w_status = TABLE_COL_STATUS,
        w_repo = TABLE_COL_REPO,
    );
    let rule = "-".repeat(
        TABLE_COL_ID
            + TABLE_COL_NAME
            + TABLE_COL_PROVIDER
            + TABLE_COL_AGENT
            + TABLE_COL_STATUS
            + TABLE_COL_REPO
            + 9,
    );
    format!("{}\n{}", header, rule)
}

fn table_row(session: &Session) -> String {
    format!(
        "{:<w_id$} {:<w_name$} {:<w_provider$} {:<w_agent$} {:<w_status$} {:<w_repo$} {}",
        super::truncate_id(&session.id, TABLE_COL_ID),
        super::truncate(&session.name, TABLE_COL_NAME),
        session.provider.as_str(),
        session.agent.as_str(),
        session.status.label(),
        super::truncate(&session.repo, TABLE_COL_REPO),
        super::format_age(session.created),
        w_id = TABLE_COL_ID,
        w_name = TABLE_COL_NAME,
        w_provider = TABLE_COL_PROVIDER,
        w_agent = TABLE_COL_AGENT,
        w_status = TABLE_COL_STATUS,
        w_repo = TABLE_COL_REPO,
    )
}

/// The table shows running sessions only unless `all` is set; JSON and YAML
/// always carry every session.
pub fn render_list(sessions: &[Session], all: bool, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(sessions)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(sessions)?),
        OutputFormat::Table => {
            let rows: Vec<&Session> = sessions
                .iter()
                .filter(|s| all || s.status.is_running())
                .collect();
            if rows.is_empty() {
                return Ok(if all {
                    "No sessions found.".to_string()
                } else {
                    "No running sessions. Use --all to include finished ones.".to_string()
                });
            }

            let mut out = table_header();
            for session in rows {
                out.push('\n');
                out.push_str(&table_row(session));
            }
            Ok(out)
        }
    }
}

pub fn render_session(session: &Session, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(session)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(session)?),
        OutputFormat::Table => {
            let mut lines = vec![
                format!("Session: {}", session.name),
                format!("  ID:       {}", session.id),
                format!("  Provider: {}", session.provider),
                format!("  Status:   {}", session.status.label()),
                format!("  Agent:    {} ({})", session.agent, session.model),
                format!("  Repo:     {}", session.repo),
                format!("  Branch:   {}", session.branch),
            ];
            if let Some(dir) = &session.mount_dir {
                lines.push(format!("  Mount:    {}", dir));
            }
            if let Some(from) = &session.resumed_from {
                lines.push(format!("  Resumed:  from {}", from));
            }
            if let Some(region) = &session.region {
                lines.push(format!("  Region:   {}", region));
            }
            lines.push(format!(
                "  Created:  {} ({} ago)",
                session.created.format("%Y-%m-%d %H:%M:%S UTC"),
                super::format_age(session.created)
            ));
            if !session.prompt.is_empty() {
                lines.push(format!("  Prompt:   {}", session.prompt));
            }
            Ok(lines.join("\n"))
        }
    }
}

pub async fn run(services: &Services, only: Option<ProviderKind>, args: ListArgs) -> Result<()> {
    let sessions = load_sessions(&services.providers, only).await?;
    println!("{}", render_list(&sessions, args.all, args.output)?);
    Ok(())
}

pub async fn show(services: &Services, only: Option<ProviderKind>, args: ShowArgs) -> Result<()> {
    let sessions = load_sessions(&services.providers, only).await?;
    let session = resolve_session(&args.id, &sessions, services.providers.in_order())?;
    println!("{}", render_session(session, args.output)?);
    Ok(())
}
