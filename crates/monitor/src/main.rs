// crates/monitor/src/main.rs
//! `claude-watch`: list Claude Code sessions, show one, or follow live changes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use claude_watch_core::{
    format_relative_time, ResumeRequest, Role, Session, SessionSet, ToolStatus,
};
use claude_watch_monitor::{load_once, Monitor, MonitorConfig, MonitorEvent, ProcessSourceKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "claude-watch",
    version,
    about = "Watch Claude Code transcripts and the processes driving them"
)]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Transcript root (default: ~/.claude/projects)
    #[arg(long, global = true, env = "CLAUDE_WATCH_ROOT")]
    root: Option<PathBuf>,
    /// Program name of the CLI to look for
    #[arg(long, global = true, env = "CLAUDE_WATCH_PROCESS_NAME")]
    process_name: Option<String>,
    /// Process poll interval in milliseconds
    #[arg(long, global = true, env = "CLAUDE_WATCH_POLL_MS")]
    poll_ms: Option<u64>,
    /// Timeout for each external utility call, in milliseconds
    #[arg(long, global = true, env = "CLAUDE_WATCH_COMMAND_TIMEOUT_MS")]
    command_timeout_ms: Option<u64>,
    /// Overall bound on one process scan, in milliseconds
    #[arg(long, global = true, env = "CLAUDE_WATCH_LOCATE_DEADLINE_MS")]
    locate_deadline_ms: Option<u64>,
    /// Capacity of the change queue between watcher and monitor
    #[arg(long, global = true, env = "CLAUDE_WATCH_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,
    /// Process table backend
    #[arg(long, global = true, value_enum, env = "CLAUDE_WATCH_PROCESS_SOURCE")]
    process_source: Option<ProcessSourceKind>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sessions, newest first
    List {
        /// Only sessions with a live process
        #[arg(long)]
        live: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one session's conversation and tool calls
    Show {
        session_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Follow transcript and process changes until interrupted
    Watch {
        #[arg(long)]
        json: bool,
    },
    /// Print the command that resumes a session
    ResumeCommand { session_id: String },
}

impl GlobalOpts {
    fn into_config(self) -> Result<MonitorConfig> {
        let mut config = match self.root {
            Some(root) => MonitorConfig::new(root),
            None => MonitorConfig::from_home().context("locating ~/.claude/projects")?,
        };
        if let Some(name) = self.process_name {
            config.process_name = name;
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.command_timeout_ms {
            config.command_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.locate_deadline_ms {
            config.locate_deadline = Duration::from_millis(ms);
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity.max(1);
        }
        if let Some(kind) = self.process_source {
            config.process_source = kind;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,claude_watch_core=info,claude_watch_monitor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.opts.into_config()?;

    match cli.command {
        Command::List { live, json } => {
            let sessions = load(&config).await?;
            let rows: Vec<&Session> = if live {
                sessions.live().collect()
            } else {
                sessions.iter().collect()
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_table(&rows);
            }
        }
        Command::Show { session_id, json } => {
            let sessions = load(&config).await?;
            let session = sessions
                .get(&session_id)
                .with_context(|| format!("no session with id {session_id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(session)?);
            } else {
                print_session(session);
            }
        }
        Command::Watch { json } => watch(config, json).await?,
        Command::ResumeCommand { session_id } => {
            let sessions = load(&config).await?;
            let session = sessions
                .get(&session_id)
                .with_context(|| format!("no session with id {session_id}"))?;
            let request = ResumeRequest::from_session(session)
                .with_context(|| format!("session {session_id} has no known project path"))?;
            println!(
                "cd {} && {}",
                shell_quote(&request.project_path),
                request
                    .program_args()
                    .iter()
                    .map(|a| shell_quote(a))
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
    }
    Ok(())
}

async fn load(config: &MonitorConfig) -> Result<SessionSet> {
    load_once(config, config.build_source())
        .await
        .with_context(|| format!("scanning {}", config.root.display()))
}

async fn watch(config: MonitorConfig, json: bool) -> Result<()> {
    let source = config.build_source();
    let handle = Monitor::spawn(config, source);
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, json)?,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_event(event: &MonitorEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        MonitorEvent::SessionDiscovered { session } => {
            println!("+ {}  {}", session.display_name(), session.display_summary());
        }
        MonitorEvent::SessionUpdated { session } => {
            println!(
                "~ {}  {} tools, {} turns",
                session.display_name(),
                session.tool_count(),
                session.turn_count()
            );
        }
        MonitorEvent::Reconciled { live } => println!("= {live} live"),
    }
    Ok(())
}

fn print_table(sessions: &[&Session]) {
    let now = Utc::now();
    for s in sessions {
        let marker = match s.pid {
            Some(pid) => format!("live:{pid}"),
            None => "-".to_string(),
        };
        let when = s
            .start_time
            .as_deref()
            .map(|ts| format_relative_time(ts, now))
            .unwrap_or_default();
        println!(
            "{:<8}  {:<12}  {:<16}  {:>8}  {:>5}  {}",
            s.display_name(),
            marker,
            s.project_name(),
            when,
            s.tool_count(),
            s.display_summary()
        );
    }
}

fn print_session(session: &Session) {
    println!("{}  {}", session.id, session.project_path.as_deref().unwrap_or("?"));
    println!("{}", session.display_summary());
    println!();
    for turn in &session.turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        if !turn.text.is_empty() {
            println!("[{role}] {}", turn.text);
        }
        if turn.role != Role::Assistant {
            continue;
        }
        for tool in session.turn_invocations(turn) {
            println!(
                "  {} ({})  {}",
                tool.display_name(),
                status_label(tool.status()),
                tool.preview
            );
        }
    }
}

fn status_label(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Completed => "ok",
        ToolStatus::Error => "error",
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
