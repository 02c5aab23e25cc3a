mod bus;
mod config;
mod context;
mod hooks;
mod records;
mod resolver;
mod safety;
mod store;
mod tool;
mod types;

use anyhow::{Context, Result};
use bus::HookBus;
use clap::{Parser, Subcommand};
use config::{Config, DEFAULT_BASE_PATH};
use hooks::SessionInfo;
use serde_json::{json, Value};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process;
use tool::ProjectorTool;
use tracing_subscriber::EnvFilter;
use types::{HookEvent, HookResult};

#[derive(Parser)]
#[command(name = "projector", version, about = "Project and strategy context for agent sessions")]
struct Cli {
    /// Directory holding projector.toml, strategies/ and projects/.
    #[arg(long, global = true, default_value = DEFAULT_BASE_PATH)]
    base_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one session: hook events in on stdin, one result per line out.
    Hooks {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        working_dir: Option<String>,
        /// Set for sub-agent sessions.
        #[arg(long)]
        parent_id: Option<String>,
    },
    /// Run one tool call read from stdin.
    Tool {
        /// Print the tool's name, description and input schema instead.
        #[arg(long)]
        schema: bool,
    },
    /// Print the assembled context for a directory.
    Context {
        #[arg(long)]
        working_dir: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PROJECTOR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value).context("serializing output")?);
    Ok(())
}

// ===================================================================
// Subcommands
// ===================================================================

fn run_hooks(base: PathBuf, session: SessionInfo) -> Result<()> {
    let config = Config::load(&base).unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{e:#}"), "config unreadable, using defaults");
        Config::defaults_at(&base)
    });

    let mut bus = HookBus::new();
    hooks::mount(&mut bus, &config, session);
    tracing::debug!(
        handlers = ?bus.handlers_for(types::PROVIDER_REQUEST),
        "hooks mounted"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading event stream")?;
        if line.trim().is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<HookEvent>(&line) {
            Ok(event) => bus.emit(&event.event, &event.data),
            Err(e) => {
                tracing::warn!(error = %e, "malformed hook event line");
                HookResult::proceed()
            }
        };
        let encoded = serde_json::to_string(&result).context("serializing hook result")?;
        writeln!(stdout, "{encoded}").context("writing hook result")?;
        stdout.flush().context("writing hook result")?;
    }
    Ok(())
}

fn run_tool(base: PathBuf, schema: bool) -> Result<()> {
    if schema {
        return print_json(&json!({
            "name": tool::NAME,
            "description": tool::DESCRIPTION,
            "input_schema": ProjectorTool::input_schema(),
        }));
    }
    let config = Config::load(&base)?;
    let input: Value = serde_json::from_str(&read_stdin()?).context("parsing tool input")?;
    let store = config.store();
    tracing::debug!(
        strategies = %store.strategies_dir().display(),
        projects = %store.projects_dir().display(),
        "store roots"
    );
    let result = ProjectorTool::new(store).execute(&input);
    print_json(&result)
}

fn run_context(base: PathBuf, working_dir: Option<String>) -> Result<()> {
    let config = Config::load(&base)?;
    let working_dir = match working_dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .context("resolving current directory")?
            .to_string_lossy()
            .into_owned(),
    };
    let text = context::build_context(&config.store(), &working_dir, config.max_recent_outcomes);
    if !text.is_empty() {
        println!("{text}");
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let base = config::expand(&cli.base_path);
    let result = match cli.command {
        Command::Hooks {
            session_id,
            working_dir,
            parent_id,
        } => run_hooks(
            base,
            SessionInfo {
                session_id,
                working_dir,
                parent_id,
            },
        ),
        Command::Tool { schema } => run_tool(base, schema),
        Command::Context { working_dir } => run_context(base, working_dir),
    };

    if let Err(err) = result {
        eprintln!("projector: {err:#}");
        process::exit(2);
    }
}
