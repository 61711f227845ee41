//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use campus_feed::core::config::Config;
use campus_feed::core::errors::FeedError;
use campus_feed::core::session::SharedSession;
use campus_feed::feed::compose::{ComposePolicy, ComposedSection};
use campus_feed::feed::engine::{EngineOptions, FeedEngine};
use campus_feed::feed::events::EngineEvent;
use campus_feed::feed::fixture::{FixtureBackend, FixtureData};
use campus_feed::feed::model::{EmptyFeedReason, FeedItem};
use campus_feed::feed::runtime::FeedRuntime;
use campus_feed::feed::traversal::TraversalState;
use campus_feed::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use campus_feed::logger::jsonl::JsonlConfig;

/// Campus feed engine: compose and replay announcement feeds from fixtures.
#[derive(Debug, Parser)]
#[command(
    name = "cfeed",
    author,
    version,
    about = "Campus announcement feed engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load a fixture and print the composed sections.
    Compose(ComposeArgs),
    /// Load a fixture, apply a sequence of actions, and print every step.
    Replay(ReplayArgs),
    /// Inspect the effective configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Full,
    Home,
    Bookmarks,
}

impl PolicyArg {
    fn policy(self) -> ComposePolicy {
        match self {
            Self::Full => ComposePolicy::full(),
            Self::Home => ComposePolicy::home(),
            Self::Bookmarks => ComposePolicy::bookmarks(),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ComposeArgs {
    /// JSON fixture describing the backend.
    #[arg(long, value_name = "FILE")]
    fixture: PathBuf,
    /// Sections hosted by the screen (default: from config).
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// JSON fixture describing the backend.
    #[arg(long, value_name = "FILE")]
    fixture: PathBuf,
    /// Sections hosted by the screen (default: from config).
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    /// Actions: load, select:N, cancel, start, advance, exit, signin:NAME, rename:NAME, signout.
    #[arg(value_name = "ACTION", required = true)]
    actions: Vec<ReplayAction>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective config.
    Show,
    /// Validate the config and print its hash.
    Validate,
}

/// One replay step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplayAction {
    Load,
    Select(usize),
    Cancel,
    Start,
    Advance,
    Exit,
    SignIn(String),
    Rename(String),
    SignOut,
}

impl FromStr for ReplayAction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (verb, arg) = raw
            .split_once(':')
            .map_or((raw, None), |(verb, arg)| (verb, Some(arg)));
        match (verb, arg) {
            ("load", None) => Ok(Self::Load),
            ("cancel", None) => Ok(Self::Cancel),
            ("start", None) => Ok(Self::Start),
            ("advance", None) => Ok(Self::Advance),
            ("exit", None) => Ok(Self::Exit),
            ("signout", None) => Ok(Self::SignOut),
            ("select", Some(index)) => index
                .parse()
                .map(Self::Select)
                .map_err(|e| format!("select:{index}: {e}")),
            ("signin", Some(name)) if !name.is_empty() => Ok(Self::SignIn(name.to_string())),
            ("rename", Some(name)) if !name.is_empty() => Ok(Self::Rename(name.to_string())),
            _ => Err(format!("unknown action {raw:?}")),
        }
    }
}

impl std::fmt::Display for ReplayAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Select(index) => write!(f, "select:{index}"),
            Self::Cancel => f.write_str("cancel"),
            Self::Start => f.write_str("start"),
            Self::Advance => f.write_str("advance"),
            Self::Exit => f.write_str("exit"),
            Self::SignIn(name) => write!(f, "signin:{name}"),
            Self::Rename(name) => write!(f, "rename:{name}"),
            Self::SignOut => f.write_str("signout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Feed(
                FeedError::InvalidConfig { .. }
                | FeedError::MissingConfig { .. }
                | FeedError::ConfigParse { .. }
                | FeedError::Serialization { .. },
            ) => 1,
            Self::Feed(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Compose(args) => run_compose(cli, args),
        Command::Replay(args) => run_replay(cli, args),
        Command::Config(args) => run_config(cli, args),
    }
}

// ──────────────────── session wiring ────────────────────

/// Runtime, session, and logger assembled for one command.
struct Harness {
    runtime: FeedRuntime<FixtureBackend>,
    session: SharedSession,
    logger: Option<(ActivityLoggerHandle, JoinHandle<()>)>,
}

impl Harness {
    fn open(cli: &Cli, fixture: &Path, policy: Option<PolicyArg>) -> Result<Self, CliError> {
        let config = Config::load(cli.config.as_deref())?;
        let data = FixtureData::load(fixture)?;

        let mut options = EngineOptions::from(&config);
        if let Some(policy) = policy {
            options.policy = policy.policy();
        }

        let session = data
            .viewer_name
            .clone()
            .map_or_else(SharedSession::new, SharedSession::signed_in);
        let changes = session.subscribe();

        let logger = if config.logging.enabled {
            let (handle, join) = spawn_logger(
                JsonlConfig::from(&config.logging),
                config.logging.channel_capacity,
            )?;
            handle.send(ActivityEvent::EngineStarted {
                version: env!("CARGO_PKG_VERSION").to_string(),
                config_hash: config.stable_hash()?,
            });
            Some((handle, join))
        } else {
            None
        };

        let mut engine = FeedEngine::new(options, Arc::new(session.clone()));
        if let Some((handle, _)) = &logger {
            engine = engine.with_logger(handle.clone());
        }
        let runtime =
            FeedRuntime::new(engine, FixtureBackend::new(data)).with_session_changes(changes);

        Ok(Self {
            runtime,
            session,
            logger,
        })
    }

    fn close(self) {
        if let Some((handle, join)) = self.logger {
            handle.shutdown();
            let _ = join.join();
        }
    }
}

// ──────────────────── compose ────────────────────

fn run_compose(cli: &Cli, args: &ComposeArgs) -> Result<(), CliError> {
    let mut harness = Harness::open(cli, &args.fixture, args.policy)?;
    let loaded = harness.runtime.load();
    let sections = harness.runtime.composed_sections();
    harness.close();
    loaded?;

    match output_mode(cli) {
        OutputMode::Human => print_sections_human(&sections),
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "compose",
                "sections": sections,
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── replay ────────────────────

#[derive(Debug, Serialize)]
struct ReplayStep {
    action: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    traversal: TraversalState,
    events: Vec<EngineEvent>,
}

fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<(), CliError> {
    let mut harness = Harness::open(cli, &args.fixture, args.policy)?;
    let events = harness.runtime.subscribe();
    let mut steps = Vec::with_capacity(args.actions.len());

    for action in &args.actions {
        let outcome = apply_action(&mut harness, action);
        steps.push(ReplayStep {
            action: action.to_string(),
            ok: outcome.is_ok(),
            error_code: outcome.as_ref().err().map(FeedError::code),
            error: outcome.err().map(|e| e.to_string()),
            traversal: harness.runtime.traversal_state(),
            events: events.try_iter().collect(),
        });
    }

    let sections = harness.runtime.composed_sections();
    let traversal = harness.runtime.traversal_state();
    let current = harness.runtime.current_item();
    harness.close();

    match output_mode(cli) {
        OutputMode::Human => {
            for step in &steps {
                print_step_human(step);
            }
            println!();
            print_sections_human(&sections);
            if let Some(item) = current {
                println!("{} #{} {}", "current:".bold(), item.id, item.title);
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "replay",
                "steps": steps,
                "sections": sections,
                "traversal": traversal,
                "current_item": current,
            }))?;
        }
    }
    Ok(())
}

fn apply_action(harness: &mut Harness, action: &ReplayAction) -> Result<(), FeedError> {
    let runtime = &mut harness.runtime;
    match action {
        ReplayAction::Load => runtime.load(),
        ReplayAction::Select(index) => runtime.select_association(*index),
        ReplayAction::Cancel => runtime.cancel_selection(),
        ReplayAction::Start => runtime.start_traversal().map(drop),
        ReplayAction::Advance => runtime.acknowledge_current_and_advance().map(drop),
        ReplayAction::Exit => runtime.exit_traversal(),
        ReplayAction::SignIn(name) => {
            harness.session.sign_in(name.clone());
            runtime.pump_session_changes().map(drop)
        }
        ReplayAction::Rename(name) => {
            harness.session.rename(name.clone());
            runtime.pump_session_changes().map(drop)
        }
        ReplayAction::SignOut => {
            harness.session.sign_out();
            runtime.pump_session_changes().map(drop)
        }
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
        }
        ConfigCommand::Show => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
        }
        ConfigCommand::Validate => {
            let config = Config::load(cli.config.as_deref())?;
            let hash = config.stable_hash()?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", "Configuration is valid.".green());
                    println!("  Source: {}", config.paths.config_file.display());
                    println!("  Hash: {hash}");
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config validate",
                    "valid": true,
                    "source": config.paths.config_file.to_string_lossy(),
                    "hash": hash,
                }))?,
            }
        }
    }
    Ok(())
}

// ──────────────────── human output ────────────────────

fn print_sections_human(sections: &[ComposedSection]) {
    for section in sections {
        let header = section.viewer_name.as_ref().map_or_else(
            || section.id.as_str().to_string(),
            |viewer| format!("{} ({viewer})", section.id.as_str()),
        );
        println!("{}", header.bold().cyan());
        for item in &section.items {
            println!("  {}", describe_item(item));
        }
    }
}

fn describe_item(item: &FeedItem) -> String {
    match item {
        FeedItem::MissedDigest(digest) => format!(
            "{}, you missed {} announcement(s)",
            digest.viewer_name,
            digest.missed_count.to_string().yellow()
        ),
        FeedItem::Association(association) => {
            let marker = if association.is_selected { "*" } else { " " };
            let mut line = format!("{marker} {}", association.name);
            if association.has_unread {
                line.push_str(&format!(" {}", "[unread]".yellow()));
            }
            if !association.is_registered {
                line.push_str(&format!(" {}", "[unregistered]".dimmed()));
            }
            line
        }
        FeedItem::Announcement(post) => format!(
            "#{} {} {}",
            post.id,
            post.title,
            post.posted_at.format("(%Y-%m-%d)").to_string().dimmed()
        ),
        FeedItem::EmptyFeed(EmptyFeedReason::NoAnnouncements) => {
            "no announcements yet".dimmed().to_string()
        }
        FeedItem::EmptyFeed(EmptyFeedReason::Unregistered) => {
            "this association has not joined yet".dimmed().to_string()
        }
        FeedItem::Bookmark(saved) => format!("#{} {}", saved.id(), saved.post.title),
        FeedItem::EmptyBookmarks => "nothing saved yet".dimmed().to_string(),
    }
}

fn print_step_human(step: &ReplayStep) {
    let status = if step.ok {
        "ok".green()
    } else {
        "failed".red()
    };
    let traversal = serde_json::to_value(step.traversal)
        .ok()
        .and_then(|v| v.get("state").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();
    println!(
        "{:<16} {:<6} events={:<3} traversal={traversal}",
        step.action,
        status,
        step.events.len()
    );
    if let Some(error) = &step.error {
        println!("  {}", error.red());
    }
}

// ──────────────────── output helpers ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("CFEED_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
