//! CLI command definitions.
//!
//! Each subcommand builds a `ConsoleContext` from the workspace settings and
//! drives one part of it.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nimbus_chat::ConsoleContext;
use nimbus_core::{ChatTurn, ConsoleConfig, Sender};

pub mod auth;
pub mod chat;
pub mod pipeline;
pub mod status;
pub mod watch;

/// Nimbus - console for the infrastructure automation backend
#[derive(Parser)]
#[command(name = "nimbus")]
#[command(version, about = "Nimbus - console for the infrastructure automation backend")]
#[command(long_about = r#"
Nimbus is a terminal console for the infrastructure automation backend. It
keeps a live event stream open, talks to the agents and walks you through a
requirements wizard before designing infrastructure.

COMMANDS:
  login / logout / whoami → Manage the persisted session
  status                  → Platform health and agent overview
  agents                  → List agents or show one agent's capabilities
  pipeline                → Run analyze → generate → execute against an agent
  watch                   → Stream real-time events
  chat                    → Interactive chat with the requirements wizard

CONFIGURATION:
  <workspace>/.nimbus/settings.toml, then NIMBUS_API_URL, NIMBUS_WS_URL and
  NIMBUS_RECONNECT_MS, then the flags below.

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Validation failure
  4 - Authentication failure
  5 - Backend error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Workspace holding `.nimbus/settings.toml` and the client storage
    #[arg(short, long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Backend REST base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Backend event stream URL
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn config(&self) -> Result<ConsoleConfig> {
        let mut config = ConsoleConfig::load(&self.workspace)?;
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url.clone());
        }
        if let Some(url) = &self.ws_url {
            config = config.with_ws_url(url.clone());
        }
        Ok(config)
    }

    pub fn console(&self) -> Result<ConsoleContext> {
        Ok(ConsoleContext::from_config(self.config()?)?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the session token
    Login(auth::LoginArgs),

    /// Forget the persisted session token
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show platform health and agents
    Status(status::StatusArgs),

    /// List agents, or show one agent's capabilities
    Agents(status::AgentsArgs),

    /// Run the analyze → generate → execute pipeline for one agent
    Pipeline(pipeline::PipelineArgs),

    /// Stream real-time events from the backend
    Watch(watch::WatchArgs),

    /// Interactive chat
    Chat(chat::ChatArgs),
}

/// Print one transcript entry.
pub fn print_turn(turn: &ChatTurn) {
    let prefix = match turn.sender {
        Sender::User => "you",
        Sender::Assistant => "🤖 nimbus",
        Sender::System => "⚠️  system",
    };
    println!("{}> {}", prefix, turn.text);
}

/// Print an inline prompt without a newline.
pub fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(())
}
