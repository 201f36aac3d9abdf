//! Nimbus CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Validation failure (blocked before any request)
//! - 4: Authentication failure
//! - 5: Backend unreachable or backend error

use std::process::ExitCode;

use clap::Parser;
use nimbus_chat::ChatError;
use nimbus_core::CoreError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const AUTH_ERROR: u8 = 4;
    pub const BACKEND_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "nimbus=debug" } else { "nimbus=info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [default_level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Login(args) => commands::auth::login(&cli.global, args).await,
        Commands::Logout => commands::auth::logout(&cli.global).await,
        Commands::Whoami => commands::auth::whoami(&cli.global).await,
        Commands::Status(args) => commands::status::status(&cli.global, args).await,
        Commands::Agents(args) => commands::status::agents(&cli.global, args).await,
        Commands::Pipeline(args) => commands::pipeline::execute(&cli.global, args).await,
        Commands::Watch(args) => commands::watch::execute(&cli.global, args).await,
        Commands::Chat(args) => commands::chat::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Map an error to its exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let core = match e.downcast_ref::<ChatError>() {
        Some(err) if err.is_validation() => return ExitCodes::VALIDATION_FAILURE,
        Some(ChatError::Core(core)) => Some(core),
        Some(_) => None,
        None => e.downcast_ref::<CoreError>(),
    };

    match core {
        Some(CoreError::Unauthorized(_)) => ExitCodes::AUTH_ERROR,
        Some(CoreError::Config(_)) => ExitCodes::INVALID_ARGS,
        Some(CoreError::Transport(_) | CoreError::Backend { .. } | CoreError::Decode(_)) => {
            ExitCodes::BACKEND_ERROR
        }
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nimbus", "status", "--api-url", "http://backend:9000", "-v"]).unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.api_url.as_deref(), Some("http://backend:9000"));
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_error_categories() {
        let e = anyhow::Error::from(ChatError::Validation("Please generate a plan first".into()));
        assert_eq!(categorize_error(&e), ExitCodes::VALIDATION_FAILURE);

        let e = anyhow::Error::from(CoreError::Unauthorized("bad token".into()));
        assert_eq!(categorize_error(&e), ExitCodes::AUTH_ERROR);

        let e = anyhow::Error::from(ChatError::Core(CoreError::Transport("refused".into())));
        assert_eq!(categorize_error(&e), ExitCodes::BACKEND_ERROR);

        let e = anyhow::anyhow!("Dashboard data unavailable");
        assert_eq!(categorize_error(&e), ExitCodes::GENERAL_ERROR);
    }
}
