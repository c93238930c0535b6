//! graphctl - a command-line client for Microsoft Graph.
//!
//! Sign in once with the device-code flow; later commands reuse and
//! refresh the stored token automatically.

mod commands;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "graphctl", version, about = "Microsoft Graph from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with a device code
    Login {
        /// Application (client) ID registered with the identity platform
        #[arg(long)]
        client_id: Option<String>,
        /// Keep the token in the OS keychain instead of a file
        #[arg(long, conflicts_with = "file")]
        keyring: bool,
        /// Keep the token in a file in the config directory
        #[arg(long)]
        file: bool,
    },
    /// Remove the stored token and forget all slugs
    Logout,
    /// Show login state and token expiry
    Status,
    /// Print a valid access token, refreshing it if needed
    Token,
    /// Show the signed-in user
    Me,
    /// Print the short slug for each identifier
    Slug {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the full identifier for each slug
    Resolve {
        #[arg(required = true)]
        slugs: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Login {
            client_id,
            keyring,
            file,
        } => commands::login(client_id, commands::backend_choice(keyring, file)).await,
        Command::Logout => commands::logout(),
        Command::Status => commands::status(),
        Command::Token => commands::token().await,
        Command::Me => commands::me().await,
        Command::Slug { ids } => commands::slug(&ids),
        Command::Resolve { slugs } => commands::resolve(&slugs),
    };

    match result {
        Ok(()) => {
            debug!("Command finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!(error = ?e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
