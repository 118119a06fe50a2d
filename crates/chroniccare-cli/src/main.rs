//! ChronicCare CLI - sign in to the ChronicCare symptom tracker.
//!
//! Provides the account flows of the mobile app from the terminal: login,
//! registration, logout, session status, and the server-side profile.

mod app;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, SignupArgs};
use chroniccare_core::config::{Config, StoreBackend, API_URL_ENV, PASSPHRASE_ENV};

#[derive(Debug, Parser)]
#[command(name = "chroniccare", version, about = "ChronicCare symptom tracker client")]
struct Cli {
    /// API base URL, e.g. http://localhost:8000/api/
    #[arg(long, global = true, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Where to keep session tokens
    #[arg(long, global = true, value_enum)]
    store: Option<StoreArg>,

    /// Passphrase for the file token store
    #[arg(long, global = true, env = PASSPHRASE_ENV, hide_env_values = true)]
    passphrase: Option<String>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with username and password
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account
    Register {
        /// First and last name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Fetch the account profile from the server
    Profile,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreArg {
    Keyring,
    File,
}

impl From<StoreArg> for StoreBackend {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Keyring => StoreBackend::Keyring,
            StoreArg::File => StoreBackend::File,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chroniccare.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("ChronicCare CLI starting");

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(store) = cli.store {
        config.store_backend = store.into();
    }

    let mut app = App::new(config, cli.passphrase.as_deref())?;

    match cli.command {
        Command::Login { username } => app.login(username).await,
        Command::Register { name, email, phone } => {
            app.register(SignupArgs { name, email, phone }).await
        }
        Command::Logout => app.logout().await,
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::Profile => app.profile().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_with_file_store() {
        let cli = Cli::try_parse_from([
            "chroniccare",
            "login",
            "--username",
            "alice",
            "--store",
            "file",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Login { username: Some(ref u) } if u == "alice"));
        assert!(matches!(cli.store, Some(StoreArg::File)));
    }

    #[test]
    fn test_store_arg_maps_to_backend() {
        assert_eq!(StoreBackend::from(StoreArg::Keyring), StoreBackend::Keyring);
        assert_eq!(StoreBackend::from(StoreArg::File), StoreBackend::File);
    }
}
