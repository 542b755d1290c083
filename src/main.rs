//! authgate - session and token authentication for a CRUD API
//!
//! This is the main entry point for the authgate server and its
//! password-hashing helper.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use authgate::auth::{hash_password, SessionRegistry, StaticCredentials};
use authgate::config::{AuthMechanism, Config};
use authgate::server::{AppState, Server};
use authgate::telemetry::init_tracing;

/// authgate - session and token authentication for a CRUD API
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTHGATE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an argon2 hash for a `password_hash` entry in the config
    HashPassword {
        /// Password to hash; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    if let Some(Command::HashPassword { password }) = &args.command {
        return print_password_hash(password.clone());
    }

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mechanism = ?config.auth.mechanism,
        "Starting authgate"
    );

    let verifier = Arc::new(StaticCredentials::new(config.auth.users.clone()));
    if verifier.is_empty() {
        tracing::warn!("No user accounts configured; every login will be rejected");
    } else {
        info!(accounts = verifier.len(), "Credential store loaded");
    }

    // Exactly one mechanism is active per process
    let (state, sweeper) = match config.auth.mechanism {
        AuthMechanism::Session => {
            let registry = Arc::new(SessionRegistry::new(
                config.auth.session.registry_config(),
            ));
            let sweeper = registry.spawn_sweeper();
            info!(
                idle_timeout_secs = config.auth.session.idle_timeout_secs,
                sweep_interval_secs = config.auth.session.sweep_interval_secs,
                "Session registry initialized"
            );

            let state =
                AppState::with_sessions(registry, config.auth.session.clone(), verifier);
            (state, Some(sweeper))
        }
        AuthMechanism::Token => {
            let codec = Arc::new(config.auth.token.codec());
            info!(
                ttl_secs = config.auth.token.ttl_secs,
                issuer = %config.auth.token.issuer,
                "Token codec initialized"
            );

            let state = AppState::with_tokens(codec, config.auth.session.clone(), verifier);
            (state, None)
        }
    };

    // Create and start the HTTP server
    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    info!("authgate shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Hash a password for the `auth.users` config section
fn print_password_hash(password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    println!("{}", hash_password(&password)?);
    Ok(())
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
