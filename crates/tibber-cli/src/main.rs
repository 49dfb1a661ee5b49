//! tibber-cli - Command-line tool for Tibber vehicle data
//!
//! Drives the client library end to end: credential checks, one-shot
//! status, a periodic watch loop with its own token-refresh cadence, and
//! the stored battery-level update action.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tibber_graphapi::queries::QUERY_HOMES;
use tibber_graphapi::{
    Endpoints, HomesData, TibberClient, VehicleCoordinator, DEFAULT_SCAN_INTERVAL,
    DEFAULT_VEHICLE_INDEX,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Re-authentication cadence in watch mode; an hour inside the stored
/// token validity, and on-demand expiry checks cover any gap.
const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(18 * 3600);

#[derive(Parser)]
#[command(name = "tibber-cli")]
#[command(author, version, about = "Tibber vehicle data CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Tibber account email
    #[arg(short, long, env = "TIBBER_USERNAME")]
    username: Option<String>,

    /// Tibber account password
    #[arg(short, long, env = "TIBBER_PASSWORD")]
    password: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "TIBBER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify credentials and show the account's homes
    Login,

    /// Fetch and print a single vehicle snapshot
    Status {
        /// Position in the account's vehicle list
        #[arg(long)]
        vehicle_index: Option<usize>,
    },

    /// Poll on an interval and print each snapshot
    Watch {
        /// Position in the account's vehicle list
        #[arg(long)]
        vehicle_index: Option<usize>,

        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Set a vehicle's stored battery level
    SetSoc {
        /// Vehicle id as returned by the vehicle query
        vehicle_id: String,

        /// Home id the vehicle belongs to
        home_id: String,

        /// Battery level percentage (0-100)
        level: u8,
    },

    /// Probe the known login endpoints and report the responsive one
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tibber_cli=debug,tibber_graphapi=debug"
    } else {
        "tibber_cli=info,tibber_graphapi=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let file_config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Commands::Probe = cli.command {
        let http = reqwest::Client::builder().build()?;
        let endpoints = Endpoints::probe(&http).await;
        println!("login:   {}", endpoints.login_url);
        println!("graphql: {}", endpoints.graphql_url);
        return Ok(());
    }

    let username = cli
        .username
        .or(file_config.username)
        .context("No username; use --username, TIBBER_USERNAME, or the config file")?;
    let password = cli
        .password
        .or(file_config.password)
        .context("No password; use --password, TIBBER_PASSWORD, or the config file")?;
    let client = Arc::new(TibberClient::new(username, password)?);

    match cli.command {
        Commands::Login => login(&client).await,
        Commands::Status { vehicle_index } => {
            let index = vehicle_index
                .or(file_config.vehicle_index)
                .unwrap_or(DEFAULT_VEHICLE_INDEX);
            status(client, index).await
        }
        Commands::Watch {
            vehicle_index,
            interval,
        } => {
            let index = vehicle_index
                .or(file_config.vehicle_index)
                .unwrap_or(DEFAULT_VEHICLE_INDEX);
            let interval = interval
                .or(file_config.scan_interval)
                .unwrap_or(DEFAULT_SCAN_INTERVAL);
            watch(client, index, Duration::from_secs(interval)).await
        }
        Commands::SetSoc {
            vehicle_id,
            home_id,
            level,
        } => {
            client
                .set_vehicle_battery_level(&vehicle_id, &home_id, level)
                .await?;
            println!("Set {vehicle_id} battery level to {level}%");
            Ok(())
        }
        Commands::Probe => unreachable!("handled before client construction"),
    }
}

async fn login(client: &TibberClient) -> Result<()> {
    client.authenticate().await.context("Authentication failed")?;

    let homes: HomesData = client
        .query(QUERY_HOMES, serde_json::Value::Null)
        .await
        .context("Could not list homes")?;
    let expires_at = client.token_expires_at().await;

    println!("Authenticated; {} home(s) on this account", homes.viewer.homes.len());
    if let Some(expires_at) = expires_at {
        println!("Token valid until {expires_at}");
    }
    Ok(())
}

async fn status(client: Arc<TibberClient>, vehicle_index: usize) -> Result<()> {
    let coordinator = VehicleCoordinator::new(client, vehicle_index);
    coordinator.refresh().await.context("Refresh failed")?;

    let snapshot = coordinator
        .snapshot()
        .context("No snapshot after a successful refresh")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn watch(client: Arc<TibberClient>, vehicle_index: usize, interval: Duration) -> Result<()> {
    let coordinator = VehicleCoordinator::new(client, vehicle_index);

    tracing::info!(
        interval_secs = interval.as_secs(),
        vehicle_index,
        "watching vehicle state"
    );

    let mut poll = tokio::time::interval(interval);
    let mut reauth = tokio::time::interval_at(
        tokio::time::Instant::now() + TOKEN_REFRESH_INTERVAL,
        TOKEN_REFRESH_INTERVAL,
    );

    loop {
        tokio::select! {
            _ = poll.tick() => {
                match coordinator.refresh().await {
                    Ok(()) => {
                        if let Some(snapshot) = coordinator.snapshot() {
                            println!("{}", serde_json::to_string(&snapshot)?);
                        }
                    }
                    // Keep the last snapshot on any failure; the next tick retries.
                    Err(err) => tracing::warn!(error = %err, "refresh failed"),
                }
            }
            _ = reauth.tick() => {
                if let Err(err) = coordinator.refresh_token().await {
                    tracing::warn!(error = %err, "token refresh failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                return Ok(());
            }
        }
    }
}
