use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use zappies_core::config::AppConfig;
use zappies_core::dashboard::DashboardAggregator;
use zappies_core::logging::{init_logging, OperationTimer};
use zappies_core::memory::{Fixture, MemoryBackend};
use zappies_core::models::TimeWindow;
use zappies_core::session::SessionManager;
use zappies_core::store::SledFlagStore;
use zappies_core::supabase::SupabaseBackend;
use zappies_core::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a dashboard snapshot from a local JSON fixture
    Snapshot {
        /// Path to a fixture file (accounts, businesses, bots, rows)
        #[arg(short, long)]
        fixture: PathBuf,

        /// User to aggregate for
        #[arg(short, long)]
        user: Uuid,

        /// Use a trailing window of this many days instead of week-to-date
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Sign in against the configured backend and print a live snapshot
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,

        /// Use a trailing window of this many days instead of week-to-date
        #[arg(short, long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    let _guard = init_logging(Some(&config.log_level()), None)?;

    info!("Starting zappies-core console");

    let cli = Cli::parse();
    match &cli.command {
        Commands::Snapshot { fixture, user, days } => {
            snapshot_from_fixture(&config, fixture, *user, *days).await?;
        }
        Commands::Login { email, password, days } => {
            login_and_snapshot(&config, email, password, *days).await?;
        }
    }

    Ok(())
}

/// A `--days` argument forces a trailing window; otherwise the configured
/// window mode decides.
fn window_for(config: &AppConfig, days: Option<u32>) -> TimeWindow {
    let now = Utc::now();
    match days {
        Some(days) => TimeWindow::trailing_days(now, days),
        None if config.dashboard.window_mode == "trailing" => {
            TimeWindow::trailing_days(now, config.dashboard.window_days)
        }
        None => TimeWindow::week_to_date(now),
    }
}

/// Aggregate offline data and print the snapshot as JSON.
async fn snapshot_from_fixture(
    config: &AppConfig,
    fixture_path: &PathBuf,
    user_id: Uuid,
    days: Option<u32>,
) -> Result<()> {
    let _timer = OperationTimer::new("snapshot_from_fixture");

    let raw = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("Failed to read fixture {}", fixture_path.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw).context("Invalid fixture file")?;
    let backend = Arc::new(MemoryBackend::from_fixture(fixture));

    let aggregator =
        DashboardAggregator::new(backend, config.dashboard.max_concurrent_businesses);
    let window = window_for(config, days);
    let snapshot = aggregator.aggregate(user_id, &window, Utc::now()).await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Sign in, aggregate the live backend, print the snapshot, sign out.
async fn login_and_snapshot(
    config: &AppConfig,
    email: &str,
    password: &str,
    days: Option<u32>,
) -> Result<()> {
    let _timer = OperationTimer::new("login_and_snapshot");

    InputValidator::validate_email(email)?;
    InputValidator::validate_password(password)?;

    let backend: Arc<SupabaseBackend> = Arc::new(SupabaseBackend::new(&config.backend)?);
    let flags = Arc::new(SledFlagStore::open(std::path::Path::new(
        &config.storage.flag_db_path,
    ))?);
    let manager = SessionManager::new(backend.clone(), flags);
    manager.init().await?;

    let session = manager.sign_in(email, password).await?;
    info!(user_id = %session.user_id, "Signed in");
    if manager.current().first_time {
        info!("First run on this device, marking onboarding as seen");
        manager.complete_onboarding()?;
    }

    let aggregator =
        DashboardAggregator::new(backend, config.dashboard.max_concurrent_businesses);
    let window = window_for(config, days);
    let snapshot = aggregator.aggregate(session.user_id, &window, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Err(err) = manager.sign_out().await {
        warn!(error = %err, "Sign-out failed, local session was cleared anyway");
    }
    Ok(())
}
