//! AUTOSELLER — pump.fun dev-wallet exit bot
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the token registry from disk, starts the status server, and
//! runs the scheduler loop until Ctrl+C.

use anyhow::{Context, Result};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::Signer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use autoseller::chain::executor::{DryRunExecutor, PumpSellExecutor};
use autoseller::chain::rpc::RpcChainClient;
use autoseller::chain::wallet::parse_keypair;
use autoseller::chain::{ChainDataProvider, ExecutionClient, PUMP_FUN_PROGRAM_ID};
use autoseller::config;
use autoseller::dashboard::{self, ConfigView, DashboardState};
use autoseller::engine::policy::{BackoffPolicy, SellPolicy};
use autoseller::engine::scanner::CreationScanner;
use autoseller::engine::{Clock, DecisionEngine, Scheduler, SystemClock};
use autoseller::storage::StateStore;
use autoseller::types::TokenStatus;

const BANNER: &str = r#"
    _   _   _ _____ ___  ___ ___ _    _    ___ ___
   /_\ | | | |_   _/ _ \/ __| __| |  | |  | __| _ \
  / _ \| |_| | | || (_) \__ \ _|| |__| |__| _||   /
 /_/ \_\\___/  |_| \___/|___/___|____|____|___|_|_\

  pump.fun dev-wallet exit bot
"#;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = load_config()?;
    init_logging();

    println!("{BANNER}");
    info!(
        sell_delay_secs = cfg.strategy.sell_delay_secs,
        take_profit_sol = %cfg.strategy.take_profit_sol,
        slippage_percent = %cfg.strategy.slippage_percent,
        poll_interval_secs = cfg.strategy.poll_interval_secs,
        max_sell_retries = cfg.strategy.max_sell_retries,
        dry_run = cfg.execution.dry_run,
        "AUTOSELLER starting up"
    );

    // -- Wallet & RPC ----------------------------------------------------

    let wallet = Arc::new(
        parse_keypair(&cfg.wallet_secret()?).context("Failed to load dev wallet key")?,
    );
    let wallet_pubkey = wallet.pubkey();
    let rpc_url = cfg.rpc_url()?;
    let rpc_client = RpcChainClient::new(&rpc_url);
    let rpc = rpc_client.rpc();
    let chain: Arc<dyn ChainDataProvider> = Arc::new(rpc_client);

    match chain.get_balance(&wallet_pubkey).await {
        Ok(Some(lamports)) => info!(
            wallet = %wallet_pubkey,
            balance_sol = lamports as f64 / LAMPORTS_PER_SOL as f64,
            "Wallet connected"
        ),
        Ok(None) => warn!(wallet = %wallet_pubkey, "Wallet account not found on chain"),
        Err(e) => warn!(wallet = %wallet_pubkey, error = %e, "Could not read wallet balance"),
    }

    let executor: Arc<dyn ExecutionClient> = if cfg.execution.dry_run {
        warn!("Dry-run mode: sells are logged, not sent");
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(PumpSellExecutor::new(rpc, Arc::clone(&wallet), &cfg.execution))
    };
    info!(executor = executor.name(), "Sell executor ready");

    // -- Restore state ---------------------------------------------------

    let store = Arc::new(StateStore::new(&cfg.storage.state_file));
    let restored = store.load().await;
    let active = restored.values().filter(|r| r.status.is_active()).count();
    info!(tracked = restored.len(), active, "Registry restored");

    // -- Engine ----------------------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = DecisionEngine::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        executor,
        SellPolicy::from_config(&cfg.strategy),
        Arc::clone(&clock),
    );
    let scanner = CreationScanner::new(
        Arc::clone(&chain),
        wallet_pubkey,
        PUMP_FUN_PROGRAM_ID,
        cfg.strategy.scan_batch_size,
    )
    .with_max_pages(cfg.strategy.scan_max_pages);
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        scanner,
        engine,
        clock,
        BackoffPolicy::from_config(&cfg.strategy),
        cfg.strategy.poll_interval(),
    );

    // -- Status server ---------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            Arc::clone(&store),
            scheduler.running_flag(),
            ConfigView::from(&cfg),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port);
    }

    // -- Main loop -------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loop_handle = tokio::spawn(scheduler.run(shutdown_rx));
    info!("Entering main loop. Press Ctrl+C to stop.");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
            }
            info!("Shutdown signal received.");
            let _ = shutdown_tx.send(true);
            if let Err(e) = (&mut loop_handle).await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        result = &mut loop_handle => {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }

    let registry = store.persisted().await;
    info!(
        tracked = registry.len(),
        sold = registry.values().filter(|r| r.status == TokenStatus::Sold).count(),
        "AUTOSELLER shut down cleanly."
    );

    Ok(())
}

/// Read `config.toml` if present; otherwise run on defaults plus the
/// environment overrides.
fn load_config() -> Result<config::AppConfig> {
    if std::path::Path::new(CONFIG_PATH).exists() {
        return config::AppConfig::load(CONFIG_PATH);
    }
    let mut cfg = config::AppConfig::default();
    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autoseller=info"));

    let json_logging = std::env::var("AUTOSELLER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
