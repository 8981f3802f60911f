//! End-to-end token lifecycle scenarios.
//!
//! Each test wires the real scanner, decision engine, store, and scheduler
//! to the in-memory chain and drives cycles by hand with a manual clock.

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_test::{assert_err, assert_ok};

use autoseller::chain::PUMP_FUN_PROGRAM_ID;
use autoseller::config::StrategyConfig;
use autoseller::engine::clock::{Clock, ManualClock};
use autoseller::engine::policy::{BackoffPolicy, SellPolicy};
use autoseller::engine::scanner::CreationScanner;
use autoseller::engine::{DecisionEngine, Scheduler};
use autoseller::storage::StateStore;
use autoseller::types::{SellOutcome, TokenStatus};

use crate::mock_chain::{FakeChain, FakeExecutor};

/// 1M virtual tokens against 1000 lamports: 0.000001 SOL per whole token.
const VIRTUAL_TOKENS: u64 = 1_000_000;
const VIRTUAL_SOL: u64 = 1_000;
/// 10,000 whole tokens (6 decimals), worth 0.01 SOL at the price above.
const HOLDING: u64 = 10_000_000_000;

struct Harness {
    chain: Arc<FakeChain>,
    executor: Arc<FakeExecutor>,
    clock: Arc<ManualClock>,
    store: Arc<StateStore>,
    scheduler: Scheduler,
    wallet: Pubkey,
    shutdown: watch::Receiver<bool>,
    _shutdown_tx: watch::Sender<bool>,
}

impl Harness {
    fn new(strategy: StrategyConfig) -> Self {
        let chain = FakeChain::new();
        let executor = FakeExecutor::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let path = std::env::temp_dir().join(format!("autoseller_it_{}.json", uuid::Uuid::new_v4()));
        let store = Arc::new(StateStore::new(path));
        let wallet = Pubkey::new_unique();

        let engine = DecisionEngine::new(
            Arc::clone(&store),
            chain.clone(),
            executor.clone(),
            SellPolicy::from_config(&strategy),
            clock.clone(),
        );
        let scanner = CreationScanner::new(chain.clone(), wallet, PUMP_FUN_PROGRAM_ID, strategy.scan_batch_size)
            .with_max_pages(strategy.scan_max_pages);
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            scanner,
            engine,
            clock.clone(),
            BackoffPolicy::from_config(&strategy),
            strategy.poll_interval(),
        );
        let (tx, rx) = watch::channel(false);

        Self {
            chain,
            executor,
            clock,
            store,
            scheduler,
            wallet,
            shutdown: rx,
            _shutdown_tx: tx,
        }
    }

    /// Launch a token from the dev wallet with the default curve and holding.
    fn launch(&self) -> Pubkey {
        let mint = Pubkey::new_unique();
        self.chain.add_creation(self.wallet, mint);
        self.chain.set_curve(&mint, VIRTUAL_TOKENS, VIRTUAL_SOL, false);
        self.chain.set_holding(&self.wallet, &mint, HOLDING);
        mint
    }

    async fn cycle(&mut self) {
        assert_ok!(self.scheduler.run_cycle(&self.shutdown).await);
    }

    async fn status(&self, mint: &Pubkey) -> TokenStatus {
        self.store.get(&mint.to_string()).await.unwrap().status
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(self.store.path());
    }
}

fn strategy() -> StrategyConfig {
    StrategyConfig {
        sell_delay_secs: 15,
        take_profit_sol: dec!(0.05),
        slippage_percent: dec!(25),
        max_sell_retries: 3,
        ..StrategyConfig::default()
    }
}

#[tokio::test]
async fn test_age_triggered_sell() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Monitoring);
    assert!(h.executor.requests().is_empty());

    h.clock.advance(Duration::from_secs(20));
    h.cycle().await;

    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::Sold);
    assert_eq!(rec.sell_attempts, 1);
    assert_eq!(rec.last_value, dec!(0.01));
    assert_eq!(rec.sell_tx_reference.as_deref(), Some("fake-sig-1"));

    let requests = h.executor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].mint, mint);
    assert_eq!(requests[0].amount, HOLDING);
    assert_eq!(requests[0].min_output_lamports, 7_500_000);

    // Sold tokens are never evaluated again.
    h.clock.advance(Duration::from_secs(20));
    h.cycle().await;
    assert_eq!(h.executor.requests().len(), 1);
    h.cleanup();
}

#[tokio::test]
async fn test_profit_triggered_sell() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    // 10x the holding: 0.1 SOL, above the 0.05 target.
    h.chain.set_holding(&h.wallet, &mint, HOLDING * 10);

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Sold);
    assert_eq!(h.executor.requests()[0].min_output_lamports, 75_000_000);
    h.cleanup();
}

#[tokio::test]
async fn test_complete_curve_missed_exit_window() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.chain.set_curve(&mint, VIRTUAL_TOKENS, VIRTUAL_SOL, true);
    h.clock.advance(Duration::from_secs(60));

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::MissedExitWindow);
    assert!(h.executor.requests().is_empty());
    h.cleanup();
}

#[tokio::test]
async fn test_retries_exhausted() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.executor.fail_every_sell();
    h.cycle().await;
    h.clock.advance(Duration::from_secs(20));

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::SellFailed);
    h.cycle().await;
    h.cycle().await;

    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::FailedMaxRetries);
    assert_eq!(rec.sell_attempts, 3);
    assert_eq!(rec.sell_tx_reference.as_deref(), Some("failed_fake-sig-3"));
    assert_eq!(h.executor.requests().len(), 3);

    // Retry backoff only between retryable failures.
    let retry_sleeps = h
        .clock
        .sleeps()
        .into_iter()
        .filter(|d| *d == Duration::from_secs(2))
        .count();
    assert_eq!(retry_sleeps, 2);

    h.cycle().await;
    assert_eq!(h.executor.requests().len(), 3);
    h.cleanup();
}

#[tokio::test]
async fn test_curve_completes_after_failed_sell() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.executor.push_outcome(SellOutcome::Failed {
        signature: Some("5late".into()),
        reason: "slippage exceeded".into(),
    });
    h.cycle().await;
    h.clock.advance(Duration::from_secs(20));

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::SellFailed);

    h.chain.set_curve(&mint, VIRTUAL_TOKENS, VIRTUAL_SOL, true);
    h.cycle().await;
    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::MissedExitWindow);
    assert_eq!(rec.sell_attempts, 1);

    h.cycle().await;
    assert_eq!(h.executor.requests().len(), 1);
    assert_eq!(
        h.store.persisted().await[&mint.to_string()].status,
        TokenStatus::MissedExitWindow
    );
    h.cleanup();
}

#[tokio::test]
async fn test_holding_drained_after_failed_sell() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.executor.push_outcome(SellOutcome::Failed {
        signature: None,
        reason: "transaction not confirmed".into(),
    });
    h.cycle().await;
    h.clock.advance(Duration::from_secs(20));

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::SellFailed);

    h.chain.set_holding(&h.wallet, &mint, 0);
    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Emptied);

    h.chain.set_holding(&h.wallet, &mint, HOLDING);
    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Emptied);
    assert_eq!(h.executor.requests().len(), 1);
    h.cleanup();
}

#[tokio::test]
async fn test_creation_burst_larger_than_one_batch() {
    let mut h = Harness::new(strategy());
    let burst = strategy().scan_batch_size + 1;

    h.cycle().await;
    assert_eq!(h.scheduler.watermark(), None);

    let first: Vec<Pubkey> = (0..burst).map(|_| h.launch()).collect();
    h.cycle().await;
    for mint in &first {
        assert!(h.store.contains(&mint.to_string()).await, "missed {mint}");
    }

    // Same again with a watermark in place.
    let second: Vec<Pubkey> = (0..burst).map(|_| h.launch()).collect();
    h.cycle().await;
    for mint in &second {
        assert!(h.store.contains(&mint.to_string()).await, "missed {mint}");
    }
    assert_eq!(h.store.get_all().await.len(), 2 * burst);
    h.cleanup();
}

#[tokio::test]
async fn test_holding_drained_is_emptied() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Monitoring);

    h.chain.set_holding(&h.wallet, &mint, 0);
    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Emptied);
    assert!(h.executor.requests().is_empty());
    h.cleanup();
}

#[tokio::test]
async fn test_closed_token_account_is_emptied() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.chain.close_token_account(&h.wallet, &mint);

    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Emptied);
    h.cleanup();
}

#[tokio::test]
async fn test_failed_sell_resets_when_profit_fades() {
    let mut h = Harness::new(StrategyConfig {
        sell_delay_secs: 3600,
        ..strategy()
    });
    let mint = h.launch();
    h.chain.set_holding(&h.wallet, &mint, HOLDING * 10);
    h.executor.push_outcome(SellOutcome::Failed {
        signature: None,
        reason: "blockhash expired".into(),
    });

    h.cycle().await;
    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::SellFailed);
    assert_eq!(rec.sell_attempts, 1);
    assert_eq!(rec.sell_tx_reference.as_deref(), Some("failed_no_sig"));

    // Price halves twice: 0.025 SOL, under the target.
    h.chain.set_curve(&mint, VIRTUAL_TOKENS * 4, VIRTUAL_SOL, false);
    h.cycle().await;
    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::Monitoring);
    assert_eq!(rec.sell_attempts, 0);
    assert_eq!(rec.last_value, dec!(0.025));
    h.cleanup();
}

#[tokio::test]
async fn test_transient_balance_error_skips_token() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.cycle().await;
    h.chain.set_balance_error("node is behind");
    h.clock.advance(Duration::from_secs(30));

    h.cycle().await;
    let rec = h.store.get(&mint.to_string()).await.unwrap();
    assert_eq!(rec.status, TokenStatus::Monitoring);
    assert_eq!(rec.last_check_time, h.clock.now());
    assert!(h.executor.requests().is_empty());

    h.chain.clear_balance_error();
    h.cycle().await;
    assert_eq!(h.status(&mint).await, TokenStatus::Sold);
    h.cleanup();
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let mut h = Harness::new(strategy());
    let sold = h.launch();
    h.cycle().await;
    h.clock.advance(Duration::from_secs(20));
    h.cycle().await;
    let watching = h.launch();
    h.cycle().await;

    let restarted = StateStore::new(h.store.path());
    let registry = restarted.load().await;
    assert_eq!(registry.len(), 2);
    assert_eq!(registry[&sold.to_string()].status, TokenStatus::Sold);
    assert_eq!(registry[&watching.to_string()].status, TokenStatus::Monitoring);

    let before = std::fs::read(h.store.path()).unwrap();
    assert_ok!(restarted.save().await);
    assert_eq!(std::fs::read(h.store.path()).unwrap(), before);
    h.cleanup();
}

#[tokio::test]
async fn test_terminal_status_cannot_be_reopened() {
    let mut h = Harness::new(strategy());
    let mint = h.launch();
    h.chain.set_curve(&mint, VIRTUAL_TOKENS, VIRTUAL_SOL, true);
    h.cycle().await;

    assert_err!(
        h.store
            .upsert(&mint.to_string(), |r| r.status = TokenStatus::Monitoring)
            .await
    );
    assert_eq!(h.status(&mint).await, TokenStatus::MissedExitWindow);
    h.cleanup();
}
