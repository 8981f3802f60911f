//! Scheduler loop.
//!
//! One cycle: scan the wallet for new creations, register them, run the
//! decision engine over every tracked token in turn, persist, then sleep
//! out the rest of the poll interval. Shutdown is observed between cycles
//! and between tokens; a sell already submitted is always seen through.

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::decision::{DecisionEngine, SkipReason, TokenOutcome};
use super::policy::BackoffPolicy;
use super::scanner::CreationScanner;
use crate::chain::{associated_token_account, bonding_curve_address, TOKEN_DECIMALS};
use crate::storage::StateStore;
use crate::types::{short_id, TokenRecord};

/// Summary of one cycle, logged as `Cycle complete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub new_tokens: usize,
    pub evaluated: usize,
    pub sold: usize,
    pub sell_failures: usize,
    /// Tokens that reached a terminal state other than `sold`.
    pub closed: usize,
    pub skipped: usize,
    /// Tokens whose update the registry refused.
    pub rejected: usize,
    /// The pass stopped early on shutdown.
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    fn record(&mut self, outcome: &TokenOutcome) {
        match outcome {
            TokenOutcome::Inactive => return,
            TokenOutcome::Sold { .. } => self.sold += 1,
            TokenOutcome::SellFailed { retry_pending, .. } => {
                self.sell_failures += 1;
                if !retry_pending {
                    self.closed += 1;
                }
            }
            TokenOutcome::MissedExitWindow | TokenOutcome::Emptied | TokenOutcome::GaveUp => {
                self.closed += 1
            }
            TokenOutcome::Skipped(SkipReason::Rejected) => self.rejected += 1,
            TokenOutcome::Skipped(_) => self.skipped += 1,
            TokenOutcome::Holding { .. } | TokenOutcome::Reset => {}
        }
        self.evaluated += 1;
    }
}

pub struct Scheduler {
    store: Arc<StateStore>,
    scanner: CreationScanner,
    engine: DecisionEngine,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    interval: Duration,
    running: Arc<AtomicBool>,
    watermark: Option<Signature>,
    cycle: u64,
}

impl Scheduler {
    pub fn new(
        store: Arc<StateStore>,
        scanner: CreationScanner,
        engine: DecisionEngine,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            scanner,
            engine,
            clock,
            backoff,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            watermark: None,
            cycle: 0,
        }
    }

    /// Flag the status surface reads to report whether the loop is live.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn watermark(&self) -> Option<Signature> {
        self.watermark
    }

    /// Run cycles until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.interval.as_secs(),
            wallet = %self.scanner.wallet(),
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = self.clock.now();
            let result = self.run_cycle(&shutdown).await;
            let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
            let wait = self.wait_after(&result, elapsed);

            if wait.is_zero() {
                continue;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.clock.sleep(wait) => {}
            }
        }

        info!("Shutdown requested, saving final state");
        self.engine.persist().await;
        self.running.store(false, Ordering::SeqCst);
        info!(cycles = self.cycle, "Scheduler stopped");
    }

    /// Log a finished cycle and pick the pause before the next one: the
    /// rest of the interval, or the extended backoff after a failure.
    fn wait_after(&self, result: &Result<CycleReport>, elapsed: Duration) -> Duration {
        match result {
            Ok(report) => {
                log_cycle_report(report);
                self.interval.saturating_sub(elapsed)
            }
            Err(e) => {
                let backoff = self.backoff.after_cycle_error(self.interval);
                error!(
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Cycle failed, backing off"
                );
                backoff
            }
        }
    }

    /// Run one scan + decision pass.
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Result<CycleReport> {
        self.cycle += 1;
        let started = self.clock.now();
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        debug!(cycle = self.cycle, "Starting cycle");

        // -- Discovery -----------------------------------------------------

        match self.scanner.scan(self.watermark).await {
            Ok(scan) => {
                self.watermark = scan.newest_signature.or(self.watermark);
                report.new_tokens = self.register(&scan.new_token_ids).await?;
                if report.new_tokens > 0 {
                    self.engine.persist().await;
                }
            }
            Err(e) => warn!(error = %e, "Creation scan failed, evaluating tracked tokens only"),
        }

        // -- Decision pass -------------------------------------------------

        for token_id in self.store.token_ids().await {
            if *shutdown.borrow() {
                info!(cycle = self.cycle, "Shutdown requested, stopping pass");
                report.interrupted = true;
                break;
            }

            let outcome = match self.engine.process_token(&token_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(token_id = %short_id(&token_id), error = %e, "Token evaluation failed");
                    TokenOutcome::Skipped(SkipReason::Rejected)
                }
            };
            report.record(&outcome);

            if outcome.retry_pending() {
                let pause = self.backoff.after_failed_sell();
                debug!(token_id = %short_id(&token_id), pause_ms = pause.as_millis() as u64, "Retry backoff");
                self.clock.sleep(pause).await;
            }
        }

        self.engine.persist().await;
        report.duration_ms = (self.clock.now() - started).num_milliseconds().max(0) as u64;
        Ok(report)
    }

    /// Track mints not already in the registry. Returns how many were added.
    async fn register(&self, token_ids: &std::collections::BTreeSet<String>) -> Result<usize> {
        let wallet = *self.scanner.wallet();
        let mut added = 0;

        for token_id in token_ids {
            if self.store.contains(token_id).await {
                continue;
            }
            let mint = Pubkey::from_str(token_id)
                .with_context(|| format!("Scanner reported an invalid mint: {token_id}"))?;
            let record = TokenRecord::new(
                token_id.clone(),
                bonding_curve_address(&mint).to_string(),
                associated_token_account(&wallet, &mint).to_string(),
                TOKEN_DECIMALS,
                self.clock.now(),
            );
            if self.store.insert_new(record).await {
                info!(token_id = %short_id(token_id), "Tracking new token");
                added += 1;
            }
        }

        Ok(added)
    }
}

fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        new_tokens = report.new_tokens,
        evaluated = report.evaluated,
        sold = report.sold,
        sell_failures = report.sell_failures,
        closed = report.closed,
        skipped = report.skipped,
        rejected = report.rejected,
        interrupted = report.interrupted,
        duration_ms = report.duration_ms,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
