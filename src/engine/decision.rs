//! Decision engine.
//!
//! Evaluates one active token per call: reads the curve and the wallet's
//! balance, values the holding, asks the `SellPolicy` what to do, and
//! applies the result through the store. Deciding, recording a sell
//! attempt, and applying a sell outcome are separate steps so each can be
//! exercised on its own.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::curve::CurveReader;
use super::policy::{Decision, SellPolicy};
use crate::chain::{ChainDataProvider, ExecutionClient, SellRequest};
use crate::storage::StateStore;
use crate::types::{short_id, SellOutcome, TokenRecord, TokenStatus};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a token was passed over this cycle without a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    InvalidAccount,
    CurveUnavailable,
    BalanceUnavailable,
    /// The holding's value overflowed decimal range.
    ValueUnavailable,
    WorthlessSell,
    /// The registry refused a mutation for this token.
    Rejected,
}

/// What happened to one token in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Already terminal; not evaluated.
    Inactive,
    Skipped(SkipReason),
    Holding { value: Decimal },
    /// A failed sell was reset to monitoring.
    Reset,
    MissedExitWindow,
    Emptied,
    GaveUp,
    Sold { signature: String },
    SellFailed { attempts: u32, retry_pending: bool },
}

impl TokenOutcome {
    /// Whether the scheduler should apply the retry backoff after this token.
    pub fn retry_pending(&self) -> bool {
        matches!(self, TokenOutcome::SellFailed { retry_pending: true, .. })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    store: Arc<StateStore>,
    chain: Arc<dyn ChainDataProvider>,
    executor: Arc<dyn ExecutionClient>,
    curve: CurveReader,
    policy: SellPolicy,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    pub fn new(
        store: Arc<StateStore>,
        chain: Arc<dyn ChainDataProvider>,
        executor: Arc<dyn ExecutionClient>,
        policy: SellPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let curve = CurveReader::new(Arc::clone(&chain));
        Self {
            store,
            chain,
            executor,
            curve,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &SellPolicy {
        &self.policy
    }

    /// Evaluate one token and act on it.
    ///
    /// Transient chain faults skip the token for this cycle. An `Err` means
    /// the registry rejected a mutation, which the caller logs.
    pub async fn process_token(&self, token_id: &str) -> Result<TokenOutcome> {
        let Some(record) = self.store.get(token_id).await else {
            return Ok(TokenOutcome::Skipped(SkipReason::Missing));
        };
        if !record.status.is_active() {
            return Ok(TokenOutcome::Inactive);
        }

        let now = self.clock.now();
        self.store
            .upsert(token_id, |r| r.last_check_time = now)
            .await?;

        let (Some(mint), Some(market), Some(wallet_ata)) = (
            parse_key(&record.token_id),
            parse_key(&record.market_account),
            parse_key(&record.wallet_token_account),
        ) else {
            warn!(token_id = %record.short_id(), "Record holds an invalid account address");
            return Ok(TokenOutcome::Skipped(SkipReason::InvalidAccount));
        };

        // -- Market --------------------------------------------------------

        let Some(market_state) = self.curve.read(&market, record.decimals).await else {
            debug!(token_id = %record.short_id(), "Curve unavailable, skipping");
            return Ok(TokenOutcome::Skipped(SkipReason::CurveUnavailable));
        };

        if market_state.is_complete {
            self.transition(token_id, TokenStatus::MissedExitWindow).await?;
            info!(token_id = %record.short_id(), "Curve complete, exit window missed");
            return Ok(TokenOutcome::MissedExitWindow);
        }

        // -- Holding -------------------------------------------------------

        let balance = match self.chain.get_token_balance(&wallet_ata).await {
            Ok(Some(amount)) => amount,
            Ok(None) => 0,
            Err(e) => {
                warn!(token_id = %record.short_id(), error = %e, "Balance read failed, skipping");
                return Ok(TokenOutcome::Skipped(SkipReason::BalanceUnavailable));
            }
        };

        if balance == 0 {
            self.transition(token_id, TokenStatus::Emptied).await?;
            info!(token_id = %record.short_id(), "Wallet holds none of this token");
            return Ok(TokenOutcome::Emptied);
        }

        let Some(value) = holding_value(balance, record.decimals, market_state.price) else {
            warn!(
                token_id = %record.short_id(),
                balance,
                price = %market_state.price,
                "Holding value out of range, skipping"
            );
            return Ok(TokenOutcome::Skipped(SkipReason::ValueUnavailable));
        };
        let record = self
            .store
            .upsert(token_id, |r| r.last_value = value)
            .await?;

        debug!(
            token_id = %record.short_id(),
            balance,
            price = %market_state.price,
            value_sol = %value.round_dp(9),
            age_secs = record.age(now).num_seconds(),
            "Token valued"
        );

        // -- Decision ------------------------------------------------------

        match self.policy.decide(&record, value, now) {
            Decision::Hold => Ok(TokenOutcome::Holding { value }),
            Decision::ResetFailure => {
                self.store
                    .upsert(token_id, |r| {
                        r.status = TokenStatus::Monitoring;
                        r.sell_attempts = 0;
                    })
                    .await?;
                self.persist().await;
                info!(token_id = %record.short_id(), value_sol = %value, "Nothing to sell, failed sell reset to monitoring");
                Ok(TokenOutcome::Reset)
            }
            Decision::GiveUp { attempts } => {
                self.transition(token_id, TokenStatus::FailedMaxRetries).await?;
                warn!(token_id = %record.short_id(), attempts, "Sell retries exhausted");
                Ok(TokenOutcome::GaveUp)
            }
            Decision::SkipWorthless { reason } => {
                warn!(
                    token_id = %record.short_id(),
                    %reason,
                    value_sol = %value,
                    "Minimum output rounds to zero, not selling"
                );
                Ok(TokenOutcome::Skipped(SkipReason::WorthlessSell))
            }
            Decision::Sell {
                reason,
                min_output_lamports,
            } => {
                let attempt = self.record_attempt(token_id).await?;
                info!(
                    token_id = %record.short_id(),
                    %reason,
                    attempt,
                    value_sol = %value.round_dp(9),
                    "Sell triggered"
                );

                let request = SellRequest {
                    mint,
                    market_account: market,
                    wallet_token_account: wallet_ata,
                    amount: balance,
                    min_output_lamports,
                };
                let outcome = self.executor.submit_sell(&request).await;
                self.apply_result(token_id, &outcome).await
            }
        }
    }

    /// Count a sell attempt and persist it before anything is submitted.
    /// Returns the new attempt number.
    pub async fn record_attempt(&self, token_id: &str) -> Result<u32> {
        let record = self
            .store
            .upsert(token_id, |r| r.sell_attempts += 1)
            .await?;
        self.persist().await;
        Ok(record.sell_attempts)
    }

    /// Apply a sell outcome to the token's record.
    pub async fn apply_result(&self, token_id: &str, outcome: &SellOutcome) -> Result<TokenOutcome> {
        let reference = outcome.tx_reference();

        match outcome {
            SellOutcome::Confirmed { signature } => {
                self.store
                    .upsert(token_id, |r| {
                        r.status = TokenStatus::Sold;
                        r.sell_tx_reference = Some(reference);
                    })
                    .await?;
                self.persist().await;
                info!(token_id = %short_id(token_id), %signature, "Token sold");
                Ok(TokenOutcome::Sold {
                    signature: signature.clone(),
                })
            }
            SellOutcome::Failed { reason, .. } => {
                let max_retries = self.policy.max_retries;
                let record = self
                    .store
                    .upsert(token_id, |r| {
                        r.sell_tx_reference = Some(reference);
                        r.status = if r.sell_attempts >= max_retries {
                            TokenStatus::FailedMaxRetries
                        } else {
                            TokenStatus::SellFailed
                        };
                    })
                    .await?;
                self.persist().await;

                let attempts = record.sell_attempts;
                let retry_pending = record.status == TokenStatus::SellFailed;
                if retry_pending {
                    warn!(
                        token_id = %record.short_id(),
                        attempts,
                        max_retries,
                        %reason,
                        "Sell failed, will retry"
                    );
                } else {
                    error!(
                        token_id = %record.short_id(),
                        attempts,
                        %reason,
                        "Sell failed, retries exhausted"
                    );
                }
                Ok(TokenOutcome::SellFailed {
                    attempts,
                    retry_pending,
                })
            }
        }
    }

    /// Move a token to `status` and persist.
    async fn transition(&self, token_id: &str, status: TokenStatus) -> Result<TokenRecord> {
        let record = self
            .store
            .upsert(token_id, |r| r.status = status)
            .await
            .with_context(|| format!("Failed to move {} to {status}", short_id(token_id)))?;
        self.persist().await;
        Ok(record)
    }

    /// Save the registry. A failed save leaves the previous snapshot in
    /// place and is retried on the next status change or cycle end.
    pub async fn persist(&self) {
        if let Err(e) = self.store.save().await {
            error!(error = %e, "Failed to persist state");
        }
    }
}

fn parse_key(address: &str) -> Option<Pubkey> {
    Pubkey::from_str(address).ok()
}

/// Value in SOL of `balance` raw units priced at `price` SOL per token.
/// `None` if the amount or the product leaves decimal range.
pub fn holding_value(balance: u64, decimals: u8, price: Decimal) -> Option<Decimal> {
    let tokens = Decimal::try_from_i128_with_scale(i128::from(balance), u32::from(decimals)).ok()?;
    tokens.checked_mul(price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
