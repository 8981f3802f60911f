//! Sell policy.
//!
//! Pure decision logic: given a token record, its current holding value,
//! and the time, decide whether to hold, reset a failed sell, give up, or
//! sell and with what minimum output. No I/O happens here.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use std::fmt;
use std::time::Duration;

use crate::config::StrategyConfig;
use crate::types::{TokenRecord, TokenStatus};

// ---------------------------------------------------------------------------
// Trigger & decision
// ---------------------------------------------------------------------------

/// Why a sell fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    /// The token outlived the sell delay.
    Age { elapsed_secs: i64 },
    /// The holding reached the take-profit target.
    Profit { target: Decimal },
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Age { elapsed_secs } => write!(f, "age {elapsed_secs}s"),
            TriggerReason::Profit { target } => write!(f, "profit >= {target} SOL"),
        }
    }
}

/// What to do with an active token this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No trigger; leave the record as it is.
    Hold,
    /// The last sell failed and nothing will be sent this cycle, either
    /// because no trigger fires or because the output rounds to zero: back
    /// to monitoring, attempts 0.
    ResetFailure,
    /// Triggered, but the retry budget is spent.
    GiveUp { attempts: u32 },
    /// Triggered, but the holding is worth nothing after slippage.
    SkipWorthless { reason: TriggerReason },
    /// Submit a sell.
    Sell {
        reason: TriggerReason,
        min_output_lamports: u64,
    },
}

// ---------------------------------------------------------------------------
// Sell policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SellPolicy {
    pub sell_delay: chrono::Duration,
    /// Take-profit target in SOL.
    pub take_profit_sol: Decimal,
    /// Accepted shortfall below the estimated value, in percent.
    pub slippage_percent: Decimal,
    pub max_retries: u32,
}

impl SellPolicy {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            sell_delay: chrono::Duration::seconds(config.sell_delay_secs as i64),
            take_profit_sol: config.take_profit_sol,
            slippage_percent: config.slippage_percent,
            max_retries: config.max_sell_retries,
        }
    }

    /// Whether a sell should fire. Age is reported when both conditions hold.
    pub fn trigger(&self, age: chrono::Duration, value: Decimal) -> Option<TriggerReason> {
        if age >= self.sell_delay {
            Some(TriggerReason::Age {
                elapsed_secs: age.num_seconds(),
            })
        } else if value >= self.take_profit_sol {
            Some(TriggerReason::Profit {
                target: self.take_profit_sol,
            })
        } else {
            None
        }
    }

    /// Minimum acceptable sell output, truncated to whole lamports.
    pub fn min_output_lamports(&self, value: Decimal) -> u64 {
        let keep = (dec!(100) - self.slippage_percent) / dec!(100);
        let min_sol = (value * keep).max(Decimal::ZERO);
        min_sol
            .checked_mul(Decimal::from(LAMPORTS_PER_SOL))
            .map(|l| l.trunc())
            .and_then(|l| l.to_u64())
            .unwrap_or(0)
    }

    /// Decide the next step for an active record holding `value` SOL.
    pub fn decide(&self, record: &TokenRecord, value: Decimal, now: DateTime<Utc>) -> Decision {
        let Some(reason) = self.trigger(record.age(now), value) else {
            return if record.status == TokenStatus::SellFailed {
                Decision::ResetFailure
            } else {
                Decision::Hold
            };
        };

        if record.sell_attempts >= self.max_retries {
            return Decision::GiveUp {
                attempts: record.sell_attempts,
            };
        }

        match self.min_output_lamports(value) {
            0 if record.status == TokenStatus::SellFailed => Decision::ResetFailure,
            0 => Decision::SkipWorthless { reason },
            min_output_lamports => Decision::Sell {
                reason,
                min_output_lamports,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Pauses the scheduler inserts after failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub retry_delay: Duration,
    pub cycle_error_multiplier: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            cycle_error_multiplier: config.cycle_error_backoff_multiplier,
        }
    }

    /// Pause before moving on after a failed sell that will be retried.
    pub fn after_failed_sell(&self) -> Duration {
        self.retry_delay
    }

    /// Pause after a cycle aborted with an unexpected error.
    pub fn after_cycle_error(&self, interval: Duration) -> Duration {
        interval.saturating_mul(self.cycle_error_multiplier)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
