//! Shared types for the autoseller.
//!
//! The registry data model (token records and their status state machine),
//! decoded market snapshots, sell outcomes, and the crate's domain errors.
//! Everything the engine, storage, and dashboard modules exchange lives here
//! so they can depend on it without depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Token status
// ---------------------------------------------------------------------------

/// Lifecycle status of a tracked token.
///
/// `Monitoring` and `SellFailed` are the active states the decision engine
/// evaluates every cycle. Everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Monitoring,
    SellFailed,
    Sold,
    MissedExitWindow,
    Emptied,
    FailedMaxRetries,
}

impl TokenStatus {
    /// Whether the decision engine still evaluates tokens in this state.
    pub fn is_active(self) -> bool {
        matches!(self, TokenStatus::Monitoring | TokenStatus::SellFailed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Transition table. Keeping the same status is always allowed.
    pub fn can_transition_to(self, next: TokenStatus) -> bool {
        use TokenStatus::*;

        if self == next {
            return true;
        }
        match self {
            Monitoring => matches!(
                next,
                SellFailed | Sold | MissedExitWindow | Emptied | FailedMaxRetries
            ),
            SellFailed => matches!(
                next,
                Monitoring | Sold | FailedMaxRetries | MissedExitWindow | Emptied
            ),
            Sold | MissedExitWindow | Emptied | FailedMaxRetries => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenStatus::Monitoring => "monitoring",
            TokenStatus::SellFailed => "sell_failed",
            TokenStatus::Sold => "sold",
            TokenStatus::MissedExitWindow => "missed_exit_window",
            TokenStatus::Emptied => "emptied",
            TokenStatus::FailedMaxRetries => "failed_max_retries",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Token record & registry
// ---------------------------------------------------------------------------

/// One tracked token launched by the dev wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Mint address (base58). Registry key.
    pub token_id: String,
    /// Bonding-curve account holding the token's reserves.
    pub market_account: String,
    /// The wallet's associated token account for this mint.
    pub wallet_token_account: String,
    pub created_at: DateTime<Utc>,
    pub status: TokenStatus,
    pub sell_attempts: u32,
    /// Estimated value of the wallet's holding, in SOL.
    #[serde(with = "rust_decimal::serde::str")]
    pub last_value: Decimal,
    pub last_check_time: DateTime<Utc>,
    pub sell_tx_reference: Option<String>,
    pub decimals: u8,
}

impl TokenRecord {
    /// A freshly discovered token, in `Monitoring` with no attempts.
    pub fn new(
        token_id: impl Into<String>,
        market_account: impl Into<String>,
        wallet_token_account: impl Into<String>,
        decimals: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            market_account: market_account.into(),
            wallet_token_account: wallet_token_account.into(),
            created_at: now,
            status: TokenStatus::Monitoring,
            sell_attempts: 0,
            last_value: Decimal::ZERO,
            last_check_time: now,
            sell_tx_reference: None,
            decimals,
        }
    }

    /// Time since the token was first registered.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// Short form of the mint for log lines.
    pub fn short_id(&self) -> &str {
        short_id(&self.token_id)
    }
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}… [{}] attempts={} value={} SOL",
            self.short_id(),
            self.status,
            self.sell_attempts,
            self.last_value.round_dp(6),
        )
    }
}

/// First six characters of a token id (or the whole id if shorter).
pub fn short_id(token_id: &str) -> &str {
    token_id.get(..6).unwrap_or(token_id)
}

/// All tracked tokens, keyed by mint. Ordered so snapshots serialize
/// deterministically.
pub type Registry = BTreeMap<String, TokenRecord>;

// ---------------------------------------------------------------------------
// Market state
// ---------------------------------------------------------------------------

/// Decoded bonding-curve account plus the derived spot price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    pub virtual_base_reserve: u64,
    pub virtual_quote_reserve: u64,
    pub real_base_reserve: u64,
    pub real_quote_reserve: u64,
    pub total_supply: u64,
    /// The curve has completed and liquidity migrated off the program.
    pub is_complete: bool,
    /// SOL per whole token.
    pub price: Decimal,
}

// ---------------------------------------------------------------------------
// Sell outcome
// ---------------------------------------------------------------------------

/// Result of a sell submission. Chain-side rejections and confirmation
/// timeouts are `Failed`, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellOutcome {
    Confirmed {
        signature: String,
    },
    Failed {
        signature: Option<String>,
        reason: String,
    },
}

impl SellOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SellOutcome::Confirmed { .. })
    }

    /// The reference stored on the token record for this outcome.
    pub fn tx_reference(&self) -> String {
        match self {
            SellOutcome::Confirmed { signature } => signature.clone(),
            SellOutcome::Failed {
                signature: Some(sig),
                ..
            } => format!("failed_{sig}"),
            SellOutcome::Failed { signature: None, .. } => "failed_no_sig".to_string(),
        }
    }
}

impl fmt::Display for SellOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SellOutcome::Confirmed { signature } => write!(f, "confirmed {signature}"),
            SellOutcome::Failed { signature, reason } => write!(
                f,
                "failed ({reason}) sig={}",
                signature.as_deref().unwrap_or("none")
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the autoseller.
#[derive(Debug, thiserror::Error)]
pub enum AutosellerError {
    #[error("Token not tracked: {0}")]
    UnknownToken(String),

    #[error("Token already tracked: {0}")]
    DuplicateToken(String),

    #[error("Invalid status transition for {token_id}: {from} -> {to}")]
    InvalidTransition {
        token_id: String,
        from: TokenStatus,
        to: TokenStatus,
    },

    #[error("Immutable field `{field}` changed on {token_id}")]
    ImmutableField { token_id: String, field: &'static str },

    #[error("Sell attempts for {token_id} went from {from} to {to} outside a failure reset")]
    AttemptCounter { token_id: String, from: u32, to: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ALL: [TokenStatus; 6] = [
        TokenStatus::Monitoring,
        TokenStatus::SellFailed,
        TokenStatus::Sold,
        TokenStatus::MissedExitWindow,
        TokenStatus::Emptied,
        TokenStatus::FailedMaxRetries,
    ];

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TokenStatus::MissedExitWindow).unwrap();
        assert_eq!(json, "\"missed_exit_window\"");
        let back: TokenStatus = serde_json::from_str("\"failed_max_retries\"").unwrap();
        assert_eq!(back, TokenStatus::FailedMaxRetries);
    }

    #[test]
    fn test_status_display_matches_serde() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn test_terminal_states_never_left() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert_eq!(from.can_transition_to(to), from == to, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_monitoring_cannot_be_reentered_from_terminal() {
        assert!(!TokenStatus::Sold.can_transition_to(TokenStatus::Monitoring));
        assert!(!TokenStatus::Emptied.can_transition_to(TokenStatus::SellFailed));
    }

    #[test]
    fn test_active_edges() {
        assert!(TokenStatus::Monitoring.can_transition_to(TokenStatus::SellFailed));
        assert!(TokenStatus::Monitoring.can_transition_to(TokenStatus::FailedMaxRetries));
        assert!(TokenStatus::SellFailed.can_transition_to(TokenStatus::Monitoring));
        assert!(TokenStatus::SellFailed.can_transition_to(TokenStatus::Sold));
        assert!(TokenStatus::SellFailed.can_transition_to(TokenStatus::FailedMaxRetries));
    }

    #[test]
    fn test_new_record_defaults() {
        let now = Utc::now();
        let rec = TokenRecord::new("MintAddress111", "Curve", "Ata", 6, now);
        assert_eq!(rec.status, TokenStatus::Monitoring);
        assert_eq!(rec.sell_attempts, 0);
        assert_eq!(rec.last_value, Decimal::ZERO);
        assert_eq!(rec.created_at, now);
        assert_eq!(rec.last_check_time, now);
        assert!(rec.sell_tx_reference.is_none());
        assert_eq!(rec.short_id(), "MintAd");
    }

    #[test]
    fn test_short_id_handles_short_ids() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn test_last_value_serialized_as_string() {
        let mut rec = TokenRecord::new("M", "C", "A", 6, Utc::now());
        rec.last_value = dec!(0.0100);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["last_value"], "0.0100");

        let back: TokenRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.last_value.to_string(), "0.0100");
    }

    #[test]
    fn test_sell_outcome_references() {
        let ok = SellOutcome::Confirmed { signature: "5sig".into() };
        assert!(ok.is_confirmed());
        assert_eq!(ok.tx_reference(), "5sig");

        let failed = SellOutcome::Failed {
            signature: Some("5sig".into()),
            reason: "slippage".into(),
        };
        assert!(!failed.is_confirmed());
        assert_eq!(failed.tx_reference(), "failed_5sig");

        let unsent = SellOutcome::Failed {
            signature: None,
            reason: "blockhash".into(),
        };
        assert_eq!(unsent.tx_reference(), "failed_no_sig");
    }

    #[test]
    fn test_error_messages() {
        let err = AutosellerError::InvalidTransition {
            token_id: "Mint".into(),
            from: TokenStatus::Sold,
            to: TokenStatus::Monitoring,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition for Mint: sold -> monitoring"
        );
    }
}
