//! Bonding-curve reader.
//!
//! Fetches a token's curve account, decodes the reserve layout, and derives
//! the spot price in SOL per whole token. Any reason the state cannot be
//! read (account not created yet, short data, RPC fault) yields `None`:
//! callers skip the token for this cycle.

use borsh::{BorshDeserialize, BorshSerialize};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::{ChainDataProvider, QUOTE_DECIMALS};
use crate::types::MarketState;

/// Anchor account discriminator preceding the layout.
pub const CURVE_DISCRIMINATOR_LEN: usize = 8;

/// Discriminator + five u64 fields + the `complete` flag.
pub const CURVE_MIN_LEN: usize = CURVE_DISCRIMINATOR_LEN + 5 * 8 + 1;

/// On-chain layout of the curve account after the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BondingCurveLayout {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

/// Decode raw account data. Trailing fields beyond the known layout are
/// ignored.
pub fn decode_bonding_curve(data: &[u8]) -> Option<BondingCurveLayout> {
    if data.len() < CURVE_MIN_LEN {
        return None;
    }
    let mut body = &data[CURVE_DISCRIMINATOR_LEN..];
    BondingCurveLayout::deserialize(&mut body).ok()
}

/// `10^exp` as a decimal, for exponents a token/quote decimal difference
/// can produce.
fn pow10(exp: i32) -> Option<Decimal> {
    if exp >= 0 {
        10u64.checked_pow(exp as u32).map(Decimal::from)
    } else if exp >= -28 {
        Some(Decimal::new(1, exp.unsigned_abs()))
    } else {
        None
    }
}

/// Spot price in quote units per whole base token.
///
/// `(virtual_quote / virtual_base) * 10^(base_decimals - quote_decimals)`,
/// or zero when the base reserve is empty. `None` if the scaled price does
/// not fit a decimal.
pub fn curve_price(
    virtual_base_reserve: u64,
    virtual_quote_reserve: u64,
    base_decimals: u8,
    quote_decimals: u8,
) -> Option<Decimal> {
    if virtual_base_reserve == 0 {
        return Some(Decimal::ZERO);
    }
    let ratio = Decimal::from(virtual_quote_reserve) / Decimal::from(virtual_base_reserve);
    let scale = pow10(i32::from(base_decimals) - i32::from(quote_decimals))?;
    ratio.checked_mul(scale)
}

impl BondingCurveLayout {
    pub fn into_market_state(self, base_decimals: u8) -> Option<MarketState> {
        let price = curve_price(
            self.virtual_token_reserves,
            self.virtual_sol_reserves,
            base_decimals,
            QUOTE_DECIMALS,
        )?;
        Some(MarketState {
            virtual_base_reserve: self.virtual_token_reserves,
            virtual_quote_reserve: self.virtual_sol_reserves,
            real_base_reserve: self.real_token_reserves,
            real_quote_reserve: self.real_sol_reserves,
            total_supply: self.token_total_supply,
            is_complete: self.complete,
            price,
        })
    }
}

pub struct CurveReader {
    chain: Arc<dyn ChainDataProvider>,
}

impl CurveReader {
    pub fn new(chain: Arc<dyn ChainDataProvider>) -> Self {
        Self { chain }
    }

    /// Current market state of a curve, or `None` if it cannot be read now.
    pub async fn read(&self, market_account: &Pubkey, base_decimals: u8) -> Option<MarketState> {
        let data = match self.chain.get_account_data(market_account).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(%market_account, "Curve account not found yet");
                return None;
            }
            Err(e) => {
                warn!(%market_account, error = %e, "Curve account read failed");
                return None;
            }
        };

        let Some(layout) = decode_bonding_curve(&data) else {
            debug!(%market_account, len = data.len(), "Curve account data not decodable");
            return None;
        };
        let state = layout.into_market_state(base_decimals);
        if state.is_none() {
            warn!(%market_account, base_decimals, "Curve price out of range");
        }
        state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
