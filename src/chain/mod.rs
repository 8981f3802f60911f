//! Chain collaborators.
//!
//! Defines the two seams between the engine and Solana:
//! - `ChainDataProvider` — read-only account, balance, and history lookups
//! - `ExecutionClient` — builds, signs, submits, and confirms sells
//!
//! plus the pump.fun program constants and address derivations the engine
//! needs to register a token.

pub mod executor;
pub mod rpc;
pub mod wallet;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::types::SellOutcome;

// ---------------------------------------------------------------------------
// Program constants
// ---------------------------------------------------------------------------

pub const PUMP_FUN_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("6EF8rrecthR5DkVzkKnJudaNZpkpKHeZQR88MpGkCGyA");
pub const PUMP_FUN_GLOBAL: Pubkey = solana_sdk::pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQgFpxwGJaAhrfeJWyd");
pub const PUMP_FUN_FEE_RECIPIENT: Pubkey = solana_sdk::pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4f57gj");

/// Anchor discriminator of the program's `create` instruction.
pub const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];

/// Anchor discriminator of the program's `sell` instruction.
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

/// Position of the mint in the `create` instruction's account list.
pub const CREATE_MINT_ACCOUNT_INDEX: usize = 0;

/// Every token launched on the curve uses 6 decimals.
pub const TOKEN_DECIMALS: u8 = 6;

/// SOL decimals.
pub const QUOTE_DECIMALS: u8 = 9;

// ---------------------------------------------------------------------------
// Address derivation
// ---------------------------------------------------------------------------

/// Bonding-curve PDA for a mint.
pub fn bonding_curve_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &PUMP_FUN_PROGRAM_ID).0
}

/// Anchor event-authority PDA of the program.
pub fn event_authority_address() -> Pubkey {
    Pubkey::find_program_address(&[b"__event_authority"], &PUMP_FUN_PROGRAM_ID).0
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}

// ---------------------------------------------------------------------------
// Transaction view
// ---------------------------------------------------------------------------

/// The parts of a confirmed transaction the creation scanner inspects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionView {
    /// Static account keys; index 0 is the fee payer.
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<InstructionView>,
    /// The transaction landed but its execution failed.
    pub failed: bool,
}

impl TransactionView {
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }
}

/// A compiled top-level instruction: indexes into `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstructionView {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Sell request
// ---------------------------------------------------------------------------

/// Everything the execution client needs to sell a full holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellRequest {
    pub mint: Pubkey,
    pub market_account: Pubkey,
    pub wallet_token_account: Pubkey,
    /// Raw token amount (smallest unit).
    pub amount: u64,
    /// Minimum SOL output in lamports.
    pub min_output_lamports: u64,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Read access to chain state.
///
/// `Ok(None)` means the account or transaction does not exist (yet);
/// `Err` is a transient fault. Neither is the same as a zero balance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Lamport balance of a system account.
    async fn get_balance(&self, account: &Pubkey) -> Result<Option<u64>>;

    /// Raw token amount held in a token account.
    async fn get_token_balance(&self, account: &Pubkey) -> Result<Option<u64>>;

    /// Raw account data.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Signatures involving `wallet`, newest first. The page starts just
    /// older than `before` (or at the newest) and stops short of `until`.
    async fn get_recent_signatures(
        &self,
        wallet: &Pubkey,
        before: Option<Signature>,
        until: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<Signature>>;

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<TransactionView>>;
}

/// Sell submission. Implementors handle signing, priority fees, and
/// confirmation; every failure comes back as `SellOutcome::Failed`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn submit_sell(&self, request: &SellRequest) -> SellOutcome;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}
