//! Creation scanner.
//!
//! Walks the dev wallet's newest transactions and picks out the ones where
//! the wallet paid for a `create` instruction on the pump.fun program. The
//! scanner only reports mints; deciding whether a mint is new to the
//! registry is the caller's job.

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{ChainDataProvider, TransactionView, CREATE_DISCRIMINATOR, CREATE_MINT_ACCOUNT_INDEX};

/// Result of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Distinct mints created by the wallet in the scanned range.
    pub new_token_ids: BTreeSet<String>,
    /// Watermark for the next scan. Never older than the one passed in.
    pub newest_signature: Option<Signature>,
    /// Number of signatures inspected.
    pub signatures_seen: usize,
}

/// History pages read per scan unless configured otherwise.
pub const DEFAULT_MAX_PAGES: usize = 10;

pub struct CreationScanner {
    chain: Arc<dyn ChainDataProvider>,
    wallet: Pubkey,
    program_id: Pubkey,
    batch_size: usize,
    max_pages: usize,
}

impl CreationScanner {
    pub fn new(chain: Arc<dyn ChainDataProvider>, wallet: Pubkey, program_id: Pubkey, batch_size: usize) -> Self {
        Self {
            chain,
            wallet,
            program_id,
            batch_size,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn wallet(&self) -> &Pubkey {
        &self.wallet
    }

    /// Scan signatures newer than `since` for token creations.
    ///
    /// Fails only if the signature list itself cannot be fetched. A single
    /// transaction that cannot be fetched or parsed is skipped.
    pub async fn scan(&self, since: Option<Signature>) -> Result<ScanResult> {
        let signatures = self.fetch_since(since).await?;

        let mut result = ScanResult {
            new_token_ids: BTreeSet::new(),
            newest_signature: signatures.first().copied().or(since),
            signatures_seen: signatures.len(),
        };

        if signatures.is_empty() {
            return Ok(result);
        }
        debug!(count = signatures.len(), "Inspecting new wallet signatures");

        for signature in &signatures {
            let tx = match self.chain.get_transaction(signature).await {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    debug!(%signature, "Transaction not available yet, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(%signature, error = %e, "Transaction fetch failed, skipping");
                    continue;
                }
            };

            if let Some(mint) = find_created_mint(&tx, &self.wallet, &self.program_id) {
                info!(%signature, token_id = %mint, "Token creation by wallet detected");
                result.new_token_ids.insert(mint.to_string());
            }
        }

        Ok(result)
    }

    /// Every signature newer than `since`, newest first.
    ///
    /// Pages backwards with `before` until a short page comes back, so a
    /// burst larger than one batch is read in full. Past `max_pages` the
    /// older remainder is dropped with a warning.
    async fn fetch_since(&self, since: Option<Signature>) -> Result<Vec<Signature>> {
        let mut signatures: Vec<Signature> = Vec::new();

        for page in 1..=self.max_pages {
            let before = signatures.last().copied();
            let batch = self
                .chain
                .get_recent_signatures(&self.wallet, before, since, self.batch_size)
                .await?;
            let full = batch.len() >= self.batch_size;
            signatures.extend(batch);

            if !full {
                return Ok(signatures);
            }
            if page == self.max_pages {
                warn!(
                    pages = page,
                    signatures = signatures.len(),
                    "Scan page limit reached, older signatures left unread"
                );
            }
        }

        Ok(signatures)
    }
}

/// The mint of a `create` instruction the wallet paid for, if `tx` has one.
///
/// Out-of-range indexes and short instruction data are treated as "not a
/// creation" rather than errors.
pub fn find_created_mint(tx: &TransactionView, wallet: &Pubkey, program_id: &Pubkey) -> Option<Pubkey> {
    if tx.failed || tx.fee_payer() != Some(wallet) {
        return None;
    }

    tx.instructions
        .iter()
        .filter(|ix| tx.account_keys.get(usize::from(ix.program_id_index)) == Some(program_id))
        .find(|ix| ix.data.starts_with(&CREATE_DISCRIMINATOR))
        .and_then(|ix| {
            let key_index = *ix.accounts.get(CREATE_MINT_ACCOUNT_INDEX)?;
            tx.account_keys.get(usize::from(key_index)).copied()
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
