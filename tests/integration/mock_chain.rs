//! In-memory chain and sell executor for integration testing.
//!
//! `FakeChain` holds wallet history, curve accounts, and token balances
//! that test code edits between cycles. `FakeExecutor` records every sell
//! it is asked to submit and answers from a scripted queue.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use autoseller::chain::{
    associated_token_account, bonding_curve_address, ChainDataProvider, ExecutionClient,
    InstructionView, SellRequest, TransactionView, CREATE_DISCRIMINATOR, PUMP_FUN_PROGRAM_ID,
};
use autoseller::engine::curve::BondingCurveLayout;
use autoseller::types::SellOutcome;

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeChain {
    /// Wallet history, newest first.
    history: Mutex<Vec<(Signature, TransactionView)>>,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    token_balances: Mutex<HashMap<Pubkey, u64>>,
    /// If set, token balance reads fail with this message.
    balance_error: Mutex<Option<String>>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a `create` transaction paid by `wallet` and return its signature.
    pub fn add_creation(&self, wallet: Pubkey, mint: Pubkey) -> Signature {
        let signature = Signature::new_unique();
        let mut data = CREATE_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&[4, 0, 0, 0, b'T', b'E', b'S', b'T']);
        let tx = TransactionView {
            account_keys: vec![wallet, mint, bonding_curve_address(&mint), PUMP_FUN_PROGRAM_ID],
            instructions: vec![InstructionView {
                program_id_index: 3,
                accounts: vec![1, 2, 0],
                data,
            }],
            failed: false,
        };
        self.history.lock().unwrap().insert(0, (signature, tx));
        signature
    }

    /// Write the mint's curve account.
    pub fn set_curve(&self, mint: &Pubkey, virtual_tokens: u64, virtual_sol: u64, complete: bool) {
        let layout = BondingCurveLayout {
            virtual_token_reserves: virtual_tokens,
            virtual_sol_reserves: virtual_sol,
            real_token_reserves: virtual_tokens / 2,
            real_sol_reserves: virtual_sol / 2,
            token_total_supply: 1_000_000_000_000_000,
            complete,
        };
        let mut data = vec![0x17, 0xb7, 0xf8, 0x37, 0x60, 0xd8, 0xac, 0x60];
        data.extend(borsh::to_vec(&layout).unwrap());
        self.accounts
            .lock()
            .unwrap()
            .insert(bonding_curve_address(mint), data);
    }

    /// Set the raw amount of `mint` held by `wallet`.
    pub fn set_holding(&self, wallet: &Pubkey, mint: &Pubkey, amount: u64) {
        self.token_balances
            .lock()
            .unwrap()
            .insert(associated_token_account(wallet, mint), amount);
    }

    /// Remove the wallet's token account entirely.
    pub fn close_token_account(&self, wallet: &Pubkey, mint: &Pubkey) {
        self.token_balances
            .lock()
            .unwrap()
            .remove(&associated_token_account(wallet, mint));
    }

    pub fn set_balance_error(&self, msg: &str) {
        *self.balance_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_balance_error(&self) {
        *self.balance_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl ChainDataProvider for FakeChain {
    async fn get_balance(&self, _account: &Pubkey) -> Result<Option<u64>> {
        Ok(Some(2_000_000_000))
    }

    async fn get_token_balance(&self, account: &Pubkey) -> Result<Option<u64>> {
        if let Some(msg) = self.balance_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.token_balances.lock().unwrap().get(account).copied())
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_recent_signatures(
        &self,
        _wallet: &Pubkey,
        before: Option<Signature>,
        until: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<Signature>> {
        let history = self.history.lock().unwrap();
        let start = match before {
            Some(before) => history
                .iter()
                .position(|(sig, _)| *sig == before)
                .map_or(history.len(), |i| i + 1),
            None => 0,
        };
        Ok(history[start..]
            .iter()
            .map(|(sig, _)| *sig)
            .take_while(|sig| Some(*sig) != until)
            .take(limit)
            .collect())
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<TransactionView>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .find(|(sig, _)| sig == signature)
            .map(|(_, tx)| tx.clone()))
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeExecutor {
    requests: Mutex<Vec<SellRequest>>,
    /// Outcomes returned in order; once empty every sell confirms.
    scripted: Mutex<VecDeque<SellOutcome>>,
    always_fail: Mutex<bool>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_outcome(&self, outcome: SellOutcome) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    pub fn fail_every_sell(&self) {
        *self.always_fail.lock().unwrap() = true;
    }

    /// Every sell submitted so far.
    pub fn requests(&self) -> Vec<SellRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionClient for FakeExecutor {
    async fn submit_sell(&self, request: &SellRequest) -> SellOutcome {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        if *self.always_fail.lock().unwrap() {
            return SellOutcome::Failed {
                signature: Some(format!("fake-sig-{n}")),
                reason: "custom program error: 0x1772".into(),
            };
        }
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SellOutcome::Confirmed {
                signature: format!("fake-sig-{n}"),
            })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
