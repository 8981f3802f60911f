//! Sell executors.
//!
//! `PumpSellExecutor` sells a full holding back into the token's bonding
//! curve: it builds the program's `sell` instruction, prepends compute
//! budget instructions, signs with the dev wallet, submits without
//! preflight, and polls the signature until it confirms, fails, or the
//! confirmation window closes. `DryRunExecutor` logs instead of sending.

use async_trait::async_trait;
use borsh::BorshSerialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    associated_token_account, event_authority_address, ExecutionClient, SellRequest,
    PUMP_FUN_FEE_RECIPIENT, PUMP_FUN_GLOBAL, PUMP_FUN_PROGRAM_ID, SELL_DISCRIMINATOR,
};
use crate::config::ExecutionConfig;
use crate::types::{short_id, SellOutcome};

/// Delay between signature status polls.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(750);

// ---------------------------------------------------------------------------
// Instruction building
// ---------------------------------------------------------------------------

/// Borsh payload following the discriminator.
#[derive(Debug, BorshSerialize)]
struct SellArgs {
    amount: u64,
    min_sol_output: u64,
}

/// Instruction data for a curve sell: discriminator + borsh args.
pub fn sell_instruction_data(amount: u64, min_sol_output: u64) -> Vec<u8> {
    let mut data = SELL_DISCRIMINATOR.to_vec();
    let args = SellArgs {
        amount,
        min_sol_output,
    };
    // Writing into a Vec cannot fail.
    if let Ok(encoded) = borsh::to_vec(&args) {
        data.extend_from_slice(&encoded);
    }
    data
}

/// The program's `sell` instruction for `request`, signed by `seller`.
pub fn build_sell_instruction(seller: &solana_sdk::pubkey::Pubkey, request: &SellRequest) -> Instruction {
    let curve_token_account = associated_token_account(&request.market_account, &request.mint);

    let accounts = vec![
        AccountMeta::new_readonly(PUMP_FUN_GLOBAL, false),
        AccountMeta::new(PUMP_FUN_FEE_RECIPIENT, false),
        AccountMeta::new_readonly(request.mint, false),
        AccountMeta::new(request.market_account, false),
        AccountMeta::new(curve_token_account, false),
        AccountMeta::new(request.wallet_token_account, false),
        AccountMeta::new(*seller, true),
        AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
        AccountMeta::new_readonly(spl_associated_token_account::ID, false),
        AccountMeta::new_readonly(spl_token::ID, false),
        AccountMeta::new_readonly(event_authority_address(), false),
        AccountMeta::new_readonly(PUMP_FUN_PROGRAM_ID, false),
    ];

    Instruction {
        program_id: PUMP_FUN_PROGRAM_ID,
        accounts,
        data: sell_instruction_data(request.amount, request.min_output_lamports),
    }
}

/// Compute-budget instructions; a zero setting is left out.
pub fn compute_budget_instructions(priority_micro_lamports: u64, compute_units: u32) -> Vec<Instruction> {
    let mut ixs = Vec::with_capacity(2);
    if priority_micro_lamports > 0 {
        ixs.push(ComputeBudgetInstruction::set_compute_unit_price(priority_micro_lamports));
    }
    if compute_units > 0 {
        ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(compute_units));
    }
    ixs
}

// ---------------------------------------------------------------------------
// On-chain executor
// ---------------------------------------------------------------------------

pub struct PumpSellExecutor {
    rpc: Arc<RpcClient>,
    wallet: Arc<Keypair>,
    priority_micro_lamports: u64,
    compute_units: u32,
    confirm_timeout: Duration,
}

impl PumpSellExecutor {
    pub fn new(rpc: Arc<RpcClient>, wallet: Arc<Keypair>, config: &ExecutionConfig) -> Self {
        Self {
            rpc,
            wallet,
            priority_micro_lamports: config.priority_micro_lamports,
            compute_units: config.compute_units,
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
        }
    }

    /// Poll the signature until it lands, errors, or the window closes.
    async fn confirm(&self, signature: &Signature) -> SellOutcome {
        let started = Instant::now();
        let commitment = CommitmentConfig::confirmed();

        while started.elapsed() < self.confirm_timeout {
            match self
                .rpc
                .get_signature_status_with_commitment(signature, commitment)
                .await
            {
                Ok(Some(Ok(()))) => {
                    info!(
                        %signature,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Sell confirmed"
                    );
                    return SellOutcome::Confirmed {
                        signature: signature.to_string(),
                    };
                }
                Ok(Some(Err(e))) => {
                    warn!(%signature, error = %e, "Sell failed on chain");
                    return SellOutcome::Failed {
                        signature: Some(signature.to_string()),
                        reason: e.to_string(),
                    };
                }
                Ok(None) => {}
                Err(e) => debug!(%signature, error = %e, "Status poll failed, retrying"),
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }

        warn!(
            %signature,
            timeout_secs = self.confirm_timeout.as_secs(),
            "Sell not confirmed in time"
        );
        SellOutcome::Failed {
            signature: Some(signature.to_string()),
            reason: "confirmation timeout".to_string(),
        }
    }
}

#[async_trait]
impl ExecutionClient for PumpSellExecutor {
    async fn submit_sell(&self, request: &SellRequest) -> SellOutcome {
        let started = Instant::now();
        let seller = self.wallet.pubkey();
        let mint = request.mint.to_string();

        info!(
            token_id = %short_id(&mint),
            amount = request.amount,
            min_output_sol = request.min_output_lamports as f64 / LAMPORTS_PER_SOL as f64,
            "Submitting sell"
        );

        let blockhash = match self.rpc.get_latest_blockhash().await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "Could not fetch blockhash, sell not sent");
                return SellOutcome::Failed {
                    signature: None,
                    reason: format!("blockhash unavailable: {e}"),
                };
            }
        };

        let mut instructions = compute_budget_instructions(self.priority_micro_lamports, self.compute_units);
        instructions.push(build_sell_instruction(&seller, request));

        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&seller),
            &[self.wallet.as_ref()],
            blockhash,
        );

        let send_config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };

        let signature = match self.rpc.send_transaction_with_config(&tx, send_config).await {
            Ok(sig) => sig,
            Err(e) => {
                warn!(error = %e, "Sell submission rejected");
                return SellOutcome::Failed {
                    signature: None,
                    reason: e.to_string(),
                };
            }
        };

        info!(
            %signature,
            send_ms = started.elapsed().as_millis() as u64,
            "Sell sent, awaiting confirmation"
        );
        self.confirm(&signature).await
    }

    fn name(&self) -> &'static str {
        "pump-curve"
    }
}

// ---------------------------------------------------------------------------
// Dry-run executor
// ---------------------------------------------------------------------------

/// Logs the sell it would have sent and reports success.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl ExecutionClient for DryRunExecutor {
    async fn submit_sell(&self, request: &SellRequest) -> SellOutcome {
        let signature = format!("dry-run-{}", uuid::Uuid::new_v4());
        info!(
            token_id = %request.mint,
            amount = request.amount,
            min_output_lamports = request.min_output_lamports,
            %signature,
            "[DRY RUN] Would sell"
        );
        SellOutcome::Confirmed { signature }
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
