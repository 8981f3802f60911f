//! JSON-RPC chain data provider.
//!
//! Thin adapter over `solana-client`'s nonblocking `RpcClient`. Balance and
//! account reads use `processed` commitment so freshly launched curves show
//! up as early as possible; history reads use `confirmed`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChainDataProvider, InstructionView, TransactionView};

/// Per-request RPC timeout.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RpcChainClient {
    rpc: Arc<RpcClient>,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.to_string(),
            RPC_TIMEOUT,
            CommitmentConfig::confirmed(),
        );
        Self { rpc: Arc::new(rpc) }
    }

    /// Shared handle to the underlying client (the sell executor reuses it).
    pub fn rpc(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc)
    }
}

/// The node reports a missing account as an error on some endpoints.
fn is_account_not_found(err: &ClientError) -> bool {
    let msg = err.to_string();
    msg.contains("AccountNotFound")
        || msg.contains("could not find account")
        || msg.contains("Account does not exist")
}

#[async_trait]
impl ChainDataProvider for RpcChainClient {
    async fn get_balance(&self, account: &Pubkey) -> Result<Option<u64>> {
        let resp = self
            .rpc
            .get_balance_with_commitment(account, CommitmentConfig::processed())
            .await
            .with_context(|| format!("getBalance failed for {account}"))?;
        Ok(Some(resp.value))
    }

    async fn get_token_balance(&self, account: &Pubkey) -> Result<Option<u64>> {
        match self
            .rpc
            .get_token_account_balance_with_commitment(account, CommitmentConfig::processed())
            .await
        {
            Ok(resp) => {
                let amount = resp
                    .value
                    .amount
                    .parse::<u64>()
                    .with_context(|| format!("Unparseable token amount for {account}"))?;
                Ok(Some(amount))
            }
            Err(e) if is_account_not_found(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("getTokenAccountBalance failed for {account}")),
        }
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        match self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::processed())
            .await
        {
            Ok(resp) => Ok(resp.value.map(|account| account.data)),
            Err(e) if is_account_not_found(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("getAccountInfo failed for {address}")),
        }
    }

    async fn get_recent_signatures(
        &self,
        wallet: &Pubkey,
        before: Option<Signature>,
        until: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<Signature>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(wallet, config)
            .await
            .with_context(|| format!("getSignaturesForAddress failed for {wallet}"))?;

        let mut signatures = Vec::with_capacity(statuses.len());
        for status in statuses {
            match Signature::from_str(&status.signature) {
                Ok(sig) => signatures.push(sig),
                Err(e) => warn!(signature = %status.signature, error = %e, "Skipping malformed signature"),
            }
        }
        Ok(signatures)
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<TransactionView>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        match self.rpc.get_transaction_with_config(signature, config).await {
            Ok(tx) => Ok(to_view(signature, tx)),
            Err(e) if e.to_string().contains("not found") => Ok(None),
            Err(e) => Err(e).with_context(|| format!("getTransaction failed for {signature}")),
        }
    }
}

/// Decode a base64 transaction into the scanner's view of it.
fn to_view(signature: &Signature, tx: EncodedConfirmedTransactionWithStatusMeta) -> Option<TransactionView> {
    let failed = tx
        .transaction
        .meta
        .as_ref()
        .map(|meta| meta.err.is_some())
        .unwrap_or(false);

    let Some(decoded) = tx.transaction.transaction.decode() else {
        debug!(%signature, "Transaction payload could not be decoded");
        return None;
    };

    let message = &decoded.message;
    let instructions = message
        .instructions()
        .iter()
        .map(|ix| InstructionView {
            program_id_index: ix.program_id_index,
            accounts: ix.accounts.clone(),
            data: ix.data.clone(),
        })
        .collect();

    Some(TransactionView {
        account_keys: message.static_account_keys().to_vec(),
        instructions,
        failed,
    })
}
