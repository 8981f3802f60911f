//! Dev wallet key loading.
//!
//! Accepts the formats the Solana tooling hands out: a base58 string (as
//! exported by Phantom and friends) or a JSON byte array (as written by
//! `solana-keygen`).

use anyhow::{anyhow, bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use solana_sdk::signature::Keypair;

/// Length of an ed25519 keypair (secret + public).
const KEYPAIR_LEN: usize = 64;

pub fn parse_keypair(secret: &SecretString) -> Result<Keypair> {
    let raw = secret.expose_secret().trim();
    if raw.is_empty() {
        bail!("Wallet private key is empty");
    }

    let bytes: Vec<u8> = if raw.starts_with('[') {
        serde_json::from_str(raw).context("Wallet key looks like a JSON array but does not parse")?
    } else {
        bs58::decode(raw)
            .into_vec()
            .context("Wallet key is not valid base58")?
    };

    if bytes.len() != KEYPAIR_LEN {
        bail!("Wallet key decodes to {} bytes, expected {KEYPAIR_LEN}", bytes.len());
    }

    Keypair::try_from(bytes.as_slice()).map_err(|e| anyhow!("Invalid wallet keypair: {e}"))
}
