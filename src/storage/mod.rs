//! Token registry store and snapshot persistence.
//!
//! `StateStore` is the single owner of the registry. Every read hands out
//! an independent copy; every write goes through `upsert`, which validates
//! the mutation against the status transition table before committing it.
//! The lock only ever guards the in-memory map: snapshot file I/O happens
//! after the copy is taken and the lock released.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{AutosellerError, Registry, TokenRecord, TokenStatus};

/// Default snapshot path.
pub const DEFAULT_STATE_FILE: &str = "bot_state.json";

pub struct StateStore {
    path: PathBuf,
    registry: Mutex<Registry>,
    /// Last snapshot successfully written to (or loaded from) disk.
    persisted: Mutex<Registry>,
}

impl StateStore {
    /// Create an empty store backed by `path`. Nothing is read until `load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            registry: Mutex::new(Registry::new()),
            persisted: Mutex::new(Registry::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- Reads -----------------------------------------------------------

    /// Copy of the whole registry, ordered by token id.
    pub async fn get_all(&self) -> Registry {
        self.registry.lock().await.clone()
    }

    pub async fn get(&self, token_id: &str) -> Option<TokenRecord> {
        self.registry.lock().await.get(token_id).cloned()
    }

    pub async fn contains(&self, token_id: &str) -> bool {
        self.registry.lock().await.contains_key(token_id)
    }

    /// Snapshot of the tracked token ids, taken at the start of a pass.
    pub async fn token_ids(&self) -> Vec<String> {
        self.registry.lock().await.keys().cloned().collect()
    }

    /// The registry as of the last successful save or load.
    pub async fn persisted(&self) -> Registry {
        self.persisted.lock().await.clone()
    }

    // -- Writes ----------------------------------------------------------

    /// Register a new token. Returns `false` (and changes nothing) if the
    /// id is already tracked: keys are never reused.
    pub async fn insert_new(&self, record: TokenRecord) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.contains_key(&record.token_id) {
            return false;
        }
        registry.insert(record.token_id.clone(), record);
        true
    }

    /// Apply `mutate` to a token's record atomically.
    ///
    /// The mutation runs on a copy. It is committed only if the result
    /// keeps identity fields intact, follows the status transition table,
    /// and never lowers `sell_attempts` except when resetting a failed
    /// sell back to monitoring. Returns the committed record.
    pub async fn upsert<F>(&self, token_id: &str, mutate: F) -> Result<TokenRecord, AutosellerError>
    where
        F: FnOnce(&mut TokenRecord),
    {
        let mut registry = self.registry.lock().await;
        let current = registry
            .get(token_id)
            .ok_or_else(|| AutosellerError::UnknownToken(token_id.to_string()))?;

        let mut updated = current.clone();
        mutate(&mut updated);
        validate_mutation(current, &updated)?;

        registry.insert(token_id.to_string(), updated.clone());
        Ok(updated)
    }

    // -- Persistence -----------------------------------------------------

    /// Replace the in-memory registry with the snapshot on disk.
    ///
    /// A missing or unreadable snapshot yields an empty registry: a corrupt
    /// file must never block startup.
    pub async fn load(&self) -> Registry {
        let loaded = match read_snapshot(&self.path).await {
            Ok(Some(registry)) => {
                info!(
                    path = %self.path.display(),
                    tokens = registry.len(),
                    "State loaded from disk"
                );
                registry
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No saved state found, starting fresh");
                Registry::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Saved state unreadable, starting fresh"
                );
                Registry::new()
            }
        };

        *self.registry.lock().await = loaded.clone();
        *self.persisted.lock().await = loaded.clone();
        loaded
    }

    /// Write the current registry to disk.
    ///
    /// The snapshot goes to a sibling temp file that is then renamed over
    /// the target, so a failed save leaves the previous snapshot intact.
    pub async fn save(&self) -> Result<()> {
        let snapshot = self.get_all().await;

        let json = serde_json::to_string_pretty(&snapshot)
            .context("Failed to serialise registry")?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write state to {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move state into {}", self.path.display()))?;

        debug!(path = %self.path.display(), tokens = snapshot.len(), "State saved");
        *self.persisted.lock().await = snapshot;
        Ok(())
    }
}

/// Check an in-place mutation against the registry invariants.
fn validate_mutation(before: &TokenRecord, after: &TokenRecord) -> Result<(), AutosellerError> {
    let immutable = |field: &'static str| AutosellerError::ImmutableField {
        token_id: before.token_id.clone(),
        field,
    };

    if after.token_id != before.token_id {
        return Err(immutable("token_id"));
    }
    if after.market_account != before.market_account {
        return Err(immutable("market_account"));
    }
    if after.wallet_token_account != before.wallet_token_account {
        return Err(immutable("wallet_token_account"));
    }
    if after.created_at != before.created_at {
        return Err(immutable("created_at"));
    }
    if after.decimals != before.decimals {
        return Err(immutable("decimals"));
    }

    if !before.status.can_transition_to(after.status) {
        return Err(AutosellerError::InvalidTransition {
            token_id: before.token_id.clone(),
            from: before.status,
            to: after.status,
        });
    }

    if after.sell_attempts < before.sell_attempts {
        let is_reset = before.status == TokenStatus::SellFailed
            && after.status == TokenStatus::Monitoring
            && after.sell_attempts == 0;
        if !is_reset {
            return Err(AutosellerError::AttemptCounter {
                token_id: before.token_id.clone(),
                from: before.sell_attempts,
                to: after.sell_attempts,
            });
        }
    }

    Ok(())
}

/// Read and parse the snapshot. `Ok(None)` when the file does not exist.
async fn read_snapshot(path: &Path) -> Result<Option<Registry>> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read state from {}", path.display()))
        }
    };

    let mut registry: Registry = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse state from {}", path.display()))?;

    registry.retain(|key, record| {
        let consistent = *key == record.token_id;
        if !consistent {
            warn!(key = %key, token_id = %record.token_id, "Dropping snapshot entry with mismatched key");
        }
        consistent
    });

    Ok(Some(registry))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
