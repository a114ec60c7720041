//! Persistence collaborator
//!
//! The engine does not store claims itself. An accepted claim is handed to
//! a [`ClaimStore`] and the engine waits a bounded time for the stable
//! identifier before reporting success.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::collision::TerritoryId;
use crate::error::CollaboratorError;
use crate::tracker::AcceptedClaim;

/// Stores accepted claims
///
/// Implementations own their transport, retries and timeouts; the engine
/// only bounds how long it waits for an answer.
///
/// A store that times out keeps running on its worker thread and may still
/// succeed. The session meanwhile resolves to `validation_unavailable`, can
/// re-arm and persist the same walk again. Implementations must therefore
/// be idempotent on [`AcceptedClaim::claim_key`]: a second store with a
/// known key returns the id already assigned.
pub trait ClaimStore: Send + Sync {
    fn store(&self, claim: &AcceptedClaim) -> Result<TerritoryId, CollaboratorError>;
}

/// Run `store` on a worker thread and wait at most `timeout`
///
/// A store that never answers leaves its worker thread behind; the caller
/// gets `Timeout` either way.
pub fn store_with_timeout(
    store: &Arc<dyn ClaimStore>,
    claim: &AcceptedClaim,
    timeout: Duration,
) -> Result<TerritoryId, CollaboratorError> {
    let (tx, rx) = mpsc::channel();
    let store = Arc::clone(store);
    let claim = claim.clone();

    thread::Builder::new()
        .name("claim-store".into())
        .spawn(move || {
            let result = store.store(&claim);
            // Receiver may have timed out already
            let _ = tx.send(result);
        })
        .map_err(|e| CollaboratorError::Failed(format!("spawn failed: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("claim store did not answer within {:?}", timeout);
            Err(CollaboratorError::Timeout {
                waited_ms: timeout.as_millis() as u64,
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(CollaboratorError::Disconnected),
    }
}

/// In-memory store handing out sequential ids, one per claim key
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    claims: Mutex<Vec<(TerritoryId, AcceptedClaim)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored claims in insertion order
    pub fn claims(&self) -> Vec<(TerritoryId, AcceptedClaim)> {
        self.claims.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ClaimStore for MemoryStore {
    fn store(&self, claim: &AcceptedClaim) -> Result<TerritoryId, CollaboratorError> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| CollaboratorError::Failed("store poisoned".into()))?;

        let key = claim.claim_key();
        if let Some((id, stored)) = claims.iter_mut().find(|(_, c)| c.claim_key() == key) {
            debug!("claim {} already stored as {:?}; updating", key, id);
            *stored = claim.clone();
            return Ok(*id);
        }

        let id = TerritoryId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        claims.push((id, claim.clone()));
        Ok(id)
    }
}
