//! Round timer.
//!
//! Fires one automatic resolution per round a fixed delay after it opens.
//! Cancellation is signalled, not aborted: the pending task races its
//! sleep against a oneshot, so a timer that has already started resolving
//! can never be killed mid-settlement. If the deadline and a forced
//! resolution race, the registry's status compare-and-set makes the loser
//! a no-op. Exactly one resolution attempt is ever made per round.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::engine::service::GameService;

/// Handle to a pending auto-resolution. Calling `cancel` (or dropping
/// the handle) stops the timer if it hasn't fired yet; a timer already
/// past its deadline runs to completion regardless.
#[derive(Debug)]
pub struct RoundTimerHandle {
    cancel_tx: oneshot::Sender<()>,
}

impl RoundTimerHandle {
    pub fn cancel(self) {
        // The receiver may already be gone (timer fired); that's fine.
        let _ = self.cancel_tx.send(());
    }
}

/// Schedule the automatic resolution of a group's round.
pub fn schedule(service: Arc<GameService>, group_key: String, delay: Duration) -> RoundTimerHandle {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                debug!(group_key, "Round timer fired");
                service.resolve_due(&group_key).await;
            }
            _ = cancel_rx => {
                debug!(group_key, "Round timer cancelled");
            }
        }
    });
    RoundTimerHandle { cancel_tx }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
