//! Round registry — one active round per group key.
//!
//! Owns admission control (join/no-join), pot accounting, and lifecycle
//! transitions. Each group key maps to a slot guarded by its own async
//! mutex, so operations on the same group are strictly sequential while
//! groups never block each other. The table lock is synchronous and is
//! never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::timer::RoundTimerHandle;
use crate::error::GameError;
use crate::types::{Participant, Round, RoundStatus};

// ---------------------------------------------------------------------------
// Group slot
// ---------------------------------------------------------------------------

/// Per-group mutable state: the active round (if any) and its pending
/// auto-resolution timer.
#[derive(Default)]
pub struct GroupSlot {
    pub round: Option<Round>,
    pub timer: Option<RoundTimerHandle>,
}

impl GroupSlot {
    /// Install a new round. Fails if one is already active.
    pub fn begin_round(&mut self, round: Round) -> Result<(), GameError> {
        if self.round.is_some() {
            return Err(GameError::AlreadyActive);
        }
        self.round = Some(round);
        Ok(())
    }

    /// Validate a join against the current round without mutating anything.
    /// Side-effect-free: callers run ledger/store calls only after this
    /// passes.
    pub fn validate_join(
        &self,
        account: &str,
        amount: Decimal,
        guess: i64,
    ) -> Result<(), GameError> {
        let round = self.round.as_ref().ok_or(GameError::NoActiveRound)?;
        if !round.is_open() {
            // Resolving/terminal rounds reject joins the same way a
            // missing round does.
            return Err(GameError::NoActiveRound);
        }
        if !round.range.contains(guess) {
            return Err(GameError::InvalidGuess {
                guess,
                min: round.range.min,
                max: round.range.max,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(GameError::InvalidStake { amount });
        }
        if round.participant(account).is_some() {
            return Err(GameError::AlreadyJoined {
                account: account.to_string(),
            });
        }
        Ok(())
    }

    /// Append a validated, ledger-debited participant and fold their stake
    /// into the pot. Must only be called after `validate_join` under the
    /// same lock acquisition.
    pub fn commit_join(&mut self, participant: Participant) -> Result<&Round, GameError> {
        let round = self.round.as_mut().ok_or(GameError::NoActiveRound)?;
        round.add_participant(participant);
        Ok(round)
    }

    /// Compare-and-set `Open → Resolving`. Whichever trigger (timer or
    /// forced resolution) gets here first proceeds; the loser observes a
    /// non-open round and backs off. Cancels the pending timer and returns
    /// a clone of the round for settlement.
    pub fn begin_resolution(&mut self) -> Result<Round, GameError> {
        let round = self.round.as_mut().ok_or(GameError::NoActiveRound)?;
        if round.status != RoundStatus::Open {
            return Err(GameError::NoActiveRound);
        }
        round.status = RoundStatus::Resolving;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        Ok(round.clone())
    }

    /// Drop the round and any pending timer.
    pub fn clear(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.round = None;
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Table of per-group slots. The only shared mutable structure in the
/// engine; mutated exclusively through the slots it hands out.
#[derive(Default)]
pub struct RoundRegistry {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<GroupSlot>>>>,
}

impl RoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for a group, created empty on first use.
    pub fn slot(&self, group_key: &str) -> Arc<tokio::sync::Mutex<GroupSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group_key.to_string())
            .or_default()
            .clone()
    }

    /// Slot for a group if one exists; never creates.
    pub fn peek(&self, group_key: &str) -> Option<Arc<tokio::sync::Mutex<GroupSlot>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_key)
            .cloned()
    }

    /// Whether `slot` is still the table entry for `group_key`. Callers
    /// that fetched a slot before locking it use this to detect a
    /// teardown that happened in between.
    pub fn holds(&self, group_key: &str, slot: &Arc<tokio::sync::Mutex<GroupSlot>>) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Remove a group's slot entry, making the key available for a new
    /// round. A caller still holding the old slot arc sees an empty slot.
    pub fn remove(&self, group_key: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group_key);
        debug!(group_key, "Registry entry removed");
    }

    /// Keys with a slot entry (active or being torn down).
    pub fn keys(&self) -> Vec<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
