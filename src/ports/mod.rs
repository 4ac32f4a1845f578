//! External collaborator ports.
//!
//! Defines the narrow interfaces the engine consumes:
//! - `LedgerPort` — balance management; debits stakes, credits payouts
//! - `RoundStore` — write-side audit/history persistence
//! - `RandomnessSource` — outcome draws for engine-drawn resolutions
//!
//! The engine never depends on concrete implementations; in-memory
//! adapters for local simulation live in `memory`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::types::{DiceRange, Round, RoundStatus, StakeUnit, StatsDelta};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Balance-management collaborator. Each `adjust` call is assumed to be
/// applied atomically by the implementor; deltas may be negative (debit)
/// or positive (credit).
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Available balance for `(account, unit)`.
    async fn balance(&self, account: &str, unit: StakeUnit) -> Result<Decimal>;

    /// Apply a signed delta to `(account, unit)`. A debit that would take
    /// the balance negative must fail without partial effect.
    async fn adjust(&self, account: &str, unit: StakeUnit, delta: Decimal) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Round store
// ---------------------------------------------------------------------------

/// Fields for a new bet record. The store assigns and returns the bet ref.
#[derive(Debug, Clone, Serialize)]
pub struct NewBet {
    pub round_id: String,
    pub record_id: String,
    pub account: String,
    pub display_name: String,
    pub unit: StakeUnit,
    pub amount: Decimal,
    pub guess: i64,
}

/// Settlement outcome posted back onto a bet record.
#[derive(Debug, Clone, Serialize)]
pub struct BetOutcome {
    pub won: bool,
    pub payout: Decimal,
    pub distance: i64,
}

/// Partial update of a round's persisted aggregate. Only `Some` fields
/// are written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundAggregate {
    pub status: Option<RoundStatus>,
    pub participant_count: Option<usize>,
    pub pot: Option<HashMap<StakeUnit, Decimal>>,
    pub outcome: Option<i64>,
    pub winners: Option<Vec<String>>,
    pub fee_per_unit: Option<HashMap<StakeUnit, Decimal>>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Write-side persistence for rounds, bets, and account stats.
///
/// The engine writes to this store but never reads it back for logic
/// decisions; authoritative state lives in the round registry. Creation
/// failures abort the operation that triggered them; update failures are
/// logged and otherwise ignored.
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Persist round creation. Returns the store's record id.
    async fn create_round(&self, round: &Round) -> Result<String>;

    /// Update the persisted aggregate for a round record.
    async fn update_round_aggregate(&self, record_id: &str, update: &RoundAggregate)
        -> Result<()>;

    /// Persist a new stake. Returns the bet ref used for settlement updates.
    async fn create_bet(&self, bet: &NewBet) -> Result<String>;

    /// Post a settlement outcome onto a bet record.
    async fn update_bet(&self, bet_ref: &str, outcome: &BetOutcome) -> Result<()>;

    /// Apply plain stat increments for an account.
    async fn increment_user_stats(&self, account: &str, delta: &StatsDelta) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Supplies an integer outcome within a dice range. Not async: draws are
/// local and cheap. Verifiable randomness is out of scope; implementors
/// just need uniform draws.
pub trait RandomnessSource: Send + Sync {
    fn draw(&self, range: DiceRange) -> i64;
}
