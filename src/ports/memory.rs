//! In-memory port adapters.
//!
//! A play-money ledger, a recording round store, and local randomness
//! sources. Used by the demo binary for self-contained simulation and
//! by tests for deterministic behavior. All state is in-memory and
//! fully inspectable.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ports::{BetOutcome, LedgerPort, NewBet, RandomnessSource, RoundAggregate, RoundStore};
use crate::types::{DiceRange, Round, StakeUnit, StatsDelta};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One applied balance adjustment, kept for inspection.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub account: String,
    pub unit: StakeUnit,
    pub delta: Decimal,
}

/// Play-money ledger. Balances start at zero unless seeded; a debit past
/// zero fails atomically.
#[derive(Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<(String, StakeUnit), Decimal>>,
    adjustments: Mutex<Vec<LedgerEntry>>,
    /// If set, all operations return this error.
    force_error: Mutex<Option<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an opening balance.
    pub fn fund(&self, account: &str, unit: StakeUnit, amount: Decimal) {
        locked(&self.balances).insert((account.to_string(), unit), amount);
    }

    /// Current balance without going through the port.
    pub fn balance_of(&self, account: &str, unit: StakeUnit) -> Decimal {
        locked(&self.balances)
            .get(&(account.to_string(), unit))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// All adjustments applied so far, in order.
    pub fn adjustments(&self) -> Vec<LedgerEntry> {
        locked(&self.adjustments).clone()
    }

    /// Number of credit (positive-delta) adjustments.
    pub fn credit_count(&self) -> usize {
        locked(&self.adjustments)
            .iter()
            .filter(|e| e.delta > Decimal::ZERO)
            .count()
    }

    /// Force all subsequent operations to fail.
    pub fn set_error(&self, msg: &str) {
        *locked(&self.force_error) = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *locked(&self.force_error) = None;
    }

    fn check_error(&self) -> Result<()> {
        if let Some(msg) = locked(&self.force_error).clone() {
            bail!("{msg}");
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn balance(&self, account: &str, unit: StakeUnit) -> Result<Decimal> {
        self.check_error()?;
        Ok(self.balance_of(account, unit))
    }

    async fn adjust(&self, account: &str, unit: StakeUnit, delta: Decimal) -> Result<()> {
        self.check_error()?;
        let mut balances = locked(&self.balances);
        let key = (account.to_string(), unit);
        let current = balances.get(&key).copied().unwrap_or(Decimal::ZERO);
        let next = current + delta;
        if next < Decimal::ZERO {
            bail!("insufficient funds for {account}: {current} {unit}, delta {delta}");
        }
        balances.insert(key, next);
        drop(balances);

        locked(&self.adjustments).push(LedgerEntry {
            account: account.to_string(),
            unit,
            delta,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Round store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredRound {
    pub round: Round,
    pub updates: Vec<RoundAggregate>,
}

#[derive(Debug, Clone)]
pub struct StoredBet {
    pub bet: NewBet,
    pub outcomes: Vec<BetOutcome>,
}

/// Round store that records everything it is handed, for inspection in
/// tests and the demo binary.
#[derive(Default)]
pub struct RecordingStore {
    rounds: Mutex<HashMap<String, StoredRound>>,
    bets: Mutex<HashMap<String, StoredBet>>,
    stats: Mutex<HashMap<String, Vec<StatsDelta>>>,
    force_error: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round(&self, record_id: &str) -> Option<StoredRound> {
        locked(&self.rounds).get(record_id).cloned()
    }

    pub fn bet(&self, bet_ref: &str) -> Option<StoredBet> {
        locked(&self.bets).get(bet_ref).cloned()
    }

    pub fn bet_count(&self) -> usize {
        locked(&self.bets).len()
    }

    pub fn stats_for(&self, account: &str) -> Vec<StatsDelta> {
        locked(&self.stats).get(account).cloned().unwrap_or_default()
    }

    /// Force all subsequent operations to fail.
    pub fn set_error(&self, msg: &str) {
        *locked(&self.force_error) = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *locked(&self.force_error) = None;
    }

    fn check_error(&self) -> Result<()> {
        if let Some(msg) = locked(&self.force_error).clone() {
            bail!("{msg}");
        }
        Ok(())
    }
}

#[async_trait]
impl RoundStore for RecordingStore {
    async fn create_round(&self, round: &Round) -> Result<String> {
        self.check_error()?;
        let record_id = format!("round-rec-{}", uuid::Uuid::new_v4());
        locked(&self.rounds).insert(
            record_id.clone(),
            StoredRound {
                round: round.clone(),
                updates: Vec::new(),
            },
        );
        Ok(record_id)
    }

    async fn update_round_aggregate(
        &self,
        record_id: &str,
        update: &RoundAggregate,
    ) -> Result<()> {
        self.check_error()?;
        match locked(&self.rounds).get_mut(record_id) {
            Some(stored) => {
                stored.updates.push(update.clone());
                Ok(())
            }
            None => bail!("unknown round record {record_id}"),
        }
    }

    async fn create_bet(&self, bet: &NewBet) -> Result<String> {
        self.check_error()?;
        let bet_ref = format!("bet-rec-{}", uuid::Uuid::new_v4());
        locked(&self.bets).insert(
            bet_ref.clone(),
            StoredBet {
                bet: bet.clone(),
                outcomes: Vec::new(),
            },
        );
        Ok(bet_ref)
    }

    async fn update_bet(&self, bet_ref: &str, outcome: &BetOutcome) -> Result<()> {
        self.check_error()?;
        match locked(&self.bets).get_mut(bet_ref) {
            Some(stored) => {
                stored.outcomes.push(outcome.clone());
                Ok(())
            }
            None => bail!("unknown bet record {bet_ref}"),
        }
    }

    async fn increment_user_stats(&self, account: &str, delta: &StatsDelta) -> Result<()> {
        self.check_error()?;
        locked(&self.stats)
            .entry(account.to_string())
            .or_default()
            .push(delta.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Uniform draws from a seedable RNG. Entropy-seeded in production,
/// fixed-seeded in tests that need reproducible sequences.
pub struct SeededRandomness {
    rng: Mutex<StdRng>,
}

impl SeededRandomness {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomnessSource for SeededRandomness {
    fn draw(&self, range: DiceRange) -> i64 {
        locked(&self.rng).gen_range(range.min..=range.max)
    }
}

/// Always returns the same outcome. For tests.
pub struct FixedRandomness(pub i64);

impl RandomnessSource for FixedRandomness {
    fn draw(&self, _range: DiceRange) -> i64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
