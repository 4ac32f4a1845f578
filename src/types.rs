//! Shared types for the DICEPOT engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the registry, settlement,
//! and port modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Stake units
// ---------------------------------------------------------------------------

/// Stake denomination. Each participant picks one; pots are tracked
/// per unit and never converted or merged across units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeUnit {
    Coins,
    Gems,
}

impl StakeUnit {
    /// All supported units (useful for iteration).
    pub const ALL: &'static [StakeUnit] = &[StakeUnit::Coins, StakeUnit::Gems];
}

impl fmt::Display for StakeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeUnit::Coins => write!(f, "COINS"),
            StakeUnit::Gems => write!(f, "GEMS"),
        }
    }
}

impl std::str::FromStr for StakeUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coins" | "coin" => Ok(StakeUnit::Coins),
            "gems" | "gem" => Ok(StakeUnit::Gems),
            _ => Err(anyhow::anyhow!("Unknown stake unit: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Dice range
// ---------------------------------------------------------------------------

/// Inclusive guess domain for a round, derived from the die selection.
/// `min` is always 1 for die-derived ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRange {
    pub min: i64,
    pub max: i64,
}

impl DiceRange {
    /// Range for an n-sided die: `[1, n]`.
    pub fn with_sides(sides: i64) -> Self {
        Self { min: 1, max: sides }
    }

    /// Whether a guess falls inside the range.
    pub fn contains(&self, guess: i64) -> bool {
        guess >= self.min && guess <= self.max
    }

    /// Number of distinct outcomes in the range.
    pub fn span(&self) -> i64 {
        self.max - self.min + 1
    }
}

impl fmt::Display for DiceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the round's outcome is obtained. Affects only where the number
/// comes from, never how settlement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// The transport performs a visible roll and hands the result in.
    VisualRoll,
    /// The engine draws from its randomness source at resolution time.
    DelayedDraw,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMethod::VisualRoll => write!(f, "visual-roll"),
            ResolutionMethod::DelayedDraw => write!(f, "delayed-draw"),
        }
    }
}

/// Round lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    Open,
    Resolving,
    Settled,
    Cancelled,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Open => write!(f, "open"),
            RoundStatus::Resolving => write!(f, "resolving"),
            RoundStatus::Settled => write!(f, "settled"),
            RoundStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One account's stake-and-guess entry within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub account: String,
    /// For reporting only, never used in logic.
    pub display_name: String,
    pub unit: StakeUnit,
    /// Positive stake, debited from the account at join time.
    pub amount: Decimal,
    pub guess: i64,
    /// Store record identifier for this stake, used to post the
    /// settlement outcome back.
    pub bet_ref: String,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} guesses {} for {} {}",
            self.display_name, self.guess, self.amount, self.unit
        )
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// One game instance scoped to a single group, from open to terminal state.
///
/// The authoritative copy lives in the round registry; clones handed out
/// through `active_round` are point-in-time snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Opaque identifier, stable for the round's lifetime.
    pub round_id: String,
    pub group_key: String,
    /// Round-store record id, assigned when creation is persisted.
    pub record_id: String,
    pub range: DiceRange,
    pub resolution_method: ResolutionMethod,
    pub status: RoundStatus,
    /// Insertion order == join order; one entry per account.
    pub participants: Vec<Participant>,
    /// Per-unit running totals. Invariant while pre-settlement:
    /// `pot[u] == Σ amount` over participants staking unit `u`.
    pub pot: HashMap<StakeUnit, Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Round {
    pub fn new(group_key: &str, range: DiceRange, method: ResolutionMethod) -> Self {
        Self {
            round_id: uuid::Uuid::new_v4().to_string(),
            group_key: group_key.to_string(),
            record_id: String::new(),
            range,
            resolution_method: method,
            status: RoundStatus::Open,
            participants: Vec::new(),
            pot: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }

    /// Look up a participant by account.
    pub fn participant(&self, account: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.account == account)
    }

    /// Pot total for one unit (zero if nobody staked it).
    pub fn pot_total(&self, unit: StakeUnit) -> Decimal {
        self.pot.get(&unit).copied().unwrap_or(Decimal::ZERO)
    }

    /// Append a participant and fold their stake into the pot.
    /// Caller is responsible for admission checks; this only mutates.
    pub fn add_participant(&mut self, participant: Participant) {
        *self.pot.entry(participant.unit).or_insert(Decimal::ZERO) += participant.amount;
        self.participants.push(participant);
    }

    /// Point-in-time pot view for callers.
    pub fn snapshot(&self) -> PotSnapshot {
        PotSnapshot {
            pot: self.pot.clone(),
            participant_count: self.participants.len(),
            range: self.range,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {} [{}] {} {} players, range {}",
            self.round_id,
            self.group_key,
            self.status,
            self.participants.len(),
            self.range,
        )
    }
}

/// Public pot view exposed to callers (e.g. the transport layer).
#[derive(Debug, Clone, Serialize)]
pub struct PotSnapshot {
    pub pot: HashMap<StakeUnit, Decimal>,
    pub participant_count: usize,
    pub range: DiceRange,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Plain deltas for cumulative per-account stats, passed through the
/// round store. The store is never assumed to offer server-side
/// arithmetic; the engine always sends explicit increments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsDelta {
    pub games: u32,
    pub games_won: u32,
    pub unit: Option<StakeUnit>,
    pub wagered: Decimal,
    pub amount_won: Decimal,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
