//! Error taxonomy for the game engine.
//!
//! Every externally exposed operation returns one of these named kinds;
//! the transport layer is responsible for rendering them. Validation
//! errors are detected before any side effect.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    /// A round already exists for this group.
    #[error("a round is already active for this group")]
    AlreadyActive,

    /// No round exists for this group (or it is no longer accepting).
    #[error("no active round for this group")]
    NoActiveRound,

    #[error("guess {guess} is outside the dice range [{min}, {max}]")]
    InvalidGuess { guess: i64, min: i64, max: i64 },

    #[error("stake must be positive (got {amount})")]
    InvalidStake { amount: Decimal },

    #[error("account {account} has already joined this round")]
    AlreadyJoined { account: String },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Resolution reached with zero participants; the round was cancelled.
    #[error("round ended with no participants")]
    EmptyRound,

    /// Round-store call failed at a point where the operation must abort.
    #[error("persistence failure: {0}")]
    Persistence(anyhow::Error),

    /// Ledger call failed at a point where the operation must abort.
    #[error("ledger failure: {0}")]
    Ledger(anyhow::Error),
}

impl GameError {
    /// Whether the error is a pre-side-effect validation rejection.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GameError::AlreadyActive
                | GameError::NoActiveRound
                | GameError::InvalidGuess { .. }
                | GameError::InvalidStake { .. }
                | GameError::AlreadyJoined { .. }
                | GameError::InsufficientFunds { .. }
        )
    }
}
