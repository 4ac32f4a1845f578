//! Game service — the engine's public operations.
//!
//! Wires the round registry, settlement engine, timer, and ports into
//! the surface the transport layer calls: `open_round`, `join`,
//! `force_resolve`, `cancel_round`, plus read-only snapshots. Every
//! operation returns a success payload or one named `GameError`; nothing
//! panics across this boundary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::registry::RoundRegistry;
use crate::engine::settlement::{SettlementEngine, SettlementReport};
use crate::engine::timer;
use crate::error::GameError;
use crate::ports::{LedgerPort, NewBet, RandomnessSource, RoundAggregate, RoundStore};
use crate::types::{
    DiceRange, Participant, PotSnapshot, ResolutionMethod, Round, RoundStatus, StakeUnit,
};

/// How many settlement reports to keep for the monitoring API.
const RECENT_REPORTS: usize = 100;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Fraction of each pot retained before distribution.
    pub fee_rate: Decimal,
    /// Delay between a round opening and its automatic resolution.
    pub round_duration: Duration,
    /// Payouts are truncated to this many decimal places.
    pub payout_scale: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.02),
            round_duration: Duration::from_secs(30),
            payout_scale: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

/// Monitoring view of an active round.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRoundView {
    pub group_key: String,
    pub round_id: String,
    pub status: RoundStatus,
    pub participant_count: usize,
    pub pot: HashMap<StakeUnit, Decimal>,
    pub range: DiceRange,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct GameService {
    registry: RoundRegistry,
    settlement: SettlementEngine,
    ledger: Arc<dyn LedgerPort>,
    store: Arc<dyn RoundStore>,
    rng: Arc<dyn RandomnessSource>,
    config: GameConfig,
    recent: RwLock<Vec<SettlementReport>>,
}

impl GameService {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        store: Arc<dyn RoundStore>,
        rng: Arc<dyn RandomnessSource>,
        config: GameConfig,
    ) -> Arc<Self> {
        let settlement = SettlementEngine::new(
            ledger.clone(),
            store.clone(),
            config.fee_rate,
            config.payout_scale,
        );
        Arc::new(Self {
            registry: RoundRegistry::new(),
            settlement,
            ledger,
            store,
            rng,
            config,
            recent: RwLock::new(Vec::new()),
        })
    }

    // -- Lifecycle operations ---------------------------------------------

    /// Open a round for a group and schedule its automatic resolution.
    pub async fn open_round(
        self: &Arc<Self>,
        group_key: &str,
        range: DiceRange,
        method: ResolutionMethod,
    ) -> Result<Round, GameError> {
        // The slot fetched from the table can be torn down between the
        // fetch and the lock acquisition; re-check after locking so the
        // new round never lands in a removed slot.
        let mut guard = loop {
            let slot = self.registry.slot(group_key);
            let guard = slot.clone().lock_owned().await;
            if self.registry.holds(group_key, &slot) {
                break guard;
            }
        };

        if guard.round.is_some() {
            return Err(GameError::AlreadyActive);
        }

        let mut round = Round::new(group_key, range, method);
        round.record_id = self
            .store
            .create_round(&round)
            .await
            .map_err(GameError::Persistence)?;

        guard.begin_round(round.clone())?;
        guard.timer = Some(timer::schedule(
            Arc::clone(self),
            group_key.to_string(),
            self.config.round_duration,
        ));

        info!(
            group_key,
            round_id = %round.round_id,
            range = %range,
            method = %method,
            duration_secs = self.config.round_duration.as_secs(),
            "Round opened"
        );
        Ok(round)
    }

    /// Join the group's open round with a stake and a guess.
    ///
    /// The ledger debit and the participant append are one logical unit:
    /// if the debit fails, no participant is added and the pot is
    /// untouched; if the bet record can't be created, the debit is
    /// reversed best-effort.
    pub async fn join(
        &self,
        group_key: &str,
        account: &str,
        display_name: &str,
        amount: Decimal,
        unit: StakeUnit,
        guess: i64,
    ) -> Result<Participant, GameError> {
        let slot = self.registry.peek(group_key).ok_or(GameError::NoActiveRound)?;
        let mut guard = slot.lock().await;

        guard.validate_join(account, amount, guess)?;
        let (round_id, record_id) = {
            let round = guard.round.as_ref().ok_or(GameError::NoActiveRound)?;
            (round.round_id.clone(), round.record_id.clone())
        };

        // Balance pre-check before debiting.
        let available = self
            .ledger
            .balance(account, unit)
            .await
            .map_err(GameError::Ledger)?;
        if available < amount {
            return Err(GameError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        // Debit. A failure here (e.g. a racing debit on the same account)
        // aborts the join with no partial state.
        self.ledger
            .adjust(account, unit, -amount)
            .await
            .map_err(GameError::Ledger)?;

        let new_bet = NewBet {
            round_id,
            record_id: record_id.clone(),
            account: account.to_string(),
            display_name: display_name.to_string(),
            unit,
            amount,
            guess,
        };
        let bet_ref = match self.store.create_bet(&new_bet).await {
            Ok(bet_ref) => bet_ref,
            Err(e) => {
                // Reverse the debit so no stake is held without a record.
                if let Err(refund_err) = self.ledger.adjust(account, unit, amount).await {
                    warn!(
                        account,
                        amount = %amount,
                        error = %refund_err,
                        "Debit reversal failed after bet-create failure"
                    );
                }
                return Err(GameError::Persistence(e));
            }
        };

        let participant = Participant {
            account: account.to_string(),
            display_name: display_name.to_string(),
            unit,
            amount,
            guess,
            bet_ref,
        };
        let round = guard.commit_join(participant.clone())?;

        // Aggregate counts are advisory; a failed write never unwinds
        // the join.
        let aggregate = RoundAggregate {
            participant_count: Some(round.participants.len()),
            pot: Some(round.pot.clone()),
            ..Default::default()
        };
        if let Err(e) = self.store.update_round_aggregate(&record_id, &aggregate).await {
            warn!(record_id = %record_id, error = %e, "Aggregate update failed");
        }

        info!(
            group_key,
            account,
            guess,
            stake = %amount,
            unit = %unit,
            players = round.participants.len(),
            "Participant joined"
        );
        Ok(participant)
    }

    /// Resolve the group's round now.
    ///
    /// `outcome` carries the transport's visible roll for
    /// `ResolutionMethod::VisualRoll`; when absent the engine draws from
    /// its randomness source. The `Open → Resolving` compare-and-set
    /// makes this race-safe against the timer: whichever trigger arrives
    /// second observes a non-open round and backs off.
    pub async fn force_resolve(
        &self,
        group_key: &str,
        outcome: Option<i64>,
    ) -> Result<SettlementReport, GameError> {
        let slot = self.registry.peek(group_key).ok_or(GameError::NoActiveRound)?;
        let mut guard = slot.lock().await;

        let round = guard.begin_resolution()?;

        if round.participants.is_empty() {
            let report = self.settlement.cancel(&round).await;
            guard.clear();
            // The table entry must go while the guard is still held, or
            // a queued open_round could revive the doomed slot.
            self.registry.remove(group_key);
            drop(guard);
            self.push_recent(report).await;
            return Err(GameError::EmptyRound);
        }

        let outcome = outcome.unwrap_or_else(|| self.rng.draw(round.range));
        let report = self.settlement.settle(&round, outcome).await;

        guard.clear();
        self.registry.remove(group_key);
        drop(guard);
        self.push_recent(report.clone()).await;
        Ok(report)
    }

    /// Abort the group's round, refunding every collected stake.
    pub async fn cancel_round(&self, group_key: &str) -> Result<SettlementReport, GameError> {
        let slot = self.registry.peek(group_key).ok_or(GameError::NoActiveRound)?;
        let mut guard = slot.lock().await;

        let round = guard.begin_resolution()?;
        let report = self.settlement.cancel(&round).await;

        guard.clear();
        self.registry.remove(group_key);
        drop(guard);
        self.push_recent(report.clone()).await;

        info!(group_key, refunds = round.participants.len(), "Round aborted");
        Ok(report)
    }

    /// Timer entry point. Tolerates rounds already resolved by the time
    /// the deadline fires.
    pub async fn resolve_due(&self, group_key: &str) {
        match self.force_resolve(group_key, None).await {
            Ok(report) => info!(
                group_key,
                outcome = report.outcome,
                winners = report.winners.len(),
                "Round auto-resolved"
            ),
            Err(GameError::EmptyRound) => {
                info!(group_key, "Round expired with no participants — cancelled")
            }
            Err(GameError::NoActiveRound) => {
                debug!(group_key, "Timer fired after round was already resolved")
            }
            Err(e) => warn!(group_key, error = %e, "Auto-resolution failed"),
        }
    }

    // -- Read-only views --------------------------------------------------

    /// Pot view for the group's active round.
    pub async fn pot_snapshot(&self, group_key: &str) -> Option<PotSnapshot> {
        let slot = self.registry.peek(group_key)?;
        let guard = slot.lock().await;
        guard.round.as_ref().map(Round::snapshot)
    }

    /// Point-in-time clone of the group's active round.
    pub async fn active_round(&self, group_key: &str) -> Option<Round> {
        let slot = self.registry.peek(group_key)?;
        let guard = slot.lock().await;
        guard.round.clone()
    }

    /// Monitoring views across all groups with an active round.
    pub async fn active_rounds(&self) -> Vec<ActiveRoundView> {
        let mut views = Vec::new();
        for key in self.registry.keys() {
            let Some(slot) = self.registry.peek(&key) else { continue };
            let guard = slot.lock().await;
            if let Some(round) = guard.round.as_ref() {
                views.push(ActiveRoundView {
                    group_key: key,
                    round_id: round.round_id.clone(),
                    status: round.status,
                    participant_count: round.participants.len(),
                    pot: round.pot.clone(),
                    range: round.range,
                    created_at: round.created_at,
                });
            }
        }
        views
    }

    /// Most recent settlement reports, newest last.
    pub async fn recent_settlements(&self) -> Vec<SettlementReport> {
        self.recent.read().await.clone()
    }

    async fn push_recent(&self, report: SettlementReport) {
        let mut recent = self.recent.write().await;
        recent.push(report);
        let len = recent.len();
        if len > RECENT_REPORTS {
            recent.drain(..len - RECENT_REPORTS);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
