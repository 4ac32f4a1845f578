//! Settlement engine.
//!
//! Transforms a finished round plus a drawn outcome into winners, fees,
//! and per-participant payout/refund deltas, then drives the ledger and
//! round-store side effects exactly once. Plan computation is pure and
//! separately testable; the async driver applies it.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ports::{BetOutcome, LedgerPort, RoundAggregate, RoundStore};
use crate::types::{Participant, Round, RoundStatus, StakeUnit, StatsDelta};

// ---------------------------------------------------------------------------
// Plan (pure)
// ---------------------------------------------------------------------------

/// Per-participant planned disposition, in join order.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub participant: Participant,
    pub distance: i64,
    pub won: bool,
    /// Credit owed to this participant; zero for losers.
    pub payout: Decimal,
}

/// Complete settlement arithmetic for one round, before any side effect.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub outcome: i64,
    pub min_distance: i64,
    pub entries: Vec<PlannedEntry>,
    pub fee_per_unit: HashMap<StakeUnit, Decimal>,
    /// Unrepresentable division remainder plus winnerless-unit pools,
    /// forfeited to the house alongside the fee. Never redistributed.
    pub residue_per_unit: HashMap<StakeUnit, Decimal>,
}

/// Compute winners, fees, and payouts for `(round, outcome)`.
///
/// Returns `None` for an empty round (nothing to settle — the caller
/// takes the cancellation path instead). Ties always split; join order
/// and stake size never break them. Winners staking different units each
/// draw only from their own unit's pool. Payouts are truncated to
/// `payout_scale` decimal places; the remainder lands in the residue.
pub fn plan_settlement(
    round: &Round,
    outcome: i64,
    fee_rate: Decimal,
    payout_scale: u32,
) -> Option<SettlementPlan> {
    if round.participants.is_empty() {
        return None;
    }

    let min_distance = round
        .participants
        .iter()
        .map(|p| (p.guess - outcome).abs())
        .min()?;

    // Winner headcount per unit — each unit's pool splits only among the
    // winners who staked that unit.
    let mut winners_per_unit: HashMap<StakeUnit, u64> = HashMap::new();
    for p in &round.participants {
        if (p.guess - outcome).abs() == min_distance {
            *winners_per_unit.entry(p.unit).or_insert(0) += 1;
        }
    }

    let mut fee_per_unit = HashMap::new();
    let mut residue_per_unit = HashMap::new();
    let mut payout_per_unit: HashMap<StakeUnit, Decimal> = HashMap::new();

    for (&unit, &total) in &round.pot {
        let fee = total * fee_rate;
        let distributable = total - fee;
        fee_per_unit.insert(unit, fee);

        match winners_per_unit.get(&unit).copied().unwrap_or(0) {
            0 => {
                // Every staker of this unit lost; its pool stays with
                // the house.
                residue_per_unit.insert(unit, distributable);
            }
            n => {
                let share = (distributable / Decimal::from(n))
                    .round_dp_with_strategy(payout_scale, RoundingStrategy::ToZero);
                let residue = distributable - share * Decimal::from(n);
                payout_per_unit.insert(unit, share);
                if residue > Decimal::ZERO {
                    residue_per_unit.insert(unit, residue);
                }
            }
        }
    }

    let entries = round
        .participants
        .iter()
        .map(|p| {
            let distance = (p.guess - outcome).abs();
            let won = distance == min_distance;
            let payout = if won {
                payout_per_unit.get(&p.unit).copied().unwrap_or(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };
            PlannedEntry {
                participant: p.clone(),
                distance,
                won,
                payout,
            }
        })
        .collect();

    Some(SettlementPlan {
        outcome,
        min_distance,
        entries,
        fee_per_unit,
        residue_per_unit,
    })
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WinnerPayout {
    pub account: String,
    pub display_name: String,
    pub unit: StakeUnit,
    pub stake: Decimal,
    pub payout: Decimal,
    pub distance: i64,
}

/// A payout or refund credit that failed at the ledger. Surfaced for
/// manual reconciliation; never retried by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCredit {
    pub account: String,
    pub unit: StakeUnit,
    pub amount: Decimal,
    pub reason: String,
}

/// Outcome of one settlement (or cancellation) pass.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub round_id: String,
    pub group_key: String,
    /// `None` when the round was cancelled without a draw.
    pub outcome: Option<i64>,
    pub cancelled: bool,
    pub winners: Vec<WinnerPayout>,
    pub fee_per_unit: HashMap<StakeUnit, Decimal>,
    pub residue_per_unit: HashMap<StakeUnit, Decimal>,
    pub failed_credits: Vec<FailedCredit>,
    pub settled_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    ledger: Arc<dyn LedgerPort>,
    store: Arc<dyn RoundStore>,
    fee_rate: Decimal,
    payout_scale: u32,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        store: Arc<dyn RoundStore>,
        fee_rate: Decimal,
        payout_scale: u32,
    ) -> Self {
        Self {
            ledger,
            store,
            fee_rate,
            payout_scale,
        }
    }

    /// Settle a resolving round against a drawn outcome.
    ///
    /// Credits winners, posts per-bet outcomes and stat increments, and
    /// persists the terminal aggregate. An empty round falls through to
    /// the cancellation path. Credit failures are collected into the
    /// report rather than rolling back: the outcome and winner set are
    /// fixed facts once drawn.
    pub async fn settle(&self, round: &Round, outcome: i64) -> SettlementReport {
        let Some(plan) = plan_settlement(round, outcome, self.fee_rate, self.payout_scale)
        else {
            return self.cancel(round).await;
        };

        let mut winners = Vec::new();
        let mut failed_credits = Vec::new();

        for entry in &plan.entries {
            let p = &entry.participant;
            if entry.won {
                if let Err(e) = self.ledger.adjust(&p.account, p.unit, entry.payout).await {
                    warn!(
                        account = %p.account,
                        unit = %p.unit,
                        payout = %entry.payout,
                        error = %e,
                        "Winner credit failed — needs manual reconciliation"
                    );
                    failed_credits.push(FailedCredit {
                        account: p.account.clone(),
                        unit: p.unit,
                        amount: entry.payout,
                        reason: e.to_string(),
                    });
                }
                winners.push(WinnerPayout {
                    account: p.account.clone(),
                    display_name: p.display_name.clone(),
                    unit: p.unit,
                    stake: p.amount,
                    payout: entry.payout,
                    distance: entry.distance,
                });
            }
        }

        // Per-bet outcomes and stat increments are fire-and-forget:
        // failures are logged, never fatal.
        let updates = plan.entries.iter().map(|entry| async move {
            let p = &entry.participant;
            let bet_update = BetOutcome {
                won: entry.won,
                payout: entry.payout,
                distance: entry.distance,
            };
            if let Err(e) = self.store.update_bet(&p.bet_ref, &bet_update).await {
                warn!(bet_ref = %p.bet_ref, error = %e, "Bet update failed");
            }
            let delta = StatsDelta {
                games: 1,
                games_won: u32::from(entry.won),
                unit: Some(p.unit),
                wagered: p.amount,
                amount_won: entry.payout,
            };
            if let Err(e) = self.store.increment_user_stats(&p.account, &delta).await {
                warn!(account = %p.account, error = %e, "Stats update failed");
            }
        });
        futures::future::join_all(updates).await;

        let settled_at = Utc::now();
        let aggregate = RoundAggregate {
            status: Some(RoundStatus::Settled),
            participant_count: Some(round.participants.len()),
            pot: Some(round.pot.clone()),
            outcome: Some(outcome),
            winners: Some(winners.iter().map(|w| w.account.clone()).collect()),
            fee_per_unit: Some(plan.fee_per_unit.clone()),
            settled_at: Some(settled_at),
        };
        if let Err(e) = self
            .store
            .update_round_aggregate(&round.record_id, &aggregate)
            .await
        {
            warn!(record_id = %round.record_id, error = %e, "Final aggregate persist failed");
        }

        info!(
            round_id = %round.round_id,
            group_key = %round.group_key,
            outcome,
            min_distance = plan.min_distance,
            winners = winners.len(),
            failed_credits = failed_credits.len(),
            "Round settled"
        );

        SettlementReport {
            round_id: round.round_id.clone(),
            group_key: round.group_key.clone(),
            outcome: Some(outcome),
            cancelled: false,
            winners,
            fee_per_unit: plan.fee_per_unit,
            residue_per_unit: plan.residue_per_unit,
            failed_credits,
            settled_at,
        }
    }

    /// Cancel a round, refunding every collected stake in full.
    ///
    /// The usual trigger is resolution with zero participants (nothing to
    /// refund); an explicit admin abort runs the same loop over whoever
    /// joined.
    pub async fn cancel(&self, round: &Round) -> SettlementReport {
        let mut failed_credits = Vec::new();

        for p in &round.participants {
            if let Err(e) = self.ledger.adjust(&p.account, p.unit, p.amount).await {
                warn!(
                    account = %p.account,
                    amount = %p.amount,
                    error = %e,
                    "Refund failed — needs manual reconciliation"
                );
                failed_credits.push(FailedCredit {
                    account: p.account.clone(),
                    unit: p.unit,
                    amount: p.amount,
                    reason: e.to_string(),
                });
            }
        }

        let settled_at = Utc::now();
        let aggregate = RoundAggregate {
            status: Some(RoundStatus::Cancelled),
            participant_count: Some(round.participants.len()),
            settled_at: Some(settled_at),
            ..Default::default()
        };
        if let Err(e) = self
            .store
            .update_round_aggregate(&round.record_id, &aggregate)
            .await
        {
            warn!(record_id = %round.record_id, error = %e, "Cancellation persist failed");
        }

        info!(
            round_id = %round.round_id,
            group_key = %round.group_key,
            refunds = round.participants.len(),
            "Round cancelled"
        );

        SettlementReport {
            round_id: round.round_id.clone(),
            group_key: round.group_key.clone(),
            outcome: None,
            cancelled: true,
            winners: Vec::new(),
            fee_per_unit: HashMap::new(),
            residue_per_unit: HashMap::new(),
            failed_credits,
            settled_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
