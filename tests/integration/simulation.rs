//! End-to-end round lifecycle scenarios.
//!
//! Drives the full service — registry, ledger debits, settlement,
//! timer — through the behaviors that matter: tie splits, single
//! winners, admission failures, empty-round expiry, conservation of
//! funds, and settle-once idempotency.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use dicepot::engine::service::GameService;
use dicepot::error::GameError;
use dicepot::types::{DiceRange, ResolutionMethod, StakeUnit};

use super::mock_ports::{fixture, fixture_with_duration, fixture_with_flaky_credits};

async fn join(
    service: &Arc<GameService>,
    group: &str,
    account: &str,
    amount: Decimal,
    unit: StakeUnit,
    guess: i64,
) -> Result<(), GameError> {
    service
        .join(group, account, &account.to_uppercase(), amount, unit, guess)
        .await
        .map(|_| ())
}

#[tokio::test]
async fn tie_at_equal_distance_splits_the_pot() {
    // Range [1,6]; guesses 3 and 5; outcome 4 → both at distance 1.
    // Pot 20, fee 2% = 0.4, distributable 19.6, each winner gets 9.8.
    let f = fixture(4);
    f.ledger.fund("p1", StakeUnit::Coins, dec!(100));
    f.ledger.fund("p2", StakeUnit::Coins, dec!(100));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    join(&f.service, "g1", "p1", dec!(10), StakeUnit::Coins, 3).await.unwrap();
    join(&f.service, "g1", "p2", dec!(10), StakeUnit::Coins, 5).await.unwrap();

    let report = f.service.force_resolve("g1", None).await.unwrap();

    assert_eq!(report.outcome, Some(4));
    assert_eq!(report.winners.len(), 2);
    assert!(report.winners.iter().all(|w| w.payout == dec!(9.8)));
    assert_eq!(report.fee_per_unit[&StakeUnit::Coins], dec!(0.4));
    assert_eq!(f.ledger.balance_of("p1", StakeUnit::Coins), dec!(99.8));
    assert_eq!(f.ledger.balance_of("p2", StakeUnit::Coins), dec!(99.8));
}

#[tokio::test]
async fn closest_guess_takes_the_whole_pool() {
    // Range [1,100]; guesses 10/50/90 at 5 each; outcome 52 → only the
    // middle guess (distance 2) wins; payout 15 - 0.3 = 14.7.
    let f = fixture(52);
    for p in ["p1", "p2", "p3"] {
        f.ledger.fund(p, StakeUnit::Coins, dec!(50));
    }

    f.service
        .open_round("g1", DiceRange::with_sides(100), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    join(&f.service, "g1", "p1", dec!(5), StakeUnit::Coins, 10).await.unwrap();
    join(&f.service, "g1", "p2", dec!(5), StakeUnit::Coins, 50).await.unwrap();
    join(&f.service, "g1", "p3", dec!(5), StakeUnit::Coins, 90).await.unwrap();

    let report = f.service.force_resolve("g1", None).await.unwrap();

    assert_eq!(report.winners.len(), 1);
    assert_eq!(report.winners[0].account, "p2");
    assert_eq!(report.winners[0].payout, dec!(14.7));
    assert_eq!(f.ledger.balance_of("p2", StakeUnit::Coins), dec!(59.7));
    // Losers keep their loss
    assert_eq!(f.ledger.balance_of("p1", StakeUnit::Coins), dec!(45));
    assert_eq!(f.ledger.balance_of("p3", StakeUnit::Coins), dec!(45));
}

#[tokio::test]
async fn second_open_for_same_group_is_rejected() {
    let f = fixture(4);
    let range = DiceRange::with_sides(6);

    f.service
        .open_round("g1", range, ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    assert!(matches!(
        f.service.open_round("g1", range, ResolutionMethod::DelayedDraw).await,
        Err(GameError::AlreadyActive)
    ));

    // A different group is unaffected
    assert!(f
        .service
        .open_round("g2", range, ResolutionMethod::DelayedDraw)
        .await
        .is_ok());
}

#[tokio::test]
async fn empty_round_expires_with_no_ledger_activity() {
    let f = fixture_with_duration(4, Duration::from_millis(50));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    // Cancelled and torn down, not a single ledger call
    assert!(f.service.active_round("g1").await.is_none());
    assert!(f.ledger.adjustments().is_empty());

    let recent = f.service.recent_settlements().await;
    assert_eq!(recent.len(), 1);
    assert!(recent[0].cancelled);

    // Registry entry removed — the group can host a new round
    assert!(f
        .service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .is_ok());
}

#[tokio::test]
async fn out_of_range_guess_leaves_no_trace() {
    let f = fixture(4);
    f.ledger.fund("p1", StakeUnit::Coins, dec!(100));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();

    let result = join(&f.service, "g1", "p1", dec!(10), StakeUnit::Coins, 7).await;
    assert!(matches!(
        result,
        Err(GameError::InvalidGuess { guess: 7, min: 1, max: 6 })
    ));

    // Pot unchanged, no debit attempted
    let snap = f.service.pot_snapshot("g1").await.unwrap();
    assert_eq!(snap.participant_count, 0);
    assert!(f.ledger.adjustments().is_empty());
}

#[tokio::test]
async fn pot_equals_sum_of_stakes_per_unit() {
    let f = fixture(4);
    let stakes: &[(&str, StakeUnit, Decimal, i64)] = &[
        ("p1", StakeUnit::Coins, dec!(3.5), 1),
        ("p2", StakeUnit::Gems, dec!(12), 2),
        ("p3", StakeUnit::Coins, dec!(0.25), 3),
        ("p4", StakeUnit::Gems, dec!(7.75), 4),
        ("p5", StakeUnit::Coins, dec!(40), 5),
        ("p6", StakeUnit::Gems, dec!(1.01), 6),
    ];
    for (account, unit, _, _) in stakes {
        f.ledger.fund(account, *unit, dec!(100));
    }

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();

    let mut joined = 0;
    for (account, unit, amount, guess) in stakes {
        join(&f.service, "g1", account, *amount, *unit, *guess).await.unwrap();
        joined += 1;

        let snap = f.service.pot_snapshot("g1").await.unwrap();
        assert_eq!(snap.participant_count, joined);
        for &u in StakeUnit::ALL {
            let expected: Decimal = stakes[..joined]
                .iter()
                .filter(|(_, unit, _, _)| *unit == u)
                .map(|(_, _, amount, _)| *amount)
                .sum();
            let actual = snap.pot.get(&u).copied().unwrap_or(Decimal::ZERO);
            assert_eq!(actual, expected, "pot mismatch for {u} after {joined} joins");
        }
    }
}

#[tokio::test]
async fn same_account_cannot_join_twice() {
    let f = fixture(4);
    f.ledger.fund("p1", StakeUnit::Coins, dec!(100));
    f.ledger.fund("p1", StakeUnit::Gems, dec!(100));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    join(&f.service, "g1", "p1", dec!(10), StakeUnit::Coins, 3).await.unwrap();

    // Different amount, unit, and guess — still rejected
    let result = join(&f.service, "g1", "p1", dec!(1), StakeUnit::Gems, 6).await;
    assert!(matches!(result, Err(GameError::AlreadyJoined { .. })));

    // Only the first stake was taken
    assert_eq!(f.ledger.balance_of("p1", StakeUnit::Coins), dec!(90));
    assert_eq!(f.ledger.balance_of("p1", StakeUnit::Gems), dec!(100));
}

#[tokio::test]
async fn settlement_never_credits_twice() {
    let f = fixture(4);
    f.ledger.fund("p1", StakeUnit::Coins, dec!(100));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    join(&f.service, "g1", "p1", dec!(10), StakeUnit::Coins, 4).await.unwrap();

    f.service.force_resolve("g1", None).await.unwrap();
    let credits = f.ledger.credit_count();

    // The round is gone; a repeat trigger is a no-op error
    assert!(matches!(
        f.service.force_resolve("g1", None).await,
        Err(GameError::NoActiveRound)
    ));
    assert_eq!(f.ledger.credit_count(), credits);
    assert_eq!(f.ledger.balance_of("p1", StakeUnit::Coins), dec!(99.8));
}

#[tokio::test]
async fn no_value_created_or_destroyed() {
    // Debits == payouts + fee + residue, per unit.
    let f = fixture(61);
    let stakes: &[(&str, StakeUnit, Decimal, i64)] = &[
        ("p1", StakeUnit::Coins, dec!(7), 20),
        ("p2", StakeUnit::Coins, dec!(13), 60),
        ("p3", StakeUnit::Gems, dec!(3), 60),
        ("p4", StakeUnit::Gems, dec!(9), 61),
    ];
    for (account, unit, _, _) in stakes {
        f.ledger.fund(account, *unit, dec!(100));
    }

    f.service
        .open_round("g1", DiceRange::with_sides(100), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    for (account, unit, amount, guess) in stakes {
        join(&f.service, "g1", account, *amount, *unit, *guess).await.unwrap();
    }

    let report = f.service.force_resolve("g1", None).await.unwrap();

    for &unit in StakeUnit::ALL {
        let debited: Decimal = stakes
            .iter()
            .filter(|(_, u, _, _)| *u == unit)
            .map(|(_, _, amount, _)| *amount)
            .sum();
        let paid: Decimal = report
            .winners
            .iter()
            .filter(|w| w.unit == unit)
            .map(|w| w.payout)
            .sum();
        let fee = report.fee_per_unit.get(&unit).copied().unwrap_or(Decimal::ZERO);
        let residue = report
            .residue_per_unit
            .get(&unit)
            .copied()
            .unwrap_or(Decimal::ZERO);
        assert_eq!(debited, paid + fee + residue, "unit {unit} does not balance");
    }
}

#[tokio::test]
async fn failed_winner_credit_does_not_block_settlement() {
    let (service, ledger, _store) = fixture_with_flaky_credits(4);
    ledger.inner.fund("p1", StakeUnit::Coins, dec!(100));
    ledger.inner.fund("p2", StakeUnit::Coins, dec!(100));

    service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();
    service
        .join("g1", "p1", "P1", dec!(10), StakeUnit::Coins, 3)
        .await
        .unwrap();
    service
        .join("g1", "p2", "P2", dec!(10), StakeUnit::Coins, 5)
        .await
        .unwrap();

    ledger.refuse_credits_for("p2");
    let report = service.force_resolve("g1", None).await.unwrap();

    // Both won the tie, one credit failed and is surfaced for manual
    // reconciliation; the other landed.
    assert_eq!(report.winners.len(), 2);
    assert_eq!(report.failed_credits.len(), 1);
    assert_eq!(report.failed_credits[0].account, "p2");
    assert_eq!(report.failed_credits[0].amount, dec!(9.8));
    assert_eq!(ledger.inner.balance_of("p1", StakeUnit::Coins), dec!(99.8));
    assert_eq!(ledger.inner.balance_of("p2", StakeUnit::Coins), dec!(90));

    // Round is settled and torn down, not retried
    assert!(service.active_round("g1").await.is_none());
}

#[tokio::test]
async fn concurrent_joins_serialize_cleanly() {
    let f = fixture(4);
    for i in 0..10 {
        f.ledger.fund(&format!("p{i}"), StakeUnit::Coins, dec!(100));
    }

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::DelayedDraw)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10i64 {
        let service = f.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .join(
                    "g1",
                    &format!("p{i}"),
                    &format!("P{i}"),
                    dec!(10),
                    StakeUnit::Coins,
                    (i % 6) + 1,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let snap = f.service.pot_snapshot("g1").await.unwrap();
    assert_eq!(snap.participant_count, 10);
    assert_eq!(snap.pot[&StakeUnit::Coins], dec!(100));
}

#[tokio::test]
async fn visual_roll_accepts_supplied_outcome() {
    // Engine RNG says 1, but the transport's visible roll said 6 — the
    // supplied outcome wins.
    let f = fixture(1);
    f.ledger.fund("p1", StakeUnit::Coins, dec!(100));
    f.ledger.fund("p2", StakeUnit::Coins, dec!(100));

    f.service
        .open_round("g1", DiceRange::with_sides(6), ResolutionMethod::VisualRoll)
        .await
        .unwrap();
    join(&f.service, "g1", "p1", dec!(10), StakeUnit::Coins, 6).await.unwrap();
    join(&f.service, "g1", "p2", dec!(10), StakeUnit::Coins, 1).await.unwrap();

    let report = f.service.force_resolve("g1", Some(6)).await.unwrap();

    assert_eq!(report.outcome, Some(6));
    assert_eq!(report.winners.len(), 1);
    assert_eq!(report.winners[0].account, "p1");
}
