//! Mock ports for integration testing.
//!
//! Builds on the in-memory adapters with failure injection that the
//! engine can't trigger on its own — e.g. a ledger that accepts debits
//! but refuses credits for a chosen account, to exercise the
//! partial-settlement path.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dicepot::engine::service::{GameConfig, GameService};
use dicepot::ports::memory::{FixedRandomness, InMemoryLedger, RecordingStore};
use dicepot::ports::{LedgerPort, RoundStore};
use dicepot::types::StakeUnit;

/// Ledger wrapper that fails credit (positive-delta) adjustments for one
/// account while letting everything else through to the inner ledger.
pub struct CreditRefusingLedger {
    pub inner: Arc<InMemoryLedger>,
    refuse_for: Mutex<Option<String>>,
}

impl CreditRefusingLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Self {
        Self {
            inner,
            refuse_for: Mutex::new(None),
        }
    }

    pub fn refuse_credits_for(&self, account: &str) {
        *self.refuse_for.lock().unwrap() = Some(account.to_string());
    }
}

#[async_trait]
impl LedgerPort for CreditRefusingLedger {
    async fn balance(&self, account: &str, unit: StakeUnit) -> Result<Decimal> {
        self.inner.balance(account, unit).await
    }

    async fn adjust(&self, account: &str, unit: StakeUnit, delta: Decimal) -> Result<()> {
        let refused = self.refuse_for.lock().unwrap().clone();
        if delta > Decimal::ZERO && refused.as_deref() == Some(account) {
            bail!("credit refused for {account}");
        }
        self.inner.adjust(account, unit, delta).await
    }
}

/// Service wired to inspectable in-memory ports with a fixed outcome and
/// a timer deadline far enough out that tests control resolution.
pub struct Fixture {
    pub service: Arc<GameService>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<RecordingStore>,
}

pub fn fixture(outcome: i64) -> Fixture {
    fixture_with_duration(outcome, Duration::from_secs(600))
}

pub fn fixture_with_duration(outcome: i64, round_duration: Duration) -> Fixture {
    let ledger = Arc::new(InMemoryLedger::new());
    let store = Arc::new(RecordingStore::new());
    let service = GameService::new(
        ledger.clone(),
        store.clone(),
        Arc::new(FixedRandomness(outcome)),
        GameConfig {
            round_duration,
            ..GameConfig::default()
        },
    );
    Fixture {
        service,
        ledger,
        store,
    }
}

/// Like `fixture`, but the service talks to a `CreditRefusingLedger`
/// wrapping the returned inner ledger.
pub fn fixture_with_flaky_credits(
    outcome: i64,
) -> (Arc<GameService>, Arc<CreditRefusingLedger>, Arc<RecordingStore>) {
    let inner = Arc::new(InMemoryLedger::new());
    let flaky = Arc::new(CreditRefusingLedger::new(inner));
    let store = Arc::new(RecordingStore::new());
    let service = GameService::new(
        flaky.clone() as Arc<dyn LedgerPort>,
        store.clone() as Arc<dyn RoundStore>,
        Arc::new(FixedRandomness(outcome)),
        GameConfig {
            round_duration: Duration::from_secs(600),
            ..GameConfig::default()
        },
    );
    (service, flaky, store)
}
