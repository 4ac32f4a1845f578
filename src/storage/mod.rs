//! Persistence layer.
//!
//! Append-only JSON-lines audit log implementing the `RoundStore` port.
//! The engine only ever writes here — nothing reads it back for logic
//! decisions — so a flat event log is sufficient for the audit/history
//! requirement. A relational store can implement the same port later.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::ports::{BetOutcome, NewBet, RoundAggregate, RoundStore};
use crate::types::{Round, StatsDelta};

/// Default audit log path.
const DEFAULT_AUDIT_FILE: &str = "dicepot_audit.jsonl";

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent<'a> {
    RoundCreated {
        record_id: &'a str,
        round: &'a Round,
    },
    RoundUpdated {
        record_id: &'a str,
        update: &'a RoundAggregate,
    },
    BetCreated {
        bet_ref: &'a str,
        bet: &'a NewBet,
    },
    BetUpdated {
        bet_ref: &'a str,
        outcome: &'a BetOutcome,
    },
    StatsIncremented {
        account: &'a str,
        delta: &'a StatsDelta,
    },
}

/// File-backed audit log. One JSON object per line, written under a
/// lock so concurrent settlements never interleave partial lines.
pub struct JsonAuditStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonAuditStore {
    pub fn new(path: Option<&str>) -> Self {
        Self {
            path: PathBuf::from(path.unwrap_or(DEFAULT_AUDIT_FILE)),
            write_lock: Mutex::new(()),
        }
    }

    fn append(&self, event: &AuditEvent<'_>) -> Result<()> {
        let mut envelope =
            serde_json::to_value(event).context("Failed to serialise audit event")?;
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert(
                "at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        let line = envelope.to_string();

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to audit log {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Audit event appended");
        Ok(())
    }
}

#[async_trait]
impl RoundStore for JsonAuditStore {
    async fn create_round(&self, round: &Round) -> Result<String> {
        let record_id = format!("audit-round-{}", uuid::Uuid::new_v4());
        self.append(&AuditEvent::RoundCreated {
            record_id: &record_id,
            round,
        })?;
        Ok(record_id)
    }

    async fn update_round_aggregate(
        &self,
        record_id: &str,
        update: &RoundAggregate,
    ) -> Result<()> {
        self.append(&AuditEvent::RoundUpdated { record_id, update })
    }

    async fn create_bet(&self, bet: &NewBet) -> Result<String> {
        let bet_ref = format!("audit-bet-{}", uuid::Uuid::new_v4());
        self.append(&AuditEvent::BetCreated {
            bet_ref: &bet_ref,
            bet,
        })?;
        Ok(bet_ref)
    }

    async fn update_bet(&self, bet_ref: &str, outcome: &BetOutcome) -> Result<()> {
        self.append(&AuditEvent::BetUpdated { bet_ref, outcome })
    }

    async fn increment_user_stats(&self, account: &str, delta: &StatsDelta) -> Result<()> {
        self.append(&AuditEvent::StatsIncremented { account, delta })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
