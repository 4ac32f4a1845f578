//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (collaborator credentials) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::service::GameConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub game: GameSettings,
    pub simulation: SimulationSettings,
    pub dashboard: DashboardSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameSettings {
    /// Fraction of each pot retained before distribution (e.g. 0.02).
    pub fee_rate: f64,
    /// Seconds between a round opening and its automatic resolution.
    pub round_duration_secs: u64,
    /// Payouts truncated to this many decimal places.
    pub payout_scale: u32,
    /// Die used when the opener doesn't pick one.
    pub default_die_sides: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationSettings {
    pub enabled: bool,
    /// Number of synthetic groups to run rounds in.
    pub groups: u32,
    /// Number of synthetic accounts joining rounds.
    pub accounts: u32,
    pub tick_interval_secs: u64,
    /// Play-money opening balance per account and unit.
    pub opening_balance: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Engine config derived from the `[game]` section.
    pub fn game_config(&self) -> Result<GameConfig> {
        let fee_rate = Decimal::from_f64(self.game.fee_rate)
            .with_context(|| format!("fee_rate not representable: {}", self.game.fee_rate))?;
        anyhow::ensure!(
            fee_rate >= Decimal::ZERO && fee_rate < Decimal::ONE,
            "fee_rate must be in [0, 1), got {fee_rate}"
        );
        Ok(GameConfig {
            fee_rate,
            round_duration: Duration::from_secs(self.game.round_duration_secs),
            payout_scale: self.game.payout_scale,
        })
    }
}
