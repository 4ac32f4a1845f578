//! DICEPOT — group dice-wager round engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the game service to its ports, and runs a self-contained
//! play-money simulation loop with graceful shutdown. The simulation
//! stands in for the chat transport: it opens rounds, joins synthetic
//! participants, and lets the round timer drive resolution.

use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use dicepot::config::AppConfig;
use dicepot::dashboard::routes::DashboardState;
use dicepot::dashboard::spawn_dashboard;
use dicepot::engine::service::GameService;
use dicepot::error::GameError;
use dicepot::ports::memory::{InMemoryLedger, SeededRandomness};
use dicepot::ports::{RandomnessSource, RoundStore};
use dicepot::storage::JsonAuditStore;
use dicepot::types::{DiceRange, ResolutionMethod, StakeUnit};

const BANNER: &str = r#"
 ____ ___ ____ _____ ____   ___ _____
|  _ \_ _/ ___| ____|  _ \ / _ \_   _|
| | | | | |   |  _| | |_) | | | || |
| |_| | | |___| |___|  __/| |_| || |
|____/___\____|_____|_|    \___/ |_|

  Group dice-wager round engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        fee_rate = cfg.game.fee_rate,
        round_duration_secs = cfg.game.round_duration_secs,
        groups = cfg.simulation.groups,
        "DICEPOT starting up"
    );

    // -- Wire ports --------------------------------------------------------

    let ledger = Arc::new(InMemoryLedger::new());
    let opening = Decimal::from_f64(cfg.simulation.opening_balance)
        .unwrap_or_else(|| Decimal::from(500));
    for i in 0..cfg.simulation.accounts {
        let account = format!("player-{i}");
        for &unit in StakeUnit::ALL {
            ledger.fund(&account, unit, opening);
        }
    }

    let store: Arc<dyn RoundStore> = if cfg.audit.enabled {
        info!(path = ?cfg.audit.path, "Audit log enabled");
        Arc::new(JsonAuditStore::new(cfg.audit.path.as_deref()))
    } else {
        Arc::new(dicepot::ports::memory::RecordingStore::new())
    };

    let rng: Arc<dyn RandomnessSource> = Arc::new(SeededRandomness::from_entropy());

    let service = GameService::new(ledger.clone(), store, rng.clone(), cfg.game_config()?);

    // -- Dashboard ---------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(service.clone()));
        spawn_dashboard(state, cfg.dashboard.port)?;
    }

    // -- Simulation loop ---------------------------------------------------

    let mut interval =
        tokio::time::interval(Duration::from_secs(cfg.simulation.tick_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        tick_secs = cfg.simulation.tick_interval_secs,
        "Entering simulation loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if cfg.simulation.enabled {
                    run_tick(&service, &cfg, rng.as_ref()).await;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let settlements = service.recent_settlements().await;
    info!(
        settlements = settlements.len(),
        active = service.active_rounds().await.len(),
        "DICEPOT shut down cleanly."
    );

    Ok(())
}

/// One simulation tick: make sure each synthetic group has a round, and
/// throw a synthetic participant at one that does. The round timer takes
/// care of resolution.
async fn run_tick(service: &Arc<GameService>, cfg: &AppConfig, rng: &dyn RandomnessSource) {
    for i in 0..cfg.simulation.groups {
        let group_key = format!("table-{i}");

        if service.active_round(&group_key).await.is_none() {
            let range = DiceRange::with_sides(cfg.game.default_die_sides);
            match service
                .open_round(&group_key, range, ResolutionMethod::DelayedDraw)
                .await
            {
                Ok(round) => debug!(group_key, round_id = %round.round_id, "Simulated open"),
                // Lost a race with another tick; harmless
                Err(GameError::AlreadyActive) => {}
                Err(e) => warn!(group_key, error = %e, "Simulated open failed"),
            }
            continue;
        }

        let accounts = i64::from(cfg.simulation.accounts.max(1));
        let idx = rng.draw(DiceRange { min: 1, max: accounts }) - 1;
        let account = format!("player-{idx}");
        let display_name = format!("Player {idx}");
        let unit = if idx % 2 == 0 { StakeUnit::Coins } else { StakeUnit::Gems };
        let stake = Decimal::from(rng.draw(DiceRange { min: 1, max: 20 }));
        let guess = rng.draw(DiceRange::with_sides(cfg.game.default_die_sides));

        match service
            .join(&group_key, &account, &display_name, stake, unit, guess)
            .await
        {
            Ok(p) => debug!(group_key, account = %p.account, guess, "Simulated join"),
            Err(e) if e.is_validation() => debug!(group_key, reason = %e, "Join skipped"),
            Err(e) => warn!(group_key, error = %e, "Simulated join failed"),
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dicepot=info"));

    let json_logging = std::env::var("DICEPOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
