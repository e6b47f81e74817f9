// =============================================================================
// Central Application State - EAR Trader Simulator
// =============================================================================
//
// Ties the long-lived collaborators together for the API handlers: config,
// market data feed, paper ledger and the (stateless) EAR engine.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the mutable config.
//   - The ledger manages its own interior mutability.
//
// The paper book is loaded from `ledger_path` at startup and written back
// after every executed trade.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::warn;

use crate::ledger::PaperLedger;
use crate::market_data::PriceFeed;
use crate::regime::EarEngine;
use crate::runtime_config::RuntimeConfig;

/// Central application state shared across handlers via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every ledger mutation.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub price_feed: Arc<PriceFeed>,
    pub ledger: Arc<PaperLedger>,
    pub engine: EarEngine,

    /// Instant when the server was started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build every subsystem from `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let price_feed = Arc::new(PriceFeed::new(&config)?);
        let ledger = Arc::new(match &config.ledger_path {
            Some(path) => PaperLedger::load_or_new(path, config.initial_cash)?,
            None => PaperLedger::new(config.initial_cash),
        });
        let engine = EarEngine::new(config.feature_window);

        Ok(Self {
            state_version: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            price_feed,
            ledger,
            engine,
            start_time: std::time::Instant::now(),
        })
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Write the paper book to the configured path (best-effort).
    pub fn persist_ledger(&self) {
        let Some(path) = self.runtime_config.read().ledger_path.clone() else {
            return;
        };
        if let Err(e) = self.ledger.save(&path) {
            warn!(path = %path, error = %e, "Failed to save paper ledger");
        }
    }
}
