// =============================================================================
// Runtime Configuration - JSON settings with atomic save
// =============================================================================
//
// Every tunable of the simulator lives here: server address, market data
// source, analysis windows and paper-account parameters.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::regime::engine::DEFAULT_FEATURE_WINDOW;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_history_days() -> u32 {
    365
}

fn default_feature_window() -> usize {
    DEFAULT_FEATURE_WINDOW
}

fn default_price_history_tail() -> usize {
    30
}

fn default_initial_cash() -> f64 {
    50_000.0
}

fn default_trade_history_limit() -> usize {
    50
}

fn default_ledger_path() -> Option<String> {
    Some("ear_ledger.json".to_string())
}

fn default_coin_ids() -> BTreeMap<String, String> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("SOL", "solana"),
        ("DOGE", "dogecoin"),
        ("XRP", "ripple"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_fallback_prices() -> BTreeMap<String, f64> {
    [("BTC", 42_150.0), ("ETH", 2_240.0), ("SOL", 98.5)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Price reported for a symbol with no configured fallback.
pub const DEFAULT_FALLBACK_PRICE: f64 = 100.0;

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the EAR simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Server -------------------------------------------------------------

    /// Address the REST API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // --- Market data --------------------------------------------------------

    /// CoinGecko REST base URL (no trailing slash).
    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,

    /// Per-request timeout for market data calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Days of daily history fetched for each analysis.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Ticker -> CoinGecko coin id. Unknown tickers are lower-cased.
    #[serde(default = "default_coin_ids")]
    pub coin_ids: BTreeMap<String, String>,

    /// Prices reported when the spot endpoint is unreachable.
    #[serde(default = "default_fallback_prices")]
    pub fallback_prices: BTreeMap<String, f64>,

    // --- Analysis -----------------------------------------------------------

    /// Trailing window for EPI and ETB.
    #[serde(default = "default_feature_window")]
    pub feature_window: usize,

    /// Number of history points echoed back by the market endpoint.
    #[serde(default = "default_price_history_tail")]
    pub price_history_tail: usize,

    // --- Paper account ------------------------------------------------------

    /// Starting USD balance of the paper ledger.
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,

    /// Maximum trades returned by the history endpoint.
    #[serde(default = "default_trade_history_limit")]
    pub trade_history_limit: usize,

    /// Where the paper book is saved. `null` keeps it in memory only.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            coingecko_base_url: default_coingecko_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            history_days: default_history_days(),
            coin_ids: default_coin_ids(),
            fallback_prices: default_fallback_prices(),
            feature_window: default_feature_window(),
            price_history_tail: default_price_history_tail(),
            initial_cash: default_initial_cash(),
            trade_history_limit: default_trade_history_limit(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            history_days = config.history_days,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// CoinGecko id for a ticker (case-insensitive).
    pub fn coin_id(&self, symbol: &str) -> String {
        self.coin_ids
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| symbol.to_lowercase())
    }

    /// Offline spot price for a ticker (case-insensitive).
    pub fn fallback_price(&self, symbol: &str) -> f64 {
        self.fallback_prices
            .get(&symbol.to_uppercase())
            .copied()
            .unwrap_or(DEFAULT_FALLBACK_PRICE)
    }
}
