// =============================================================================
// Paper Ledger - simulated cash, holdings and closed-trade journal
// =============================================================================
//
// Life-cycle of an asset holding:
//   BUY   ->  holding created (or averaged up/down)
//   SELL  ->  holding reduced; removed once empty; closed trade journaled
//
// Cash is the `USD` holding at price 1. Only long exposure exists.
//
// The book (holdings + journal) persists as one JSON file, written with the
// same tmp + rename pattern as the runtime config.
//
// Thread-safety: all mutable state is behind `parking_lot::RwLock`.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::indicators::stats::{mean, population_std};
use crate::regime::{FeatureSet, PositionState, Regime};

/// Ticker of the cash holding.
pub const CASH_ASSET: &str = "USD";

/// Remaining quantity treated as a fully closed holding.
const DUST: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Insufficient USD balance")]
    InsufficientCash { required: f64, available: f64 },

    #[error("Insufficient {asset} balance")]
    InsufficientHolding { asset: String, requested: f64, available: f64 },

    #[error("{field} must be a positive number")]
    InvalidQuantity { field: &'static str },

    #[error("USD cannot be traded")]
    CashNotTradable,
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Quantity held of one asset and its weighted average entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: String,
    pub amount: f64,
    pub avg_price: f64,
    pub updated_at: DateTime<Utc>,
}

/// A closed (sold) paper trade with the regime snapshot at exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    pub asset: String,
    /// Always "LONG".
    #[serde(rename = "type")]
    pub trade_type: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub amount: f64,
    pub pnl_percent: f64,
    pub regime: String,
    pub epi: f64,
    pub eci: f64,
    pub etb: f64,
    pub notes: String,
}

/// Regime context captured when a sale is recorded.
#[derive(Debug, Clone, Copy)]
pub struct RegimeSnapshot {
    pub regime: Regime,
    pub features: FeatureSet,
}

/// On-disk form of the ledger.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerBook {
    holdings: Vec<Holding>,
    trades: Vec<TradeRecord>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Thread-safe paper account.
pub struct PaperLedger {
    holdings: RwLock<BTreeMap<String, Holding>>,
    /// Full trade journal, oldest first. Unbounded: it is the account's
    /// history and is persisted whole; readers page it via `recent_trades`.
    trades: RwLock<Vec<TradeRecord>>,
}

impl PaperLedger {
    /// Create a ledger funded with `initial_cash` USD.
    pub fn new(initial_cash: f64) -> Self {
        let mut holdings = BTreeMap::new();
        holdings.insert(
            CASH_ASSET.to_string(),
            Holding {
                asset: CASH_ASSET.to_string(),
                amount: initial_cash,
                avg_price: 1.0,
                updated_at: Utc::now(),
            },
        );

        Self {
            holdings: RwLock::new(holdings),
            trades: RwLock::new(Vec::new()),
        }
    }

    /// Load the book saved at `path`, or start fresh with `initial_cash` when
    /// no file exists yet. A file that exists but cannot be read is an error.
    pub fn load_or_new(path: impl AsRef<Path>, initial_cash: f64) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), initial_cash, "no saved ledger, starting fresh");
            return Ok(Self::new(initial_cash));
        }
        Self::load(path)
    }

    /// Load a book written by [`PaperLedger::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ledger from {}", path.display()))?;
        let book: LedgerBook = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse ledger from {}", path.display()))?;

        let mut holdings: BTreeMap<String, Holding> = book
            .holdings
            .into_iter()
            .map(|h| (h.asset.clone(), h))
            .collect();
        holdings
            .entry(CASH_ASSET.to_string())
            .or_insert_with(|| Holding {
                asset: CASH_ASSET.to_string(),
                amount: 0.0,
                avg_price: 1.0,
                updated_at: Utc::now(),
            });

        info!(
            path = %path.display(),
            holdings = holdings.len(),
            trades = book.trades.len(),
            "paper ledger loaded"
        );

        Ok(Self {
            holdings: RwLock::new(holdings),
            trades: RwLock::new(book.trades),
        })
    }

    /// Persist the book to `path` (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let book = LedgerBook {
            holdings: self.holdings(),
            trades: self.trades.read().clone(),
        };
        let content =
            serde_json::to_string_pretty(&book).context("failed to serialise ledger to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp ledger to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp ledger to {}", path.display()))?;

        debug!(path = %path.display(), trades = book.trades.len(), "paper ledger saved");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Trading
    // -------------------------------------------------------------------------

    /// Buy `amount` of `asset` at `price` using cash.
    pub fn buy(&self, asset: &str, amount: f64, price: f64) -> Result<(), LedgerError> {
        let asset = normalise_asset(asset)?;
        validate(amount, price)?;

        let cost = amount * price;
        let mut holdings = self.holdings.write();

        let available = holdings.get(CASH_ASSET).map(|h| h.amount).unwrap_or(0.0);
        if cost > available {
            warn!(asset = %asset, cost, available, "paper buy rejected: insufficient cash");
            return Err(LedgerError::InsufficientCash {
                required: cost,
                available,
            });
        }

        let now = Utc::now();
        if let Some(cash) = holdings.get_mut(CASH_ASSET) {
            cash.amount -= cost;
            cash.updated_at = now;
        }

        holdings
            .entry(asset.clone())
            .and_modify(|h| {
                let new_amount = h.amount + amount;
                h.avg_price = (h.amount * h.avg_price + amount * price) / new_amount;
                h.amount = new_amount;
                h.updated_at = now;
            })
            .or_insert_with(|| Holding {
                asset: asset.clone(),
                amount,
                avg_price: price,
                updated_at: now,
            });

        info!(asset = %asset, amount, price, cost, "paper buy executed");
        Ok(())
    }

    /// Sell `amount` of `asset` at `price` and journal the closed trade.
    pub fn sell(
        &self,
        asset: &str,
        amount: f64,
        price: f64,
        snapshot: RegimeSnapshot,
    ) -> Result<TradeRecord, LedgerError> {
        let asset = normalise_asset(asset)?;
        validate(amount, price)?;

        let mut holdings = self.holdings.write();

        let (held, avg_price) = match holdings.get(&asset) {
            Some(h) if h.amount >= amount => (h.amount, h.avg_price),
            other => {
                let available = other.map(|h| h.amount).unwrap_or(0.0);
                warn!(asset = %asset, amount, available, "paper sell rejected: insufficient holding");
                return Err(LedgerError::InsufficientHolding {
                    asset,
                    requested: amount,
                    available,
                });
            }
        };

        let now = Utc::now();
        let remaining = held - amount;
        if remaining.abs() < DUST {
            holdings.remove(&asset);
        } else if let Some(h) = holdings.get_mut(&asset) {
            h.amount = remaining;
            h.updated_at = now;
        }

        let proceeds = amount * price;
        if let Some(cash) = holdings.get_mut(CASH_ASSET) {
            cash.amount += proceeds;
            cash.updated_at = now;
        }
        drop(holdings);

        let record = TradeRecord {
            id: Uuid::new_v4().to_string(),
            date: now,
            asset: asset.clone(),
            trade_type: "LONG".to_string(),
            entry_price: avg_price,
            exit_price: price,
            amount,
            pnl_percent: (price - avg_price) / avg_price * 100.0,
            regime: snapshot.regime.symbol().to_string(),
            epi: snapshot.features.epi,
            eci: snapshot.features.eci,
            etb: snapshot.features.etb,
            notes: "Paper trade executed".to_string(),
        };

        info!(
            asset = %asset,
            amount,
            price,
            proceeds,
            pnl_percent = format!("{:.2}", record.pnl_percent),
            regime = %snapshot.regime,
            "paper sell executed"
        );

        self.trades.write().push(record.clone());
        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of every holding, cash first.
    pub fn holdings(&self) -> Vec<Holding> {
        let holdings = self.holdings.read();
        let mut out: Vec<Holding> = holdings.get(CASH_ASSET).cloned().into_iter().collect();
        out.extend(
            holdings
                .values()
                .filter(|h| h.asset != CASH_ASSET)
                .cloned(),
        );
        out
    }

    #[cfg(test)]
    pub fn cash(&self) -> f64 {
        self.holdings
            .read()
            .get(CASH_ASSET)
            .map(|h| h.amount)
            .unwrap_or(0.0)
    }

    /// Position tag for the recommendation engine.
    pub fn position_for(&self, asset: &str) -> PositionState {
        let asset = asset.to_uppercase();
        if asset == CASH_ASSET {
            return PositionState::Flat;
        }
        match self.holdings.read().get(&asset) {
            Some(h) if h.amount > 0.0 => PositionState::Long,
            _ => PositionState::Flat,
        }
    }

    /// The most recent `count` closed trades (newest first).
    pub fn recent_trades(&self, count: usize) -> Vec<TradeRecord> {
        self.trades.read().iter().rev().take(count).cloned().collect()
    }
}

impl std::fmt::Debug for PaperLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperLedger")
            .field("holdings", &self.holdings.read().len())
            .field("trades", &self.trades.read().len())
            .finish()
    }
}

fn normalise_asset(asset: &str) -> Result<String, LedgerError> {
    let asset = asset.trim().to_uppercase();
    if asset == CASH_ASSET {
        return Err(LedgerError::CashNotTradable);
    }
    Ok(asset)
}

fn validate(amount: f64, price: f64) -> Result<(), LedgerError> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(LedgerError::InvalidQuantity { field: "amount" });
    }
    if !(price.is_finite() && price > 0.0) {
        return Err(LedgerError::InvalidQuantity { field: "price" });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate performance of a set of closed trades (percent PnL based).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStatistics {
    pub total_trades: usize,
    /// Percentage of trades with positive PnL.
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub sharpe_ratio: f64,
    /// Worst single-trade PnL percent.
    pub max_drawdown: f64,
}

impl TradeStatistics {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_percent).collect();
        if pnls.is_empty() {
            return Self {
                total_trades: 0,
                win_rate: 0.0,
                avg_win: 0.0,
                avg_loss: 0.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
            };
        }

        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

        let sharpe_ratio = match (mean(&pnls), population_std(&pnls)) {
            (Some(m), Some(sd)) if pnls.len() > 1 && sd != 0.0 => m / sd,
            _ => 0.0,
        };

        Self {
            total_trades: pnls.len(),
            win_rate: wins.len() as f64 / pnls.len() as f64 * 100.0,
            avg_win: mean(&wins).unwrap_or(0.0),
            avg_loss: mean(&losses).unwrap_or(0.0),
            sharpe_ratio,
            max_drawdown: pnls.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}
