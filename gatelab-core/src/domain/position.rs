//! Open position state, owned exclusively by the position manager.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::{SignalId, TradeId};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// A confirmed open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: TradeId,
    pub signal_id: SignalId,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    /// Fill price after slippage.
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_fee: f64,
    /// Aggregate pipeline confidence of the signal that opened the position.
    pub entry_confidence: f64,
    /// Last close the position was marked at.
    pub mark_price: f64,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Unrealized PnL at `price`, before exit fees.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.quantity
    }

    /// Side-adjusted return of `price` relative to the entry fill.
    pub fn return_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (price / self.entry_price - 1.0)
    }

    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_bar)
    }
}
