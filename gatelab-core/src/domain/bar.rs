//! Bar: the fundamental market data unit, plus the per-run market container.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// OHLCV bar for a single symbol over one interval.
///
/// A bar in a backtest window is always *closed*: its close is final. The live
/// path is the only place where a still-forming bar can appear, and it is
/// excluded there by index (see `features::live_features`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close, prices > 0.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }
}

/// Errors raised while assembling market data for a run.
#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("no symbols in market data")]
    Empty,
    #[error("symbol '{0}' has no bars")]
    NoBars(String),
    #[error("bar {index} of '{symbol}' fails OHLC sanity checks")]
    Insane { symbol: String, index: usize },
    #[error("bar {index} of '{symbol}' is labelled with symbol '{found}'")]
    SymbolMismatch {
        symbol: String,
        index: usize,
        found: String,
    },
    #[error("bar {index} of '{symbol}' is not strictly after its predecessor")]
    OutOfOrder { symbol: String, index: usize },
}

/// Closed historical bars for every symbol in a run.
///
/// Keyed by symbol in a `BTreeMap` so iteration order, and therefore replay
/// order, is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketData {
    bars: BTreeMap<String, Vec<Bar>>,
}

impl MarketData {
    /// Validate and wrap per-symbol bar series.
    pub fn new(bars: BTreeMap<String, Vec<Bar>>) -> Result<Self, BarError> {
        if bars.is_empty() {
            return Err(BarError::Empty);
        }
        for (symbol, series) in &bars {
            if series.is_empty() {
                return Err(BarError::NoBars(symbol.clone()));
            }
            for (index, bar) in series.iter().enumerate() {
                if &bar.symbol != symbol {
                    return Err(BarError::SymbolMismatch {
                        symbol: symbol.clone(),
                        index,
                        found: bar.symbol.clone(),
                    });
                }
                if !bar.is_sane() {
                    return Err(BarError::Insane {
                        symbol: symbol.clone(),
                        index,
                    });
                }
                if index > 0 && series[index - 1].timestamp >= bar.timestamp {
                    return Err(BarError::OutOfOrder {
                        symbol: symbol.clone(),
                        index,
                    });
                }
            }
        }
        Ok(Self { bars })
    }

    /// Convenience constructor for a single symbol.
    pub fn single(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, BarError> {
        let mut map = BTreeMap::new();
        map.insert(symbol.into(), bars);
        Self::new(map)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(|s| s.as_str())
    }

    pub fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bar])> {
        self.bars.iter().map(|(s, v)| (s.as_str(), v.as_slice()))
    }

    /// Length of the longest series (the replay length).
    pub fn max_len(&self) -> usize {
        self.bars.values().map(|v| v.len()).max().unwrap_or(0)
    }

    pub fn symbol_count(&self) -> usize {
        self.bars.len()
    }
}

/// Build synthetic hourly bars from close prices for testing.
///
/// open = previous close (or close for the first bar), high/low = ±0.5 around
/// the open/close envelope.
#[cfg(test)]
pub fn make_bars(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: symbol.to_string(),
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}
