//! Feature layer: closed-bar feature vectors computed three ways.
//!
//! Every feature exposes:
//! - `value_at(history)`: the reference per-bar computation over a bar slice
//!   (used by the live path, recomputed from scratch each bar);
//! - `compute_series(columns)`: batch computation over a closed window;
//! - `stream()`: an incremental state machine fed one bar at a time over
//!   column views (the fast path).
//!
//! All three share the arithmetic in `kernels`, so they agree bit-for-bit.
//! `parity::verify_parity` proves it for a concrete bar sequence before the
//! fast path is trusted.
//!
//! # Look-ahead contamination guard
//! No feature value at bar t may depend on price data from bar t+1 or later.

pub mod kernels;
pub mod momentum;
pub mod parity;
pub mod set;
pub mod trend;
pub mod volatility;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Bar;

pub use momentum::{Return, Rsi};
pub use parity::{
    live_features, precompute_features, verify_parity, FastFeatures, ParityError,
    ParityMismatch, ParityReport,
};
pub use set::{create_feature, FeatureSet};
pub use trend::{EmaTrend, SmaRatio};
pub use volatility::{AtrPct, Volatility};

// ─── Feature contract ────────────────────────────────────────────────

/// Trait for features.
///
/// Output before `lookback()` closed bars is `f64::NAN` (warmup).
pub trait Feature: Send + Sync {
    /// Key in the feature vector (e.g. "rsi_14", "ema_trend_12_26").
    fn name(&self) -> &str;

    /// Index of the first bar with a defined value.
    fn lookback(&self) -> usize;

    /// Value at the last bar of `history`. NaN for an empty or too-short history.
    fn value_at(&self, history: &[Bar]) -> f64;

    /// One value per bar of `columns`.
    fn compute_series(&self, columns: &BarColumns) -> Vec<f64>;

    /// A fresh incremental state.
    fn stream(&self) -> Box<dyn FeatureStream>;
}

/// Incremental feature state. `push` receives bars strictly in order.
pub trait FeatureStream: Send {
    fn push(&mut self, point: BarPoint) -> f64;
}

/// The price fields of one bar, as read from a column view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarPoint {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

// ─── Column view ─────────────────────────────────────────────────────

/// Struct-of-arrays view over a bar series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarColumns {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut columns = Self {
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            columns.open.push(bar.open);
            columns.high.push(bar.high);
            columns.low.push(bar.low);
            columns.close.push(bar.close);
            columns.volume.push(bar.volume);
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn point(&self, index: usize) -> BarPoint {
        BarPoint {
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
        }
    }
}

// ─── Feature vector ──────────────────────────────────────────────────

/// Named feature values for one closed bar. Ordered for deterministic hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every value is finite (i.e. past warmup).
    pub fn is_complete(&self) -> bool {
        self.0.values().all(|v| v.is_finite())
    }

    /// Exact equality on `f64::to_bits`, with NaN equal to NaN.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && bits_eq(*va, *vb))
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Bit-level float equality; any NaN equals any NaN.
pub fn bits_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

// ─── Mode ────────────────────────────────────────────────────────────

/// How the executor obtains per-bar features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    /// Per-bar reference computation over `bars[..now_index]`.
    Live,
    /// Batch computation over the closed window, once per symbol.
    #[default]
    Precomputed,
    /// Incremental column-view computation, once per symbol.
    Fast,
}
