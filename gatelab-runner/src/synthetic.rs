//! Synthetic market: seeded random-walk bars plus model predictions.
//!
//! Regimes follow a fixed script (`bull`, `bear`, `neutral`, repeating every
//! `regime_length` bars) and set the drift of the walk. Predictions lean
//! toward the current regime with an edge that swells and fades on a sine
//! schedule, plus uniform noise. Predictions at bar t use nothing after t.
//!
//! Bars and predictions draw from separate `RngHierarchy` streams, so changing
//! the prediction noise never moves a price.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use gatelab_core::components::RawPrediction;
use gatelab_core::domain::{Bar, BarError, MarketData};
use gatelab_core::execution::PredictionTable;
use gatelab_core::rng::{RngHierarchy, BARS_STREAM, PREDICTIONS_STREAM};

use crate::config::ConfigError;

/// Regime labels in script order.
pub const REGIME_SCRIPT: [&str; 3] = ["bull", "bear", "neutral"];

/// `[market]`: parameters of the generated market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub symbols: Vec<String>,
    pub bars: usize,
    pub start: NaiveDateTime,
    pub interval_minutes: i64,
    pub start_price: f64,
    /// Per-bar drift magnitude; positive in bull, negative in bear.
    pub drift: f64,
    /// Half-width of the uniform per-bar return shock.
    pub volatility: f64,
    pub regime_length: usize,
    /// Peak lean of the predicted long probability away from 0.5.
    pub edge: f64,
    /// Bars per full cycle of the edge schedule.
    pub edge_period: usize,
    /// Half-width of the uniform noise on the predicted probability.
    pub noise: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            symbols: vec!["BTC".to_string()],
            bars: 500,
            start: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            interval_minutes: 60,
            start_price: 100.0,
            drift: 0.001,
            volatility: 0.01,
            regime_length: 50,
            edge: 0.25,
            edge_period: 40,
            noise: 0.1,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(format!("market: {msg}")));
        if self.symbols.is_empty() {
            return invalid("at least one symbol is required".into());
        }
        if self.bars == 0 {
            return invalid("bars must be >= 1".into());
        }
        if self.interval_minutes <= 0 {
            return invalid(format!("interval_minutes must be >= 1, got {}", self.interval_minutes));
        }
        if !(self.start_price.is_finite() && self.start_price > 0.0) {
            return invalid(format!("start_price must be positive, got {}", self.start_price));
        }
        if !(self.volatility.is_finite() && (0.0..1.0).contains(&self.volatility)) {
            return invalid(format!("volatility must be in [0, 1), got {}", self.volatility));
        }
        if !(self.drift.is_finite() && self.drift.abs() < 1.0) {
            return invalid(format!("drift must be in (-1, 1), got {}", self.drift));
        }
        if self.regime_length == 0 || self.edge_period == 0 {
            return invalid("regime_length and edge_period must be >= 1".into());
        }
        for (name, value) in [("edge", self.edge), ("noise", self.noise)] {
            if !(value.is_finite() && (0.0..=0.5).contains(&value)) {
                return invalid(format!("{name} must be in [0, 0.5], got {value}"));
            }
        }
        Ok(())
    }

    /// Scripted regime at `bar_index`.
    pub fn regime_at(&self, bar_index: usize) -> &'static str {
        REGIME_SCRIPT[(bar_index / self.regime_length.max(1)) % REGIME_SCRIPT.len()]
    }

    /// Edge multiplier in [0, 1] at `bar_index`.
    fn edge_at(&self, bar_index: usize) -> f64 {
        let phase = bar_index as f64 / self.edge_period.max(1) as f64;
        0.5 * (1.0 + (std::f64::consts::TAU * phase).sin())
    }
}

/// Generated bars and predictions for every configured symbol.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    pub market: MarketData,
    pub predictions: PredictionTable,
}

/// Generate bars and predictions. Same config, same output, bit for bit.
pub fn generate(config: &SyntheticConfig) -> Result<SyntheticMarket, BarError> {
    let rng = RngHierarchy::new(config.seed);
    let mut bars = BTreeMap::new();
    let mut predictions = PredictionTable::new();
    for symbol in &config.symbols {
        bars.insert(symbol.clone(), random_walk(config, &rng, symbol));
        predictions.insert(symbol.clone(), scripted_predictions(config, &rng, symbol));
    }
    Ok(SyntheticMarket {
        market: MarketData::new(bars)?,
        predictions,
    })
}

fn regime_sign(regime: &str) -> f64 {
    match regime {
        "bull" => 1.0,
        "bear" => -1.0,
        _ => 0.0,
    }
}

fn random_walk(config: &SyntheticConfig, rng: &RngHierarchy, symbol: &str) -> Vec<Bar> {
    let mut r = rng.rng_for(BARS_STREAM, symbol, 0);
    let vol = config.volatility;
    let mut close = config.start_price;
    (0..config.bars)
        .map(|i| {
            let open = close;
            let shock = if vol > 0.0 { r.gen_range(-vol..vol) } else { 0.0 };
            let ret = regime_sign(config.regime_at(i)) * config.drift + shock;
            close = (open * (1.0 + ret)).max(0.01);
            let wick = vol / 2.0;
            let (up, down) = if wick > 0.0 {
                (r.gen_range(0.0..wick), r.gen_range(0.0..wick))
            } else {
                (0.0, 0.0)
            };
            Bar {
                symbol: symbol.to_string(),
                timestamp: config.start + Duration::minutes(config.interval_minutes * i as i64),
                open,
                high: open.max(close) * (1.0 + up),
                low: open.min(close) * (1.0 - down),
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

fn scripted_predictions(
    config: &SyntheticConfig,
    rng: &RngHierarchy,
    symbol: &str,
) -> Vec<RawPrediction> {
    let mut r = rng.rng_for(PREDICTIONS_STREAM, symbol, 0);
    (0..config.bars)
        .map(|i| {
            let regime = config.regime_at(i);
            let noise = if config.noise > 0.0 {
                r.gen_range(-config.noise..config.noise)
            } else {
                0.0
            };
            let lean = regime_sign(regime) * config.edge * config.edge_at(i);
            let long = (0.5 + lean + noise).clamp(0.0, 1.0);
            RawPrediction::new(&[("long", long), ("short", 1.0 - long)]).with_regime(regime)
        })
        .collect()
}
