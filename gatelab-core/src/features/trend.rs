//! Trend features: close relative to its SMA, and fast/slow EMA spread.

use std::collections::VecDeque;

use crate::components::FactoryError;
use crate::domain::Bar;

use super::kernels::{ema_alpha, ema_step, mean_of, relative_to};
use super::set::check_period;
use super::{BarColumns, BarPoint, Feature, FeatureStream};

// ─── SMA ratio ───────────────────────────────────────────────────────

/// `close / SMA(close, period) - 1`. Lookback: period - 1.
#[derive(Debug, Clone)]
pub struct SmaRatio {
    pub(super) period: usize,
    pub(super) name: String,
}

impl SmaRatio {
    pub const TYPE: &'static str = "sma_ratio";

    pub fn new(period: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "period", period, 1)?;
        Ok(Self {
            period,
            name: format!("sma_ratio_{period}"),
        })
    }
}

impl Feature for SmaRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        let n = history.len();
        if n < self.period {
            return f64::NAN;
        }
        let mean = mean_of(history[n - self.period..].iter().map(|b| b.close));
        relative_to(history[n - 1].close, mean)
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let close = &columns.close;
        (0..close.len())
            .map(|t| {
                if t + 1 < self.period {
                    return f64::NAN;
                }
                let mean = mean_of(close[t + 1 - self.period..=t].iter().copied());
                relative_to(close[t], mean)
            })
            .collect()
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(SmaRatioStream {
            period: self.period,
            window: VecDeque::with_capacity(self.period),
        })
    }
}

struct SmaRatioStream {
    period: usize,
    window: VecDeque<f64>,
}

impl FeatureStream for SmaRatioStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        self.window.push_back(point.close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        if self.window.len() < self.period {
            return f64::NAN;
        }
        relative_to(point.close, mean_of(self.window.iter().copied()))
    }
}

// ─── EMA trend ───────────────────────────────────────────────────────

/// `EMA(fast) / EMA(slow) - 1`. Each EMA is seeded with the SMA of its first
/// `period` closes. Lookback: slow - 1.
#[derive(Debug, Clone)]
pub struct EmaTrend {
    pub(super) fast: usize,
    pub(super) slow: usize,
    pub(super) name: String,
}

impl EmaTrend {
    pub const TYPE: &'static str = "ema_trend";

    pub fn new(fast: usize, slow: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "fast", fast, 1)?;
        if slow <= fast {
            return Err(FactoryError::InvalidParam {
                component: Self::TYPE.into(),
                param: "slow".into(),
                value: slow as f64,
                expected: "a period greater than fast",
            });
        }
        Ok(Self {
            fast,
            slow,
            name: format!("ema_trend_{fast}_{slow}"),
        })
    }
}

/// EMA of the full slice, evaluated at its last element.
fn ema_last(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period {
        return f64::NAN;
    }
    let alpha = ema_alpha(period);
    let seed = mean_of(closes[..period].iter().copied());
    closes[period..]
        .iter()
        .fold(seed, |prev, &x| ema_step(prev, x, alpha))
}

/// EMA at every index; NaN before `period - 1`.
fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; closes.len()];
    if closes.len() < period {
        return result;
    }
    let alpha = ema_alpha(period);
    let mut prev = mean_of(closes[..period].iter().copied());
    result[period - 1] = prev;
    for t in period..closes.len() {
        prev = ema_step(prev, closes[t], alpha);
        result[t] = prev;
    }
    result
}

impl Feature for EmaTrend {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.slow - 1
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        if history.len() < self.slow {
            return f64::NAN;
        }
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        relative_to(ema_last(&closes, self.fast), ema_last(&closes, self.slow))
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let fast = ema_series(&columns.close, self.fast);
        let slow = ema_series(&columns.close, self.slow);
        fast.iter()
            .zip(&slow)
            .enumerate()
            .map(|(t, (f, s))| {
                if t + 1 < self.slow {
                    f64::NAN
                } else {
                    relative_to(*f, *s)
                }
            })
            .collect()
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(EmaTrendStream {
            fast: EmaState::new(self.fast),
            slow: EmaState::new(self.slow),
        })
    }
}

/// Incremental EMA; the seed sum accumulates in arrival order.
struct EmaState {
    period: usize,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl EmaState {
    fn new(period: usize) -> Self {
        Self {
            period,
            alpha: ema_alpha(period),
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    fn push(&mut self, x: f64) -> f64 {
        if let Some(prev) = self.value {
            let next = ema_step(prev, x, self.alpha);
            self.value = Some(next);
            return next;
        }
        self.seen += 1;
        self.seed_sum += x;
        if self.seen < self.period {
            return f64::NAN;
        }
        let seed = self.seed_sum / self.period as f64;
        self.value = Some(seed);
        seed
    }
}

struct EmaTrendStream {
    fast: EmaState,
    slow: EmaState,
}

impl FeatureStream for EmaTrendStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        let fast = self.fast.push(point.close);
        let slow = self.slow.push(point.close);
        if slow.is_nan() {
            return f64::NAN;
        }
        relative_to(fast, slow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    #[test]
    fn sma_ratio_flat_is_zero() {
        let bars = make_bars("BTC", &[10.0; 6]);
        let f = SmaRatio::new(3).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        assert!(series[1].is_nan());
        assert_eq!(series[2], 0.0);
        assert_eq!(series[5], 0.0);
    }

    #[test]
    fn sma_ratio_value_at_matches_series() {
        let bars = make_bars("BTC", &[10.0, 11.0, 13.0, 12.0, 15.0]);
        let f = SmaRatio::new(3).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        for t in 0..bars.len() {
            assert!(super::super::bits_eq(f.value_at(&bars[..=t]), series[t]));
        }
    }

    #[test]
    fn ema_trend_sign_follows_trend() {
        let up: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let f = EmaTrend::new(3, 8).unwrap();
        let up_series = f.compute_series(&BarColumns::from_bars(&make_bars("A", &up)));
        let down_series = f.compute_series(&BarColumns::from_bars(&make_bars("B", &down)));
        assert!(up_series[39] > 0.0);
        assert!(down_series[39] < 0.0);
        assert!(up_series[6].is_nan());
        assert!(up_series[7].is_finite());
    }

    #[test]
    fn ema_trend_rejects_inverted_periods() {
        assert!(EmaTrend::new(26, 12).is_err());
        assert!(EmaTrend::new(12, 12).is_err());
        assert!(EmaTrend::new(0, 12).is_err());
    }

    #[test]
    fn ema_stream_matches_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.3).cos() * 4.0).collect();
        let bars = make_bars("BTC", &closes);
        let columns = BarColumns::from_bars(&bars);
        let f = EmaTrend::new(4, 9).unwrap();
        let series = f.compute_series(&columns);
        let mut stream = f.stream();
        for (i, expected) in series.iter().enumerate() {
            assert!(super::super::bits_eq(stream.push(columns.point(i)), *expected));
        }
    }
}
