//! Momentum features: n-bar return and Wilder RSI.

use std::collections::VecDeque;

use crate::components::FactoryError;
use crate::domain::Bar;

use super::kernels::{gain_loss, mean_of, relative_to, rsi_from, wilder_step};
use super::set::check_period;
use super::{BarColumns, BarPoint, Feature, FeatureStream};

// ─── Return ──────────────────────────────────────────────────────────

/// `close[t] / close[t - period] - 1`. Lookback: period.
#[derive(Debug, Clone)]
pub struct Return {
    pub(super) period: usize,
    pub(super) name: String,
}

impl Return {
    pub const TYPE: &'static str = "return";

    pub fn new(period: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "period", period, 1)?;
        Ok(Self {
            period,
            name: format!("return_{period}"),
        })
    }
}

impl Feature for Return {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        let n = history.len();
        if n <= self.period {
            return f64::NAN;
        }
        relative_to(history[n - 1].close, history[n - 1 - self.period].close)
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let close = &columns.close;
        (0..close.len())
            .map(|t| {
                if t < self.period {
                    f64::NAN
                } else {
                    relative_to(close[t], close[t - self.period])
                }
            })
            .collect()
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(ReturnStream {
            period: self.period,
            window: VecDeque::with_capacity(self.period + 1),
        })
    }
}

struct ReturnStream {
    period: usize,
    window: VecDeque<f64>,
}

impl FeatureStream for ReturnStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        self.window.push_back(point.close);
        if self.window.len() > self.period + 1 {
            self.window.pop_front();
        }
        match (self.window.front(), self.window.back()) {
            (Some(&then), Some(&now)) if self.window.len() == self.period + 1 => {
                relative_to(now, then)
            }
            _ => f64::NAN,
        }
    }
}

// ─── RSI ─────────────────────────────────────────────────────────────

/// Wilder RSI. Seeded with the mean gain/loss over the first `period` changes.
/// Lookback: period.
#[derive(Debug, Clone)]
pub struct Rsi {
    pub(super) period: usize,
    pub(super) name: String,
}

impl Rsi {
    pub const TYPE: &'static str = "rsi";

    pub fn new(period: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "period", period, 1)?;
        Ok(Self {
            period,
            name: format!("rsi_{period}"),
        })
    }
}

impl Feature for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        let n = self.period;
        if history.len() <= n {
            return f64::NAN;
        }
        let change = |i: usize| gain_loss(history[i - 1].close, history[i].close);
        let mut avg_gain = mean_of((1..=n).map(|i| change(i).0));
        let mut avg_loss = mean_of((1..=n).map(|i| change(i).1));
        for i in n + 1..history.len() {
            let (gain, loss) = change(i);
            avg_gain = wilder_step(avg_gain, gain, n);
            avg_loss = wilder_step(avg_loss, loss, n);
        }
        rsi_from(avg_gain, avg_loss)
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let n = self.period;
        let close = &columns.close;
        let mut result = vec![f64::NAN; close.len()];
        if close.len() <= n {
            return result;
        }

        let changes: Vec<(f64, f64)> = (1..close.len())
            .map(|i| gain_loss(close[i - 1], close[i]))
            .collect();
        // changes[i - 1] is the change into bar i.
        let mut avg_gain = mean_of(changes[..n].iter().map(|c| c.0));
        let mut avg_loss = mean_of(changes[..n].iter().map(|c| c.1));
        result[n] = rsi_from(avg_gain, avg_loss);
        for t in n + 1..close.len() {
            let (gain, loss) = changes[t - 1];
            avg_gain = wilder_step(avg_gain, gain, n);
            avg_loss = wilder_step(avg_loss, loss, n);
            result[t] = rsi_from(avg_gain, avg_loss);
        }
        result
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(RsiStream {
            period: self.period,
            prev_close: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            averages: None,
        })
    }
}

struct RsiStream {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    averages: Option<(f64, f64)>,
}

impl FeatureStream for RsiStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        let Some(prev) = self.prev_close.replace(point.close) else {
            return f64::NAN;
        };
        let (gain, loss) = gain_loss(prev, point.close);
        self.changes += 1;

        match self.averages {
            Some((avg_gain, avg_loss)) => {
                let avg_gain = wilder_step(avg_gain, gain, self.period);
                let avg_loss = wilder_step(avg_loss, loss, self.period);
                self.averages = Some((avg_gain, avg_loss));
                rsi_from(avg_gain, avg_loss)
            }
            None => {
                self.gain_sum += gain;
                self.loss_sum += loss;
                if self.changes < self.period {
                    return f64::NAN;
                }
                let avg_gain = self.gain_sum / self.period as f64;
                let avg_loss = self.loss_sum / self.period as f64;
                self.averages = Some((avg_gain, avg_loss));
                rsi_from(avg_gain, avg_loss)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    #[test]
    fn return_basic() {
        let bars = make_bars("BTC", &[100.0, 110.0, 121.0]);
        let f = Return::new(1).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        assert!(series[0].is_nan());
        assert!((series[1] - 0.1).abs() < 1e-12);
        assert!((series[2] - 0.1).abs() < 1e-12);
        assert_eq!(f.value_at(&bars).to_bits(), series[2].to_bits());
    }

    #[test]
    fn return_rejects_zero_period() {
        assert!(Return::new(0).is_err());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let bars = make_bars("BTC", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let f = Rsi::new(3).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        assert!(series[2].is_nan());
        assert_eq!(series[3], 100.0);
        assert_eq!(series[4], 100.0);
    }

    #[test]
    fn rsi_bounded() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0).collect();
        let bars = make_bars("BTC", &closes);
        let f = Rsi::new(14).unwrap();
        for v in f.compute_series(&BarColumns::from_bars(&bars)).into_iter().skip(14) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_stream_matches_series() {
        let closes: Vec<f64> = (0..40).map(|i| 50.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let bars = make_bars("BTC", &closes);
        let columns = BarColumns::from_bars(&bars);
        let f = Rsi::new(5).unwrap();
        let series = f.compute_series(&columns);
        let mut stream = f.stream();
        for (i, expected) in series.iter().enumerate() {
            let got = stream.push(columns.point(i));
            assert!(super::super::bits_eq(got, *expected), "bar {i}: {got} vs {expected}");
        }
    }
}
