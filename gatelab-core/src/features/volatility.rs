//! Volatility features: ATR as a fraction of price, and realized return volatility.

use std::collections::VecDeque;

use crate::components::FactoryError;
use crate::domain::Bar;

use super::kernels::{mean_of, simple_return, std_of, true_range, wilder_step};
use super::set::check_period;
use super::{BarColumns, BarPoint, Feature, FeatureStream};

// ─── ATR % ───────────────────────────────────────────────────────────

/// Wilder ATR divided by close. Seeded with the mean of the first `period`
/// true ranges. Lookback: period - 1.
#[derive(Debug, Clone)]
pub struct AtrPct {
    pub(super) period: usize,
    pub(super) name: String,
}

impl AtrPct {
    pub const TYPE: &'static str = "atr_pct";

    pub fn new(period: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "period", period, 1)?;
        Ok(Self {
            period,
            name: format!("atr_pct_{period}"),
        })
    }
}

impl Feature for AtrPct {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        let n = self.period;
        if history.len() < n {
            return f64::NAN;
        }
        let tr = |i: usize| {
            let prev_close = if i == 0 { None } else { Some(history[i - 1].close) };
            true_range(history[i].high, history[i].low, prev_close)
        };
        let mut atr = mean_of((0..n).map(tr));
        for i in n..history.len() {
            atr = wilder_step(atr, tr(i), n);
        }
        atr / history[history.len() - 1].close
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let n = self.period;
        let len = columns.len();
        let mut result = vec![f64::NAN; len];
        if len < n {
            return result;
        }
        let tr: Vec<f64> = (0..len)
            .map(|i| {
                let prev_close = if i == 0 { None } else { Some(columns.close[i - 1]) };
                true_range(columns.high[i], columns.low[i], prev_close)
            })
            .collect();
        let mut atr = mean_of(tr[..n].iter().copied());
        result[n - 1] = atr / columns.close[n - 1];
        for t in n..len {
            atr = wilder_step(atr, tr[t], n);
            result[t] = atr / columns.close[t];
        }
        result
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(AtrStream {
            period: self.period,
            prev_close: None,
            seen: 0,
            tr_sum: 0.0,
            atr: None,
        })
    }
}

struct AtrStream {
    period: usize,
    prev_close: Option<f64>,
    seen: usize,
    tr_sum: f64,
    atr: Option<f64>,
}

impl FeatureStream for AtrStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        let tr = true_range(point.high, point.low, self.prev_close);
        self.prev_close = Some(point.close);

        let atr = match self.atr {
            Some(prev) => wilder_step(prev, tr, self.period),
            None => {
                self.seen += 1;
                self.tr_sum += tr;
                if self.seen < self.period {
                    return f64::NAN;
                }
                self.tr_sum / self.period as f64
            }
        };
        self.atr = Some(atr);
        atr / point.close
    }
}

// ─── Realized volatility ─────────────────────────────────────────────

/// Population standard deviation of the last `period` one-bar returns.
/// Lookback: period.
#[derive(Debug, Clone)]
pub struct Volatility {
    pub(super) period: usize,
    pub(super) name: String,
}

impl Volatility {
    pub const TYPE: &'static str = "volatility";

    pub fn new(period: usize) -> Result<Self, FactoryError> {
        check_period(Self::TYPE, "period", period, 2)?;
        Ok(Self {
            period,
            name: format!("volatility_{period}"),
        })
    }
}

impl Feature for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn value_at(&self, history: &[Bar]) -> f64 {
        let len = history.len();
        if len <= self.period {
            return f64::NAN;
        }
        let returns =
            (len - self.period..len).map(|i| simple_return(history[i].close, history[i - 1].close));
        std_of(returns)
    }

    fn compute_series(&self, columns: &BarColumns) -> Vec<f64> {
        let close = &columns.close;
        let returns: Vec<f64> = (0..close.len())
            .map(|i| {
                if i == 0 {
                    f64::NAN
                } else {
                    simple_return(close[i], close[i - 1])
                }
            })
            .collect();
        (0..close.len())
            .map(|t| {
                if t < self.period {
                    f64::NAN
                } else {
                    std_of(returns[t + 1 - self.period..=t].iter().copied())
                }
            })
            .collect()
    }

    fn stream(&self) -> Box<dyn FeatureStream> {
        Box::new(VolatilityStream {
            period: self.period,
            prev_close: None,
            returns: VecDeque::with_capacity(self.period),
        })
    }
}

struct VolatilityStream {
    period: usize,
    prev_close: Option<f64>,
    returns: VecDeque<f64>,
}

impl FeatureStream for VolatilityStream {
    fn push(&mut self, point: BarPoint) -> f64 {
        let Some(prev) = self.prev_close.replace(point.close) else {
            return f64::NAN;
        };
        self.returns.push_back(simple_return(point.close, prev));
        if self.returns.len() > self.period {
            self.returns.pop_front();
        }
        if self.returns.len() < self.period {
            return f64::NAN;
        }
        std_of(self.returns.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    #[test]
    fn atr_pct_constant_range() {
        // make_bars: high/low = envelope ± 0.5 → flat closes give TR = 1.0
        let bars = make_bars("BTC", &[100.0; 10]);
        let f = AtrPct::new(3).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        assert!(series[1].is_nan());
        assert!((series[2] - 0.01).abs() < 1e-12);
        assert!((series[9] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn volatility_of_flat_series_is_zero() {
        let bars = make_bars("BTC", &[50.0; 8]);
        let f = Volatility::new(4).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        assert!(series[3].is_nan());
        assert_eq!(series[4], 0.0);
    }

    #[test]
    fn volatility_requires_two_returns() {
        assert!(Volatility::new(1).is_err());
    }

    #[test]
    fn atr_value_at_matches_series() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + ((i * 13) % 7) as f64).collect();
        let bars = make_bars("BTC", &closes);
        let f = AtrPct::new(5).unwrap();
        let series = f.compute_series(&BarColumns::from_bars(&bars));
        for t in 0..bars.len() {
            assert!(super::super::bits_eq(f.value_at(&bars[..=t]), series[t]), "bar {t}");
        }
    }

    #[test]
    fn volatility_stream_matches_series() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + (i as f64).sqrt()).collect();
        let bars = make_bars("BTC", &closes);
        let columns = BarColumns::from_bars(&bars);
        let f = Volatility::new(6).unwrap();
        let series = f.compute_series(&columns);
        let mut stream = f.stream();
        for (i, expected) in series.iter().enumerate() {
            assert!(super::super::bits_eq(stream.push(columns.point(i)), *expected));
        }
    }
}
