//! Shared arithmetic kernels.
//!
//! Every feature path calls these, in the same operand order, so the
//! reference, batch and incremental computations round identically.
//! Sums are always accumulated left to right from `0.0`; no rolling sums.

/// Arithmetic mean, summing in iteration order. NaN for an empty input.
pub fn mean_of<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    sum / count as f64
}

/// Population standard deviation.
pub fn std_of<I>(values: I) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    let mean = mean_of(values.clone());
    let var = mean_of(values.map(|v| (v - mean) * (v - mean)));
    var.sqrt()
}

pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// `alpha * x + (1 - alpha) * prev`
pub fn ema_step(prev: f64, x: f64, alpha: f64) -> f64 {
    alpha * x + (1.0 - alpha) * prev
}

/// Wilder smoothing: `(prev * (n - 1) + x) / n`
pub fn wilder_step(prev: f64, x: f64, period: usize) -> f64 {
    let n = period as f64;
    (prev * (n - 1.0) + x) / n
}

/// True range; the first bar (no previous close) uses `high - low`.
pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        None => high - low,
        Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
    }
}

/// `now / then - 1`
pub fn simple_return(now: f64, then: f64) -> f64 {
    now / then - 1.0
}

/// Split a close-to-close change into (gain, loss), both non-negative.
pub fn gain_loss(prev_close: f64, close: f64) -> (f64, f64) {
    let change = close - prev_close;
    if change > 0.0 {
        (change, 0.0)
    } else {
        (0.0, -change)
    }
}

/// RSI from Wilder-smoothed averages.
pub fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// `(current - reference) / reference` guarded against a zero reference.
pub fn relative_to(current: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        f64::NAN
    } else {
        current / reference - 1.0
    }
}
