//! Feature parity: the three computation paths and the proof that they agree.
//!
//! Index convention: `live_features(bars, i + 1)` is the vector for closed bar
//! `i`, because bar `now_index` is still forming and is excluded. The batch
//! paths have no forming bar, so their index `i` is bar `i` directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Bar;

use super::{bits_eq, BarColumns, FeatureSet, FeatureVector};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParityError {
    #[error(
        "feature parity violated: {count} mismatches, first '{feature}' at bar {bar_index} \
         (live={live}, precomputed={precomputed}, fast={fast})"
    )]
    Mismatch {
        count: usize,
        feature: String,
        bar_index: usize,
        live: f64,
        precomputed: f64,
        fast: f64,
    },
    #[error("feature '{feature}' produced {found} values for {expected} bars")]
    LengthMismatch {
        feature: String,
        expected: usize,
        found: usize,
    },
}

// ─── Live path ───────────────────────────────────────────────────────

/// Features for the last *closed* bar, as a live system sees them at `now_index`.
///
/// Reads `bars[..now_index]` only. Returns `None` when no bar has closed yet or
/// `now_index` lies beyond the series.
pub fn live_features(bars: &[Bar], now_index: usize, set: &FeatureSet) -> Option<FeatureVector> {
    if now_index == 0 || now_index > bars.len() {
        return None;
    }
    let history = &bars[..now_index];
    Some(
        set.iter()
            .map(|f| (f.name().to_string(), f.value_at(history)))
            .collect(),
    )
}

// ─── Precompute path ─────────────────────────────────────────────────

/// One feature vector per bar of a closed window.
pub fn precompute_features(bars: &[Bar], set: &FeatureSet) -> Result<Vec<FeatureVector>, ParityError> {
    let columns = BarColumns::from_bars(bars);
    let mut rows = vec![FeatureVector::new(); bars.len()];
    for feature in set.iter() {
        let series = feature.compute_series(&columns);
        if series.len() != bars.len() {
            return Err(ParityError::LengthMismatch {
                feature: feature.name().to_string(),
                expected: bars.len(),
                found: series.len(),
            });
        }
        for (row, value) in rows.iter_mut().zip(series) {
            row.insert(feature.name(), value);
        }
    }
    Ok(rows)
}

// ─── Fast path ───────────────────────────────────────────────────────

/// Column-major feature cache built in one incremental pass over column views.
#[derive(Debug, Clone, PartialEq)]
pub struct FastFeatures {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    len: usize,
}

impl FastFeatures {
    pub fn compute(bars: &[Bar], set: &FeatureSet) -> Self {
        Self::from_columns(&BarColumns::from_bars(bars), set)
    }

    pub fn from_columns(view: &BarColumns, set: &FeatureSet) -> Self {
        let len = view.len();
        let mut streams: Vec<_> = set.iter().map(|f| f.stream()).collect();
        let mut columns: Vec<Vec<f64>> = streams.iter().map(|_| Vec::with_capacity(len)).collect();
        for i in 0..len {
            let point = view.point(i);
            for (stream, column) in streams.iter_mut().zip(columns.iter_mut()) {
                column.push(stream.push(point));
            }
        }
        Self {
            names: set.names().into_iter().map(String::from).collect(),
            columns,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[idx])
    }

    pub fn value(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.column(name)?.get(bar_index).copied()
    }

    /// Row view for one closed bar.
    pub fn vector_at(&self, bar_index: usize) -> Option<FeatureVector> {
        if bar_index >= self.len {
            return None;
        }
        Some(
            self.names
                .iter()
                .zip(&self.columns)
                .map(|(name, column)| (name.clone(), column[bar_index]))
                .collect(),
        )
    }
}

// ─── Verification ────────────────────────────────────────────────────

/// One disagreement between paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityMismatch {
    pub bar_index: usize,
    pub feature: String,
    pub live: f64,
    pub precomputed: f64,
    pub fast: f64,
}

/// Outcome of a parity check over one bar series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub bars_checked: usize,
    pub features_checked: usize,
    pub mismatches: Vec<ParityMismatch>,
}

impl ParityReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn into_result(self) -> Result<Self, ParityError> {
        match self.mismatches.first() {
            None => Ok(self),
            Some(first) => Err(ParityError::Mismatch {
                count: self.mismatches.len(),
                feature: first.feature.clone(),
                bar_index: first.bar_index,
                live: first.live,
                precomputed: first.precomputed,
                fast: first.fast,
            }),
        }
    }
}

/// Compare live, precomputed and fast values for every closed bar.
///
/// The live path is the reference: it recomputes each bar from scratch, so this
/// costs O(n²) per feature and is meant to run once before a fast-mode backtest.
pub fn verify_parity(bars: &[Bar], set: &FeatureSet) -> Result<ParityReport, ParityError> {
    let precomputed = precompute_features(bars, set)?;
    let fast = FastFeatures::compute(bars, set);
    let mut report = ParityReport {
        bars_checked: bars.len(),
        features_checked: set.len(),
        mismatches: Vec::new(),
    };

    for (i, pre_row) in precomputed.iter().enumerate() {
        let Some(live_row) = live_features(bars, i + 1, set) else {
            continue;
        };
        for name in set.names() {
            let live = live_row.get(name).unwrap_or(f64::NAN);
            let pre = pre_row.get(name).unwrap_or(f64::NAN);
            let fst = fast.value(name, i).unwrap_or(f64::NAN);
            if !bits_eq(live, pre) || !bits_eq(pre, fst) {
                report.mismatches.push(ParityMismatch {
                    bar_index: i,
                    feature: name.to_string(),
                    live,
                    precomputed: pre,
                    fast: fst,
                });
            }
        }
    }

    if !report.is_clean() {
        tracing::warn!(
            mismatches = report.mismatches.len(),
            bars = report.bars_checked,
            "feature parity check failed"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    fn wavy(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.05)
            .collect();
        make_bars("BTC", &closes)
    }

    #[test]
    fn live_excludes_forming_bar() {
        let bars = wavy(40);
        let set = FeatureSet::standard();
        let live = live_features(&bars, 30, &set).unwrap();
        let pre = precompute_features(&bars, &set).unwrap();
        assert!(live.bitwise_eq(&pre[29]));
        assert!(!live.bitwise_eq(&pre[30]));
    }

    #[test]
    fn live_has_no_closed_bar_at_zero() {
        let bars = wavy(5);
        assert!(live_features(&bars, 0, &FeatureSet::standard()).is_none());
        assert!(live_features(&bars, 6, &FeatureSet::standard()).is_none());
    }

    #[test]
    fn standard_set_is_in_parity() {
        let bars = wavy(80);
        let report = verify_parity(&bars, &FeatureSet::standard()).unwrap();
        assert_eq!(report.bars_checked, 80);
        assert_eq!(report.features_checked, 6);
        assert!(report.is_clean(), "{:?}", report.mismatches.first());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn fast_vector_matches_precompute_row() {
        let bars = wavy(50);
        let set = FeatureSet::standard();
        let pre = precompute_features(&bars, &set).unwrap();
        let fast = FastFeatures::compute(&bars, &set);
        assert_eq!(fast.len(), 50);
        for i in 0..50 {
            assert!(fast.vector_at(i).unwrap().bitwise_eq(&pre[i]));
        }
        assert!(fast.vector_at(50).is_none());
    }

    #[test]
    fn precompute_has_no_lookahead() {
        let bars = wavy(60);
        let set = FeatureSet::standard();
        let full = precompute_features(&bars, &set).unwrap();
        let truncated = precompute_features(&bars[..35], &set).unwrap();
        for i in 0..35 {
            assert!(truncated[i].bitwise_eq(&full[i]), "bar {i}");
        }
    }

    #[test]
    fn report_converts_to_error() {
        let report = ParityReport {
            bars_checked: 10,
            features_checked: 1,
            mismatches: vec![ParityMismatch {
                bar_index: 4,
                feature: "rsi_14".into(),
                live: 1.0,
                precomputed: 1.0,
                fast: 1.0000001,
            }],
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, ParityError::Mismatch { count: 1, bar_index: 4, .. }));
    }
}
