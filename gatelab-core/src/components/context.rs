//! Evaluation context: the per-bar, per-symbol snapshot every component reads.
//!
//! The context boundary is where upstream untidiness stops: model labels arrive
//! as `long/short` or `buy/sell` in any case, and leave as one canonical
//! `Probabilities` pair. Degenerate inputs (both probabilities zero, one side of
//! the pair missing, or no directional label at all) become "unavailable" here
//! rather than a zero or a certainty that would mislead every gate downstream.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::features::FeatureVector;
use crate::pipeline::Action;

// ─── Errors ──────────────────────────────────────────────────────────

/// Context assembly failures. Each one names the key at fault.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error("required feature '{0}' is missing")]
    MissingFeature(String),
    #[error("required feature '{key}' is not finite ({value})")]
    NonFiniteFeature { key: String, value: f64 },
    #[error("probability for label '{label}' is invalid ({value})")]
    InvalidProbability { label: String, value: f64 },
    #[error("label '{0}' appears more than once after case folding")]
    DuplicateLabel(String),
    #[error("no regime supplied by the model and no classifier configured")]
    MissingRegime,
}

// ─── Labels & probabilities ──────────────────────────────────────────

/// Which label pair an upstream model speaks natively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSpelling {
    #[default]
    LongShort,
    BuySell,
}

impl LabelSpelling {
    fn labels(self) -> (&'static str, &'static str) {
        match self {
            Self::LongShort => ("long", "short"),
            Self::BuySell => ("buy", "sell"),
        }
    }
}

/// Canonical directional probabilities, normalized so `long + short == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub long: f64,
    pub short: f64,
}

impl Probabilities {
    /// Normalize a raw pair. Returns `None` when both sides are zero.
    pub fn normalized(long: f64, short: f64) -> Option<Self> {
        let total = long + short;
        if total <= 0.0 {
            return None;
        }
        Some(Self {
            long: long / total,
            short: short / total,
        })
    }

    /// `max(p_long·R − p_short, p_short·R − p_long)`.
    pub fn expected_value(&self, reward_risk: f64) -> f64 {
        (self.long * reward_risk - self.short).max(self.short * reward_risk - self.long)
    }

    /// The stronger side's probability.
    pub fn confidence(&self) -> f64 {
        self.long.max(self.short)
    }

    pub fn direction(&self) -> Action {
        if self.long > self.short {
            Action::Long
        } else if self.short > self.long {
            Action::Short
        } else {
            Action::None
        }
    }
}

/// Raw model output for one symbol at one bar, in whatever spelling the model uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub labels: BTreeMap<String, f64>,
    /// Regime label, when the model tags one.
    pub regime: Option<String>,
}

impl RawPrediction {
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self {
            labels: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            regime: None,
        }
    }

    pub fn with_regime(mut self, regime: impl Into<String>) -> Self {
        self.regime = Some(regime.into());
        self
    }
}

/// Fold raw labels into canonical probabilities.
///
/// Both spellings are accepted case-insensitively. When a model emits both
/// families, `native` decides which one is read. Labels outside the two
/// families (e.g. a `hold` class) are ignored. Returns `Ok(None)` when no
/// directional mass is present or when the selected family is missing one of
/// its two labels.
pub fn normalize_labels(
    labels: &BTreeMap<String, f64>,
    native: LabelSpelling,
) -> Result<Option<Probabilities>, ContextError> {
    let mut folded: BTreeMap<String, f64> = BTreeMap::new();
    for (label, &value) in labels {
        let key = label.trim().to_ascii_lowercase();
        let directional = matches!(key.as_str(), "long" | "short" | "buy" | "sell");
        if !directional {
            continue;
        }
        if !value.is_finite() || value < 0.0 {
            return Err(ContextError::InvalidProbability {
                label: label.clone(),
                value,
            });
        }
        if folded.insert(key.clone(), value).is_some() {
            return Err(ContextError::DuplicateLabel(key));
        }
    }

    let has = |spelling: LabelSpelling| {
        let (a, b) = spelling.labels();
        folded.contains_key(a) || folded.contains_key(b)
    };
    let spelling = match (has(LabelSpelling::LongShort), has(LabelSpelling::BuySell)) {
        (true, true) => native,
        (true, false) => LabelSpelling::LongShort,
        (false, true) => LabelSpelling::BuySell,
        (false, false) => return Ok(None),
    };

    let (up, down) = spelling.labels();
    match (folded.get(up), folded.get(down)) {
        (Some(&long), Some(&short)) => Ok(Probabilities::normalized(long, short)),
        _ => Ok(None),
    }
}

// ─── Regime classification ───────────────────────────────────────────

/// Maps a trend feature to a regime label when the model does not supply one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassifier {
    pub feature: String,
    /// Dead band around zero classified as "neutral".
    pub band: f64,
}

impl RegimeClassifier {
    pub fn classify(&self, features: &FeatureVector) -> Result<String, ContextError> {
        let value = features
            .get(&self.feature)
            .ok_or_else(|| ContextError::MissingFeature(self.feature.clone()))?;
        if !value.is_finite() {
            return Err(ContextError::NonFiniteFeature {
                key: self.feature.clone(),
                value,
            });
        }
        let regime = if value > self.band {
            "bull"
        } else if value < -self.band {
            "bear"
        } else {
            "neutral"
        };
        Ok(regime.to_string())
    }
}

// ─── EvaluationContext ───────────────────────────────────────────────

/// Read-only snapshot handed to every component at one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub bar_index: usize,
    pub symbol: String,
    pub timestamp: Option<NaiveDateTime>,
    /// `None` when the model produced no usable directional mass.
    pub probabilities: Option<Probabilities>,
    /// Model confidence: the stronger side's normalized probability (0 when unavailable).
    pub confidence: f64,
    pub regime: Option<String>,
    pub features: FeatureVector,
    /// EV at reward/risk 1.0; `None` whenever probabilities are unavailable.
    pub expected_value: Option<f64>,
}

impl EvaluationContext {
    /// Minimal context for a symbol and bar; used for synthetic evaluation in tests.
    pub fn new(symbol: impl Into<String>, bar_index: usize, probabilities: Option<Probabilities>) -> Self {
        Self {
            bar_index,
            symbol: symbol.into(),
            timestamp: None,
            probabilities,
            confidence: probabilities.map(|p| p.confidence()).unwrap_or(0.0),
            regime: None,
            features: FeatureVector::new(),
            expected_value: probabilities.map(|p| p.expected_value(1.0)),
        }
    }

    pub fn with_regime(mut self, regime: impl Into<String>) -> Self {
        self.regime = Some(regime.into());
        self
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: f64) -> Self {
        self.features.insert(key, value);
        self
    }

    /// Direction implied by the upstream signal.
    pub fn direction(&self) -> Action {
        self.probabilities
            .map(|p| p.direction())
            .unwrap_or(Action::None)
    }

    /// Look up a feature, failing loudly instead of defaulting to zero.
    pub fn feature(&self, key: &str) -> Result<f64, ContextError> {
        self.features
            .get(key)
            .ok_or_else(|| ContextError::MissingFeature(key.to_string()))
    }
}

// ─── ContextBuilder ──────────────────────────────────────────────────

/// Assembles `EvaluationContext`s from raw model output and closed-bar features.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    native_spelling: LabelSpelling,
    required_features: BTreeSet<String>,
    require_regime: bool,
    classifier: Option<RegimeClassifier>,
}

impl ContextBuilder {
    pub fn new(native_spelling: LabelSpelling) -> Self {
        Self {
            native_spelling,
            ..Self::default()
        }
    }

    pub fn require_features<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_features
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn require_regime(mut self, required: bool) -> Self {
        self.require_regime = required;
        self
    }

    pub fn with_classifier(mut self, classifier: RegimeClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn required_features(&self) -> &BTreeSet<String> {
        &self.required_features
    }

    /// Build a fresh context for one bar.
    pub fn build(
        &self,
        symbol: &str,
        bar_index: usize,
        timestamp: Option<NaiveDateTime>,
        prediction: &RawPrediction,
        features: &FeatureVector,
    ) -> Result<EvaluationContext, ContextError> {
        for key in &self.required_features {
            let value = features
                .get(key)
                .ok_or_else(|| ContextError::MissingFeature(key.clone()))?;
            if !value.is_finite() {
                return Err(ContextError::NonFiniteFeature {
                    key: key.clone(),
                    value,
                });
            }
        }

        let probabilities = normalize_labels(&prediction.labels, self.native_spelling)?;

        let regime = match (&prediction.regime, &self.classifier) {
            (Some(r), _) => Some(r.trim().to_ascii_lowercase()),
            (None, Some(classifier)) => Some(classifier.classify(features)?),
            (None, None) if self.require_regime => return Err(ContextError::MissingRegime),
            (None, None) => None,
        };

        Ok(EvaluationContext {
            bar_index,
            symbol: symbol.to_string(),
            timestamp,
            probabilities,
            confidence: probabilities.map(|p| p.confidence()).unwrap_or(0.0),
            regime,
            features: features.clone(),
            expected_value: probabilities.map(|p| p.expected_value(1.0)),
        })
    }
}
