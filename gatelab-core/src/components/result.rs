//! ComponentResult: the outcome of one component's evaluation at one bar.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A serialized value that no constructor could have produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub &'static str);

/// Why a component vetoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VetoReason {
    /// Model confidence at or below the gate threshold.
    ConfidenceLow,
    /// The observed regime is not in the allowed set.
    RegimeNotAllowed(String),
    /// Expected value below the configured minimum.
    ExpectedValueLow,
    /// A trade for this symbol was executed too recently.
    CooldownActive,
    Custom(String),
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfidenceLow => write!(f, "CONFIDENCE_LOW"),
            Self::RegimeNotAllowed(regime) => write!(f, "REGIME_NOT_ALLOWED:{regime}"),
            Self::ExpectedValueLow => write!(f, "EV_BELOW_MIN"),
            Self::CooldownActive => write!(f, "COOLDOWN_ACTIVE"),
            Self::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// Outcome of one component at one bar.
///
/// Fields are private so the `reason.is_some() == !allowed` invariant and the
/// `[0, 1]` confidence range hold for every value in circulation, including
/// values read back from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ComponentResultRepr")]
pub struct ComponentResult {
    allowed: bool,
    confidence: f64,
    reason: Option<VetoReason>,
    metadata: BTreeMap<String, f64>,
}

impl ComponentResult {
    /// An allowing result. Confidence is clamped to `[0, 1]`; NaN becomes 0.
    pub fn allow(confidence: f64) -> Self {
        Self {
            allowed: true,
            confidence: clamp_unit(confidence),
            reason: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A vetoing result.
    pub fn veto(reason: VetoReason, confidence: f64) -> Self {
        Self {
            allowed: false,
            confidence: clamp_unit(confidence),
            reason: Some(reason),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic value.
    pub fn with_meta(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reason(&self) -> Option<&VetoReason> {
        self.reason.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, f64> {
        &self.metadata
    }
}

#[derive(Deserialize)]
struct ComponentResultRepr {
    allowed: bool,
    confidence: f64,
    reason: Option<VetoReason>,
    metadata: BTreeMap<String, f64>,
}

impl TryFrom<ComponentResultRepr> for ComponentResult {
    type Error = InvariantViolation;

    fn try_from(raw: ComponentResultRepr) -> Result<Self, Self::Error> {
        if raw.allowed == raw.reason.is_some() {
            return Err(InvariantViolation("a component result has a reason iff it vetoes"));
        }
        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(InvariantViolation("component confidence must lie in [0, 1]"));
        }
        Ok(Self {
            allowed: raw.allowed,
            confidence: raw.confidence,
            reason: raw.reason,
            metadata: raw.metadata,
        })
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
