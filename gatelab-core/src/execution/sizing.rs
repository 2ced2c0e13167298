//! Sizing policies: translate an allowed decision into a quantity.
//!
//! A size of zero is a legitimate, silent outcome: the position manager turns
//! it into `RejectReason::ZeroSize` and nothing downstream treats it as an error.

use serde::{Deserialize, Serialize};

use crate::components::FactoryError;
use crate::pipeline::Action;

/// Inputs a sizing policy may read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest {
    pub action: Action,
    /// Stronger-side model probability.
    pub model_confidence: f64,
    /// Aggregate pipeline confidence (min over gates).
    pub decision_confidence: f64,
    pub equity: f64,
    pub price: f64,
}

/// Position sizing logic.
///
/// # Non-Responsibilities
/// - Sizers do NOT decide entry/exit (that's the pipeline's job)
/// - Sizers do NOT enforce lot sizes or capital (that's the position manager's job)
pub trait SizingPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Quantity to trade. Returns 0.0 for `Action::None`.
    fn size(&self, request: &SizingRequest) -> f64;
}

/// Constant quantity per trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedQuantity {
    pub quantity: f64,
}

impl SizingPolicy for FixedQuantity {
    fn name(&self) -> &str {
        "fixed_quantity"
    }

    fn size(&self, request: &SizingRequest) -> f64 {
        if request.action == Action::None {
            return 0.0;
        }
        self.quantity
    }
}

/// Constant notional per trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedNotional {
    pub notional: f64,
}

impl SizingPolicy for FixedNotional {
    fn name(&self) -> &str {
        "fixed_notional"
    }

    fn size(&self, request: &SizingRequest) -> f64 {
        if request.action == Action::None || request.price <= 0.0 {
            return 0.0;
        }
        self.notional / request.price
    }
}

/// A fixed fraction of current equity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityFraction {
    pub fraction: f64,
}

impl SizingPolicy for EquityFraction {
    fn name(&self) -> &str {
        "equity_fraction"
    }

    fn size(&self, request: &SizingRequest) -> f64 {
        if request.action == Action::None || request.price <= 0.0 || request.equity <= 0.0 {
            return 0.0;
        }
        request.equity * self.fraction / request.price
    }
}

/// Equity fraction scaled by decision confidence; zero below a model-confidence floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScaled {
    pub fraction: f64,
    pub min_confidence: f64,
}

impl SizingPolicy for ConfidenceScaled {
    fn name(&self) -> &str {
        "confidence_scaled"
    }

    fn size(&self, request: &SizingRequest) -> f64 {
        if request.action == Action::None || request.price <= 0.0 || request.equity <= 0.0 {
            return 0.0;
        }
        if request.model_confidence < self.min_confidence {
            return 0.0;
        }
        request.equity * self.fraction * request.decision_confidence / request.price
    }
}

/// Declarative sizing choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingConfig {
    FixedQuantity { quantity: f64 },
    FixedNotional { notional: f64 },
    EquityFraction { fraction: f64 },
    ConfidenceScaled { fraction: f64, min_confidence: f64 },
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self::EquityFraction { fraction: 0.1 }
    }
}

fn positive(policy: &str, param: &str, value: f64) -> Result<f64, FactoryError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FactoryError::InvalidParam {
            component: policy.into(),
            param: param.into(),
            value,
            expected: "a finite value > 0",
        })
    }
}

impl SizingConfig {
    pub fn build(&self) -> Result<Box<dyn SizingPolicy>, FactoryError> {
        match *self {
            Self::FixedQuantity { quantity } => Ok(Box::new(FixedQuantity {
                quantity: positive("fixed_quantity", "quantity", quantity)?,
            })),
            Self::FixedNotional { notional } => Ok(Box::new(FixedNotional {
                notional: positive("fixed_notional", "notional", notional)?,
            })),
            Self::EquityFraction { fraction } => {
                let fraction = positive("equity_fraction", "fraction", fraction)?;
                if fraction > 1.0 {
                    return Err(FactoryError::InvalidParam {
                        component: "equity_fraction".into(),
                        param: "fraction".into(),
                        value: fraction,
                        expected: "a value in (0, 1]",
                    });
                }
                Ok(Box::new(EquityFraction { fraction }))
            }
            Self::ConfidenceScaled {
                fraction,
                min_confidence,
            } => {
                let fraction = positive("confidence_scaled", "fraction", fraction)?;
                if fraction > 1.0 {
                    return Err(FactoryError::InvalidParam {
                        component: "confidence_scaled".into(),
                        param: "fraction".into(),
                        value: fraction,
                        expected: "a value in (0, 1]",
                    });
                }
                if !(0.0..=1.0).contains(&min_confidence) {
                    return Err(FactoryError::InvalidParam {
                        component: "confidence_scaled".into(),
                        param: "min_confidence".into(),
                        value: min_confidence,
                        expected: "a value in [0, 1]",
                    });
                }
                Ok(Box::new(ConfidenceScaled {
                    fraction,
                    min_confidence,
                }))
            }
        }
    }
}
