//! Confidence gate: vetoes signals the model is not sure enough about.

use super::context::EvaluationContext;
use super::factory::FactoryError;
use super::result::{ComponentResult, VetoReason};
use super::StrategyComponent;

/// Allows iff `ctx.confidence > threshold` (strict). Confidence echoes the input.
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    name: String,
    threshold: f64,
}

impl ConfidenceGate {
    pub const TYPE: &'static str = "confidence";

    pub fn new(threshold: f64) -> Result<Self, FactoryError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FactoryError::InvalidParam {
                component: Self::TYPE.into(),
                param: "threshold".into(),
                value: threshold,
                expected: "a value in [0, 1]",
            });
        }
        Ok(Self {
            name: Self::TYPE.into(),
            threshold,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl StrategyComponent for ConfidenceGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &EvaluationContext) -> ComponentResult {
        let result = if ctx.confidence > self.threshold {
            ComponentResult::allow(ctx.confidence)
        } else {
            ComponentResult::veto(VetoReason::ConfidenceLow, ctx.confidence)
        };
        result.with_meta("threshold", self.threshold)
    }
}
