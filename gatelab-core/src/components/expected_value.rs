//! Expected-value gate: vetoes low-edge signals.
//!
//! `ev = max(p_long·R − p_short, p_short·R − p_long)` over normalized
//! probabilities. When the context reports probabilities as unavailable the
//! gate is inert: it allows and flags `ev_available = 0`, so an upstream label
//! failure cannot masquerade as a market with no edge.

use super::context::EvaluationContext;
use super::factory::FactoryError;
use super::result::{ComponentResult, VetoReason};
use super::StrategyComponent;

#[derive(Debug, Clone)]
pub struct ExpectedValueGate {
    name: String,
    min_ev: f64,
    reward_risk: f64,
}

impl ExpectedValueGate {
    pub const TYPE: &'static str = "expected_value";
    pub const DEFAULT_REWARD_RISK: f64 = 1.0;

    pub fn new(min_ev: f64, reward_risk: f64) -> Result<Self, FactoryError> {
        if !reward_risk.is_finite() || reward_risk <= 0.0 {
            return Err(FactoryError::InvalidParam {
                component: Self::TYPE.into(),
                param: "reward_risk".into(),
                value: reward_risk,
                expected: "a finite value > 0",
            });
        }
        // ev is bounded below by -1 and above by R.
        if !min_ev.is_finite() || min_ev < -1.0 || min_ev > reward_risk {
            return Err(FactoryError::InvalidParam {
                component: Self::TYPE.into(),
                param: "min_ev".into(),
                value: min_ev,
                expected: "a value in [-1, reward_risk]",
            });
        }
        Ok(Self {
            name: Self::TYPE.into(),
            min_ev,
            reward_risk,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn min_ev(&self) -> f64 {
        self.min_ev
    }

    pub fn reward_risk(&self) -> f64 {
        self.reward_risk
    }
}

impl StrategyComponent for ExpectedValueGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &EvaluationContext) -> ComponentResult {
        let Some(probabilities) = ctx.probabilities else {
            return ComponentResult::allow(1.0).with_meta("ev_available", 0.0);
        };

        let ev = probabilities.expected_value(self.reward_risk);
        // Edge relative to the best achievable EV.
        let confidence = ev / self.reward_risk;
        let result = if ev >= self.min_ev {
            ComponentResult::allow(confidence)
        } else {
            ComponentResult::veto(VetoReason::ExpectedValueLow, confidence)
        };
        result
            .with_meta("ev_available", 1.0)
            .with_meta("ev", ev)
            .with_meta("min_ev", self.min_ev)
    }
}
