//! Regime gate: only trade in allowed market regimes.

use std::collections::BTreeSet;

use super::context::EvaluationContext;
use super::factory::FactoryError;
use super::result::{ComponentResult, VetoReason};
use super::StrategyComponent;

/// Allows iff `ctx.regime` is in the allowed set. Confidence is binary.
///
/// Regime names are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct RegimeGate {
    name: String,
    allowed: BTreeSet<String>,
}

impl RegimeGate {
    pub const TYPE: &'static str = "regime";

    pub fn new<I, S>(allowed: I) -> Result<Self, FactoryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: BTreeSet<String> = allowed
            .into_iter()
            .map(|s| s.as_ref().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if allowed.is_empty() {
            return Err(FactoryError::MissingLabels {
                component: Self::TYPE.into(),
            });
        }
        Ok(Self {
            name: Self::TYPE.into(),
            allowed,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }
}

impl StrategyComponent for RegimeGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &EvaluationContext) -> ComponentResult {
        match ctx.regime.as_deref() {
            Some(regime) if self.allowed.contains(&regime.to_ascii_lowercase()) => {
                ComponentResult::allow(1.0)
            }
            Some(regime) => {
                ComponentResult::veto(VetoReason::RegimeNotAllowed(regime.to_string()), 0.0)
            }
            None => ComponentResult::veto(VetoReason::RegimeNotAllowed("unknown".into()), 0.0),
        }
    }

    fn needs_regime(&self) -> bool {
        true
    }
}
