//! Cooldown gate: the one stateful component.
//!
//! `CooldownState` maps symbol → bar index of the last *confirmed* trade. It is
//! owned by the gate instance of one pipeline (one per run), read on every
//! `evaluate`, and written only through `record_trade(&ExecutedTrade)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::execution::ExecutedTrade;

use super::context::EvaluationContext;
use super::factory::FactoryError;
use super::result::{ComponentResult, VetoReason};
use super::StrategyComponent;

/// Per-run memory of executed trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    last_trade: BTreeMap<String, usize>,
    records: usize,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_trade(&self, symbol: &str) -> Option<usize> {
        self.last_trade.get(symbol).copied()
    }

    /// Total executions recorded since the state was created.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.last_trade.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.last_trade.is_empty()
    }

    pub(crate) fn record(&mut self, trade: &ExecutedTrade) {
        self.last_trade
            .insert(trade.symbol().to_string(), trade.bar_index());
        self.records += 1;
    }
}

/// Allows iff no trade was recorded for the symbol within `min_bars` of the
/// current bar. Confidence is the fraction of the cooldown that has elapsed.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    name: String,
    min_bars: usize,
    state: CooldownState,
}

impl CooldownGate {
    pub const TYPE: &'static str = "cooldown";

    pub fn new(min_bars: usize) -> Self {
        Self::with_state(min_bars, CooldownState::new())
    }

    /// Inject an existing state (e.g. restored for a resumed run).
    pub fn with_state(min_bars: usize, state: CooldownState) -> Self {
        Self {
            name: Self::TYPE.into(),
            min_bars,
            state,
        }
    }

    /// Validate a raw numeric parameter into a bar count.
    pub fn from_param(min_bars: f64) -> Result<Self, FactoryError> {
        if !min_bars.is_finite() || min_bars < 0.0 || min_bars.fract() != 0.0 {
            return Err(FactoryError::InvalidParam {
                component: Self::TYPE.into(),
                param: "min_bars_between_trades".into(),
                value: min_bars,
                expected: "a non-negative whole number of bars",
            });
        }
        Ok(Self::new(min_bars as usize))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn min_bars(&self) -> usize {
        self.min_bars
    }

    pub fn state(&self) -> &CooldownState {
        &self.state
    }
}

impl StrategyComponent for CooldownGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &EvaluationContext) -> ComponentResult {
        let Some(last) = self.state.last_trade(&ctx.symbol) else {
            return ComponentResult::allow(1.0);
        };
        if self.min_bars == 0 {
            return ComponentResult::allow(1.0);
        }

        let elapsed = ctx.bar_index.saturating_sub(last);
        let fraction = elapsed as f64 / self.min_bars as f64;
        let result = if elapsed >= self.min_bars {
            ComponentResult::allow(fraction)
        } else {
            ComponentResult::veto(VetoReason::CooldownActive, fraction)
        };
        result
            .with_meta("bars_since_trade", elapsed as f64)
            .with_meta("min_bars", self.min_bars as f64)
    }

    fn record_trade(&mut self, trade: &ExecutedTrade) {
        self.state.record(trade);
    }

    fn state_snapshot(&self) -> Option<BTreeMap<String, usize>> {
        Some(self.state.snapshot())
    }

    fn recorded_trades(&self) -> usize {
        self.state.records()
    }
}
