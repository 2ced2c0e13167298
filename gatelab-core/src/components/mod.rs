//! Gating components: the unit of decision logic.
//!
//! Every component is a pure function of an `EvaluationContext` plus its own
//! internal state. Stateful components (the cooldown gate) read that state in
//! `evaluate` and mutate it only through `record_trade`, which takes an
//! `ExecutedTrade`: a value only the position manager can produce.

pub mod confidence;
pub mod context;
pub mod cooldown;
pub mod expected_value;
pub mod factory;
pub mod regime;
pub mod result;

use std::collections::BTreeMap;

use crate::execution::ExecutedTrade;

pub use confidence::ConfidenceGate;
pub use context::{
    normalize_labels, ContextBuilder, ContextError, EvaluationContext, LabelSpelling,
    Probabilities, RawPrediction, RegimeClassifier,
};
pub use cooldown::{CooldownGate, CooldownState};
pub use expected_value::ExpectedValueGate;
pub use factory::{create_component, FactoryError};
pub use regime::RegimeGate;
pub use result::{ComponentResult, InvariantViolation, VetoReason};

/// Trait for gating components.
///
/// # Architecture invariant
/// `evaluate` takes `&self`: evaluation can never advance cross-bar state.
/// The only mutation entry point is `record_trade`, and the only caller of
/// that is the post-execution hook.
pub trait StrategyComponent: Send + Sync {
    /// Stable identifier, unique within a pipeline (e.g. "confidence", "cooldown").
    fn name(&self) -> &str;

    /// Evaluate the gate against one bar's context.
    fn evaluate(&self, ctx: &EvaluationContext) -> ComponentResult;

    /// Observe a confirmed execution. No-op for stateless components.
    fn record_trade(&mut self, _trade: &ExecutedTrade) {}

    /// Feature keys this component reads from the context.
    fn required_features(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this component needs `ctx.regime` to be populated.
    fn needs_regime(&self) -> bool {
        false
    }

    /// Symbol → bar-index view of internal state, for stateful components.
    fn state_snapshot(&self) -> Option<BTreeMap<String, usize>> {
        None
    }

    /// Number of executions this component has recorded over the run.
    fn recorded_trades(&self) -> usize {
        0
    }
}
