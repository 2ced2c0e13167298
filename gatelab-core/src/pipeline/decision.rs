//! StrategyDecision, the output of one pipeline pass, and its per-bar record.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::components::{ComponentResult, InvariantViolation};
use crate::domain::{PositionSide, TradeId};
use crate::execution::RejectReason;

/// Trading action emitted by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[default]
    None,
    Long,
    Short,
}

impl Action {
    pub fn side(self) -> Option<PositionSide> {
        match self {
            Self::None => None,
            Self::Long => Some(PositionSide::Long),
            Self::Short => Some(PositionSide::Short),
        }
    }

    pub fn is_entry(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Output of one full pipeline pass for one symbol at one bar.
///
/// Constructed only by the pipeline and never mutated afterwards; fields are
/// read through accessors. Deserialization goes back through the same two
/// constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrategyDecisionRepr")]
pub struct StrategyDecision {
    action: Action,
    veto_component: Option<String>,
    confidence: f64,
    component_results: Vec<(String, ComponentResult)>,
    reasons: Vec<String>,
}

impl StrategyDecision {
    /// Every component allowed. Confidence is the minimum over the results.
    pub(crate) fn allowed(action: Action, component_results: Vec<(String, ComponentResult)>) -> Self {
        let confidence = component_results
            .iter()
            .map(|(_, r)| r.confidence())
            .fold(1.0_f64, f64::min);
        let reasons = if action == Action::None {
            vec!["NO_DIRECTION".to_string()]
        } else {
            Vec::new()
        };
        Self {
            action,
            veto_component: None,
            confidence,
            component_results,
            reasons,
        }
    }

    /// The last entry of `component_results` is the veto.
    pub(crate) fn vetoed(
        veto_component: String,
        component_results: Vec<(String, ComponentResult)>,
        reason: String,
    ) -> Self {
        Self {
            action: Action::None,
            veto_component: Some(veto_component),
            confidence: 0.0,
            component_results,
            reasons: vec![reason],
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Name of the first component that vetoed, if any.
    pub fn veto_component(&self) -> Option<&str> {
        self.veto_component.as_deref()
    }

    pub fn is_vetoed(&self) -> bool {
        self.veto_component.is_some()
    }

    /// Aggregate confidence: min over components when allowed, 0 when vetoed.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// One entry per component actually evaluated, in pipeline order.
    pub fn component_results(&self) -> &[(String, ComponentResult)] {
        &self.component_results
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

/// Aggregate confidence is recomputed from the component results on the way in.
#[derive(Deserialize)]
struct StrategyDecisionRepr {
    action: Action,
    veto_component: Option<String>,
    component_results: Vec<(String, ComponentResult)>,
    reasons: Vec<String>,
}

impl TryFrom<StrategyDecisionRepr> for StrategyDecision {
    type Error = InvariantViolation;

    fn try_from(raw: StrategyDecisionRepr) -> Result<Self, Self::Error> {
        let Some(veto_component) = raw.veto_component else {
            if raw.component_results.iter().any(|(_, r)| !r.allowed()) {
                return Err(InvariantViolation("an allowed decision has a vetoing component"));
            }
            return Ok(Self::allowed(raw.action, raw.component_results));
        };

        if raw.action != Action::None {
            return Err(InvariantViolation("a vetoed decision has no action"));
        }
        let Some(((last_name, last), earlier)) = raw.component_results.split_last() else {
            return Err(InvariantViolation("a vetoed decision ends with the veto"));
        };
        if *last_name != veto_component || last.allowed() {
            return Err(InvariantViolation("a vetoed decision ends with the veto"));
        }
        if earlier.iter().any(|(_, r)| !r.allowed()) {
            return Err(InvariantViolation("only the first veto is evaluated"));
        }
        let [reason] = <[String; 1]>::try_from(raw.reasons)
            .map_err(|_| InvariantViolation("a vetoed decision carries exactly one reason"))?;
        Ok(Self::vetoed(veto_component, raw.component_results, reason))
    }
}

/// What happened on a bar after the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarOutcome {
    /// A gate blocked the signal.
    Vetoed,
    /// All gates allowed but the model had no direction.
    NoDirection,
    Executed { trade_id: TradeId },
    /// The position manager declined a sized signal.
    Rejected { reason: RejectReason },
}

/// Per-bar, per-symbol record of the decision and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub bar_index: usize,
    pub symbol: String,
    pub timestamp: Option<NaiveDateTime>,
    pub decision: StrategyDecision,
    pub outcome: BarOutcome,
}
