//! Composition engine, decisions, attribution and the gate-redundancy probe.

pub mod attribution;
pub mod composer;
pub mod decision;
pub mod redundancy;

pub use attribution::{AttributionSnapshot, AttributionTracker, ComponentAttribution, ComponentStats};
pub use composer::DecisionPipeline;
pub use decision::{Action, BarOutcome, DecisionRecord, StrategyDecision};
pub use redundancy::{RedundancyFinding, RedundancyKind, RedundancyProbe, RedundancyReport, SIZING_GATE};
