//! Attribution: per-component bookkeeping of how gates shaped the run.
//!
//! The tracker is a pure observer: it reads decisions and outcomes and never
//! feeds anything back into the pipeline. Gate vetoes and execution rejections
//! are counted separately so that "blocked by a gate" and "declined by the
//! position manager" never blur together.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::execution::RejectReason;

use super::composer::DecisionPipeline;
use super::decision::{Action, StrategyDecision};

/// Running statistics for one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub evaluations: u64,
    pub vetoes: u64,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub confidence_sum: f64,
    /// Veto reason (display form) → count.
    pub veto_reasons: BTreeMap<String, u64>,
}

impl ComponentStats {
    fn fold(&mut self, confidence: f64) {
        self.evaluations += 1;
        self.confidence_sum += confidence;
        self.min_confidence = Some(self.min_confidence.map_or(confidence, |m| m.min(confidence)));
        self.max_confidence = Some(self.max_confidence.map_or(confidence, |m| m.max(confidence)));
    }

    pub fn mean_confidence(&self) -> Option<f64> {
        if self.evaluations == 0 {
            None
        } else {
            Some(self.confidence_sum / self.evaluations as f64)
        }
    }

    pub fn veto_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.vetoes as f64 / self.evaluations as f64
        }
    }
}

/// Accumulates attribution over one run. Reset only at run start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributionTracker {
    order: Vec<String>,
    stats: BTreeMap<String, ComponentStats>,
    decisions: u64,
    vetoed: u64,
    no_direction: u64,
    signals: u64,
    executions: u64,
    rejections: BTreeMap<String, u64>,
}

impl AttributionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register every component so never-reached gates still report zeros.
    pub fn for_pipeline(pipeline: &DecisionPipeline) -> Self {
        let mut tracker = Self::new();
        for name in pipeline.component_names() {
            tracker.register(name);
        }
        tracker
    }

    fn register(&mut self, name: &str) -> &mut ComponentStats {
        if !self.stats.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.stats.entry(name.to_string()).or_default()
    }

    /// Fold one decision into the aggregates.
    pub fn observe(&mut self, decision: &StrategyDecision) {
        self.decisions += 1;
        for (name, result) in decision.component_results() {
            let stats = self.register(name);
            stats.fold(result.confidence());
            if !result.allowed() {
                stats.vetoes += 1;
                if let Some(reason) = result.reason() {
                    *stats.veto_reasons.entry(reason.to_string()).or_default() += 1;
                }
            }
        }
        if decision.is_vetoed() {
            self.vetoed += 1;
        } else if decision.action() == Action::None {
            self.no_direction += 1;
        } else {
            self.signals += 1;
        }
    }

    pub fn observe_execution(&mut self) {
        self.executions += 1;
    }

    pub fn observe_rejection(&mut self, reason: &RejectReason) {
        *self.rejections.entry(reason.to_string()).or_default() += 1;
    }

    pub fn reset(&mut self) {
        let order = std::mem::take(&mut self.order);
        *self = Self::new();
        for name in &order {
            self.register(name);
        }
    }

    pub fn stats(&self, component: &str) -> Option<&ComponentStats> {
        self.stats.get(component)
    }

    pub fn snapshot(&self) -> AttributionSnapshot {
        let components = self
            .order
            .iter()
            .filter_map(|name| self.stats.get(name).map(|s| (name, s)))
            .map(|(name, s)| ComponentAttribution {
                name: name.clone(),
                evaluations: s.evaluations,
                vetoes: s.vetoes,
                veto_rate: s.veto_rate(),
                min_confidence: s.min_confidence,
                max_confidence: s.max_confidence,
                mean_confidence: s.mean_confidence(),
                veto_reasons: s.veto_reasons.clone(),
            })
            .collect();
        AttributionSnapshot {
            decisions: self.decisions,
            vetoed: self.vetoed,
            no_direction: self.no_direction,
            signals: self.signals,
            executions: self.executions,
            rejections: self.rejections.clone(),
            components,
        }
    }
}

/// Serializable view of one component's attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentAttribution {
    pub name: String,
    pub evaluations: u64,
    pub vetoes: u64,
    pub veto_rate: f64,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub mean_confidence: Option<f64>,
    pub veto_reasons: BTreeMap<String, u64>,
}

/// Serializable attribution report for a run. Components are in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    pub decisions: u64,
    pub vetoed: u64,
    pub no_direction: u64,
    /// Allowed decisions with a direction.
    pub signals: u64,
    pub executions: u64,
    /// Execution rejections by reason. Never counted as vetoes.
    pub rejections: BTreeMap<String, u64>,
    pub components: Vec<ComponentAttribution>,
}

impl AttributionSnapshot {
    pub fn component(&self, name: &str) -> Option<&ComponentAttribution> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ConfidenceGate, EvaluationContext, Probabilities, RegimeGate};

    fn pipeline() -> DecisionPipeline {
        DecisionPipeline::from_components(vec![
            Box::new(ConfidenceGate::new(0.55).unwrap()),
            Box::new(RegimeGate::new(["bull"]).unwrap()),
        ])
        .unwrap()
    }

    fn decisions(p: &DecisionPipeline) -> Vec<StrategyDecision> {
        [(0.6, "bull"), (0.5, "bull"), (0.7, "bear"), (0.8, "bull")]
            .iter()
            .map(|(long, regime)| {
                let ctx = EvaluationContext::new("BTC", 0, Probabilities::normalized(*long, 1.0 - long))
                    .with_regime(*regime);
                p.evaluate(&ctx)
            })
            .collect()
    }

    #[test]
    fn counts_evaluations_and_vetoes() {
        let p = pipeline();
        let mut tracker = AttributionTracker::for_pipeline(&p);
        for d in decisions(&p) {
            tracker.observe(&d);
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.decisions, 4);
        assert_eq!(snap.vetoed, 2);
        assert_eq!(snap.signals, 2);

        let conf = snap.component("confidence").unwrap();
        assert_eq!(conf.evaluations, 4);
        assert_eq!(conf.vetoes, 1);
        assert_eq!(conf.veto_reasons.get("CONFIDENCE_LOW"), Some(&1));

        // Regime is not reached on the confidence veto.
        let regime = snap.component("regime").unwrap();
        assert_eq!(regime.evaluations, 3);
        assert_eq!(regime.vetoes, 1);
        assert_eq!(regime.min_confidence, Some(0.0));
        assert_eq!(regime.max_confidence, Some(1.0));
    }

    #[test]
    fn confidence_statistics() {
        let p = pipeline();
        let mut tracker = AttributionTracker::for_pipeline(&p);
        for d in decisions(&p) {
            tracker.observe(&d);
        }
        let conf = tracker.stats("confidence").unwrap();
        assert!((conf.min_confidence.unwrap() - 0.5).abs() < 1e-12);
        assert!((conf.max_confidence.unwrap() - 0.8).abs() < 1e-12);
        assert!((conf.mean_confidence().unwrap() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn replaying_the_same_sequence_reproduces_aggregates() {
        let p = pipeline();
        let ds = decisions(&p);
        let mut a = AttributionTracker::for_pipeline(&p);
        let mut b = AttributionTracker::for_pipeline(&p);
        for d in &ds {
            a.observe(d);
        }
        for d in &ds {
            b.observe(d);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn rejections_are_not_vetoes() {
        let p = pipeline();
        let mut tracker = AttributionTracker::for_pipeline(&p);
        tracker.observe_rejection(&RejectReason::ZeroSize);
        tracker.observe_rejection(&RejectReason::ZeroSize);
        let snap = tracker.snapshot();
        assert_eq!(snap.total_rejections(), 2);
        assert_eq!(snap.vetoed, 0);
        assert!(snap.components.iter().all(|c| c.vetoes == 0));
    }

    #[test]
    fn reset_keeps_registration_only() {
        let p = pipeline();
        let mut tracker = AttributionTracker::for_pipeline(&p);
        for d in decisions(&p) {
            tracker.observe(&d);
        }
        tracker.observe_execution();
        tracker.reset();
        assert_eq!(tracker, AttributionTracker::for_pipeline(&p));
        assert_eq!(tracker.snapshot().components.len(), 2);
    }

    #[test]
    fn unreached_component_reports_none_statistics() {
        let p = pipeline();
        let tracker = AttributionTracker::for_pipeline(&p);
        let snap = tracker.snapshot();
        assert_eq!(snap.components[1].mean_confidence, None);
        assert_eq!(snap.components[1].veto_rate, 0.0);
    }
}
