//! Decision pipeline: ordered gates composed first-veto-wins.
//!
//! - `DecisionPipeline::build`: factory orchestrator from a `PipelineConfig`.
//! - `evaluate`: explicit loop, early return on the first veto.
//! - `shadow_evaluate`: every gate, no short circuit (diagnostics only).

use std::collections::{BTreeMap, BTreeSet};

use crate::components::{
    create_component, ComponentResult, EvaluationContext, FactoryError, StrategyComponent,
};
use crate::execution::ExecutedTrade;
use crate::fingerprint::PipelineConfig;

use super::decision::StrategyDecision;

/// An ordered list of gating components owned by one run.
///
/// The pipeline owns its components, and therefore their cross-bar state:
/// two runs never share a pipeline.
pub struct DecisionPipeline {
    components: Vec<Box<dyn StrategyComponent>>,
    config: Option<PipelineConfig>,
}

impl std::fmt::Debug for DecisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionPipeline")
            .field("components", &self.component_names())
            .finish()
    }
}

impl DecisionPipeline {
    /// Build every component from config. Fails before any bar is processed.
    pub fn build(config: &PipelineConfig) -> Result<Self, FactoryError> {
        let components = config
            .components
            .iter()
            .map(create_component)
            .collect::<Result<Vec<_>, _>>()?;
        let mut pipeline = Self::from_components(components)?;
        pipeline.config = Some(config.clone());
        Ok(pipeline)
    }

    /// Assemble a pipeline from already-built components.
    pub fn from_components(components: Vec<Box<dyn StrategyComponent>>) -> Result<Self, FactoryError> {
        if components.is_empty() {
            return Err(FactoryError::EmptyPipeline);
        }
        let mut seen = BTreeSet::new();
        for component in &components {
            if !seen.insert(component.name()) {
                return Err(FactoryError::DuplicateComponent(component.name().to_string()));
            }
        }
        Ok(Self {
            components,
            config: None,
        })
    }

    /// First-veto-wins evaluation.
    ///
    /// On the first veto the loop returns; later components are not evaluated,
    /// so a vetoed decision attributes exactly one blocker.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> StrategyDecision {
        let mut results: Vec<(String, ComponentResult)> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let result = component.evaluate(ctx);
            let name = component.name().to_string();
            if !result.allowed() {
                let reason = match result.reason() {
                    Some(reason) => format!("{name}: {reason}"),
                    None => format!("{name}: VETO"),
                };
                results.push((name.clone(), result));
                return StrategyDecision::vetoed(name, results, reason);
            }
            results.push((name, result));
        }
        StrategyDecision::allowed(ctx.direction(), results)
    }

    /// Evaluate every component regardless of vetoes. Never feeds attribution.
    pub fn shadow_evaluate(&self, ctx: &EvaluationContext) -> Vec<(String, ComponentResult)> {
        self.components
            .iter()
            .map(|c| (c.name().to_string(), c.evaluate(ctx)))
            .collect()
    }

    /// Forward a confirmed execution to every component.
    ///
    /// Crate-private: the post-execution hook is the only caller.
    pub(crate) fn record_trade(&mut self, trade: &ExecutedTrade) {
        for component in &mut self.components {
            component.record_trade(trade);
        }
    }

    /// Component name → symbol → last recorded bar, for stateful components.
    pub fn state_snapshot(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.components
            .iter()
            .filter_map(|c| c.state_snapshot().map(|s| (c.name().to_string(), s)))
            .collect()
    }

    /// Component name → executions recorded, for stateful components.
    pub fn recorded_trades(&self) -> BTreeMap<String, usize> {
        self.components
            .iter()
            .filter(|c| c.state_snapshot().is_some())
            .map(|c| (c.name().to_string(), c.recorded_trades()))
            .collect()
    }

    /// Union of the feature keys every component reads.
    pub fn required_features(&self) -> BTreeSet<String> {
        self.components
            .iter()
            .flat_map(|c| c.required_features())
            .collect()
    }

    pub fn needs_regime(&self) -> bool {
        self.components.iter().any(|c| c.needs_regime())
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The declarative config this pipeline was built from, if any.
    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config.as_ref()
    }
}
