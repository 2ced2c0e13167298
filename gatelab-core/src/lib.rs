//! GateLab Core: gating components, decision pipeline, backtest executor.
//!
//! This crate turns a model's directional output into gated, sized trades:
//! - Domain types (bars, positions, trade records, ids, hashes)
//! - Gating components (confidence, regime, expected value, cooldown) and their factory
//! - First-veto-wins decision pipeline, attribution and the gate-redundancy probe
//! - Closed-bar features computed live, precomputed and fast, bit-for-bit equal
//! - Backtest executor, position manager and the post-execution hook that
//!   makes phantom trades unrepresentable

pub mod components;
pub mod domain;
pub mod execution;
pub mod features;
pub mod fingerprint;
pub mod pipeline;
pub mod rng;

pub use components::{
    create_component, ComponentResult, ContextBuilder, EvaluationContext, FactoryError,
    RawPrediction, StrategyComponent,
};
pub use domain::{Bar, MarketData, TradeRecord};
pub use execution::{BacktestExecutor, ExecutorConfig, ExecutorError, RunResult};
pub use features::{FeatureMode, FeatureSet, FeatureVector};
pub use fingerprint::{ComponentConfig, PipelineConfig};
pub use pipeline::{Action, AttributionSnapshot, DecisionPipeline, StrategyDecision};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a sweep moves across threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::MarketData>();
        require_sync::<domain::MarketData>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::FullHash>();
        require_sync::<domain::FullHash>();

        // Components and pipeline
        require_send::<components::EvaluationContext>();
        require_sync::<components::EvaluationContext>();
        require_send::<components::CooldownGate>();
        require_sync::<components::CooldownGate>();
        require_send::<pipeline::DecisionPipeline>();
        require_sync::<pipeline::DecisionPipeline>();
        require_send::<pipeline::StrategyDecision>();
        require_sync::<pipeline::StrategyDecision>();
        require_send::<pipeline::AttributionTracker>();
        require_sync::<pipeline::AttributionTracker>();

        // Features
        require_send::<features::FeatureSet>();
        require_sync::<features::FeatureSet>();
        require_send::<features::FastFeatures>();
        require_sync::<features::FastFeatures>();

        // Execution
        require_send::<execution::ExecutedTrade>();
        require_sync::<execution::ExecutedTrade>();
        require_send::<execution::PositionManager>();
        require_sync::<execution::PositionManager>();
        require_send::<execution::BacktestExecutor>();
        require_sync::<execution::BacktestExecutor>();
        require_send::<execution::RunResult>();
        require_sync::<execution::RunResult>();
        require_send::<execution::ExecutorError>();
        require_sync::<execution::ExecutorError>();

        // RNG
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    /// Architecture contract: evaluation cannot mutate component state.
    ///
    /// `evaluate` takes `&self`; only `record_trade` takes `&mut self`, and it
    /// requires an `ExecutedTrade`, which this crate alone can construct.
    #[test]
    fn evaluation_is_read_only() {
        fn _check(component: &dyn StrategyComponent, ctx: &EvaluationContext) -> ComponentResult {
            component.evaluate(ctx)
        }
    }
}
