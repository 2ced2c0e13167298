//! Backtest executor: replays closed bars through one pipeline instance.
//!
//! Per bar, per symbol (symbols in `BTreeMap` order):
//! 1. Exits: mark the open position and apply the exit policy
//! 2. Features: live, precomputed or fast, per `FeatureMode`
//! 3. Context: model output + features → `EvaluationContext`
//! 4. Decision: first-veto-wins evaluation, observed by attribution
//! 5. Execution: size → `try_open` → post-execution hook
//!
//! Equity is sampled once per bar index after every symbol has been processed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::components::{
    ContextBuilder, ContextError, FactoryError, LabelSpelling, RawPrediction, RegimeClassifier,
};
use crate::domain::{
    Bar, ExitReason, FullHash, IdGen, LedgerHash, MarketData, PositionSide, SignalId,
    TradeRecord,
};
use crate::features::{
    live_features, precompute_features, verify_parity, FastFeatures, FeatureMode, FeatureSet,
    FeatureVector, ParityError, ParityReport,
};
use crate::pipeline::{
    AttributionSnapshot, AttributionTracker, BarOutcome, DecisionPipeline, DecisionRecord,
    RedundancyProbe, RedundancyReport, StrategyDecision, SIZING_GATE,
};

use super::hook::{HookAudit, PostExecutionHook, StateConsistencyError};
use super::position_manager::{PositionManager, PositionManagerConfig};
use super::signal::{ExecutionOutcome, ExecutionStage, Signal, SignalLifecycle};
use super::sizing::{SizingPolicy, SizingRequest};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("context for '{symbol}' at bar {bar_index}: {source}")]
    Context {
        symbol: String,
        bar_index: usize,
        #[source]
        source: ContextError,
    },
    #[error("feature parity for '{symbol}': {source}")]
    Parity {
        symbol: String,
        #[source]
        source: ParityError,
    },
    #[error(transparent)]
    StateConsistency(#[from] StateConsistencyError),
    #[error(transparent)]
    Config(#[from] FactoryError),
    #[error("feature '{0}' is required but not produced by the feature set")]
    MissingFeatureSource(String),
    #[error("signal {signal_id} cannot move from {from:?} to {to:?}")]
    Stage {
        signal_id: SignalId,
        from: ExecutionStage,
        to: ExecutionStage,
    },
    #[error("initial capital must be positive and finite, got {0}")]
    InvalidCapital(f64),
}

// ─── Config ──────────────────────────────────────────────────────────

/// How model output becomes an `EvaluationContext`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub native_spelling: LabelSpelling,
    /// Feature keys that must be present and finite on every evaluated bar.
    pub required_features: Vec<String>,
    /// Fallback regime labelling when the model supplies none.
    pub regime_classifier: Option<RegimeClassifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub position: PositionManagerConfig,
    pub feature_mode: FeatureMode,
    /// Check fast features against the live reference before trusting them.
    pub verify_parity: bool,
    /// Shadow-evaluate every gate (and sizing) to find redundant gates.
    pub detect_redundancy: bool,
    /// Keep one `DecisionRecord` per evaluated bar in the result.
    pub keep_decisions: bool,
    pub context: ContextConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            position: PositionManagerConfig::default(),
            feature_mode: FeatureMode::default(),
            verify_parity: true,
            detect_redundancy: false,
            keep_decisions: true,
            context: ContextConfig::default(),
        }
    }
}

// ─── Model output ────────────────────────────────────────────────────

/// Upstream model output, looked up per symbol and closed bar.
///
/// `None` means "no prediction for this bar"; the executor then evaluates an
/// empty prediction, which every gate sees as unavailable probabilities.
pub trait PredictionSource: Send + Sync {
    fn predict(&self, symbol: &str, bar_index: usize, features: &FeatureVector) -> Option<RawPrediction>;
}

impl<F> PredictionSource for F
where
    F: Fn(&str, usize, &FeatureVector) -> Option<RawPrediction> + Send + Sync,
{
    fn predict(&self, symbol: &str, bar_index: usize, features: &FeatureVector) -> Option<RawPrediction> {
        self(symbol, bar_index, features)
    }
}

/// Precomputed predictions, one per bar, keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    rows: BTreeMap<String, Vec<RawPrediction>>,
}

impl PredictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, predictions: Vec<RawPrediction>) {
        self.rows.insert(symbol.into(), predictions);
    }

    pub fn get(&self, symbol: &str, bar_index: usize) -> Option<&RawPrediction> {
        self.rows.get(symbol).and_then(|rows| rows.get(bar_index))
    }
}

impl FromIterator<(String, Vec<RawPrediction>)> for PredictionTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<RawPrediction>)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl PredictionSource for PredictionTable {
    fn predict(&self, symbol: &str, bar_index: usize, _features: &FeatureVector) -> Option<RawPrediction> {
        self.get(symbol, bar_index).cloned()
    }
}

// ─── Result ──────────────────────────────────────────────────────────

/// Counters for one run. Vetoes and rejections are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub bars_evaluated: u64,
    pub warmup_bars: u64,
    pub vetoed: u64,
    pub no_direction: u64,
    /// Allowed, directional decisions that became a `Signal`.
    pub signals: u64,
    pub attempts: u64,
    pub executed: u64,
    pub rejected: BTreeMap<String, u64>,
    pub exits: BTreeMap<String, u64>,
}

impl ExecutionStats {
    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// `full_hash` of the pipeline config, when the pipeline was built from one.
    pub pipeline_hash: Option<FullHash>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub trades: Vec<TradeRecord>,
    pub decisions: Vec<DecisionRecord>,
    pub attribution: AttributionSnapshot,
    pub stats: ExecutionStats,
    /// Equity after each bar index.
    pub equity_curve: Vec<f64>,
    pub warmup: usize,
    /// Parity reports per symbol (fast mode with verification only).
    pub parity: BTreeMap<String, ParityReport>,
    pub redundancy: Option<RedundancyReport>,
    /// Component → symbol → last confirmed trade bar, at end of run.
    pub final_state: BTreeMap<String, BTreeMap<String, usize>>,
    pub hook_audit: HookAudit,
}

impl RunResult {
    /// Fingerprint of the ledger, attribution and final component state.
    ///
    /// Two runs with the same inputs produce the same hash.
    pub fn ledger_hash(&self) -> Result<LedgerHash, serde_json::Error> {
        let bytes = serde_json::to_vec(&(&self.trades, &self.attribution, &self.final_state))?;
        Ok(LedgerHash::from_bytes(&bytes))
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Entry bars of every closed trade, in ledger order.
    pub fn entry_bars(&self) -> Vec<usize> {
        self.trades.iter().map(|t| t.entry_bar).collect()
    }
}

// ─── Executor ────────────────────────────────────────────────────────

enum FeatureSource {
    Live,
    Rows(Vec<FeatureVector>),
    Fast(FastFeatures),
}

impl FeatureSource {
    fn at(&self, bars: &[Bar], bar_index: usize, set: &FeatureSet) -> FeatureVector {
        match self {
            Self::Live => live_features(bars, bar_index + 1, set).unwrap_or_default(),
            Self::Rows(rows) => rows.get(bar_index).cloned().unwrap_or_default(),
            Self::Fast(fast) => fast.vector_at(bar_index).unwrap_or_default(),
        }
    }
}

/// Mutable state for one run. Dropped when the run ends.
struct RunState {
    pipeline: DecisionPipeline,
    positions: PositionManager,
    hook: PostExecutionHook,
    attribution: AttributionTracker,
    probe: Option<RedundancyProbe>,
    ids: IdGen,
    stats: ExecutionStats,
    decisions: Vec<DecisionRecord>,
}

impl RunState {
    fn record_exit(&mut self, record: &TradeRecord) {
        *self.stats.exits.entry(record.exit_reason.to_string()).or_default() += 1;
    }
}

#[derive(Debug)]
pub struct BacktestExecutor {
    config: ExecutorConfig,
    features: FeatureSet,
}

impl BacktestExecutor {
    pub fn new(config: ExecutorConfig, features: FeatureSet) -> Self {
        Self { config, features }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Run one backtest. The pipeline is consumed: its cross-bar state lives
    /// and dies with this run.
    pub fn run(
        &self,
        market: &MarketData,
        predictions: &dyn PredictionSource,
        pipeline: DecisionPipeline,
        sizing: &dyn SizingPolicy,
    ) -> Result<RunResult, ExecutorError> {
        let capital = self.config.position.initial_capital;
        if !(capital.is_finite() && capital > 0.0) {
            return Err(ExecutorError::InvalidCapital(capital));
        }
        self.config.position.validate()?;

        let context = self.context_builder(&pipeline)?;
        let sources = self.feature_sources(market)?;
        let parity = sources
            .iter()
            .filter_map(|(symbol, (_, report))| report.clone().map(|r| (symbol.clone(), r)))
            .collect::<BTreeMap<_, _>>();

        let warmup = self.features.warmup();
        let num_bars = market.max_len();
        let pipeline_hash = pipeline.config().map(|c| c.full_hash());

        info!(
            symbols = market.symbol_count(),
            bars = num_bars,
            warmup,
            components = ?pipeline.component_names(),
            mode = ?self.config.feature_mode,
            "backtest started"
        );

        let mut state = RunState {
            hook: PostExecutionHook::attach(&pipeline),
            attribution: AttributionTracker::for_pipeline(&pipeline),
            pipeline,
            positions: PositionManager::new(self.config.position),
            probe: self.config.detect_redundancy.then(RedundancyProbe::new),
            ids: IdGen::new(),
            stats: ExecutionStats::default(),
            decisions: Vec::new(),
        };
        let mut equity_curve = Vec::with_capacity(num_bars);

        for t in 0..num_bars {
            for (symbol, bars) in market.iter() {
                let Some(bar) = bars.get(t) else {
                    continue;
                };

                // ─── Exits ───
                if let Some(record) = state.positions.check_exits(t, bar) {
                    state.record_exit(&record);
                }

                if t < warmup {
                    state.stats.warmup_bars += 1;
                    continue;
                }

                let features = match sources.get(symbol) {
                    Some((source, _)) => source.at(bars, t, &self.features),
                    None => FeatureVector::new(),
                };
                self.step(&mut state, &context, predictions, sizing, symbol, t, bar, &features)?;
            }
            equity_curve.push(state.positions.equity());
        }

        // ─── End of data ───
        let last_bars = market
            .iter()
            .filter_map(|(_, bars)| bars.last().map(|bar| (bars.len() - 1, bar)));
        let closed = state.positions.close_all(last_bars, ExitReason::EndOfData);
        for record in &closed {
            state.record_exit(record);
        }
        if let Some(last) = equity_curve.last_mut() {
            *last = state.positions.equity();
        }

        let hook_audit = state.hook.audit(&state.pipeline)?;
        let final_equity = state.positions.equity();
        let redundancy = state.probe.as_ref().map(RedundancyProbe::report);
        let attribution = state.attribution.snapshot();
        let final_state = state.pipeline.state_snapshot();

        info!(
            trades = state.positions.ledger().len(),
            vetoed = state.stats.vetoed,
            executed = state.stats.executed,
            rejected = state.stats.total_rejected(),
            final_equity,
            "backtest finished"
        );

        Ok(RunResult {
            pipeline_hash,
            initial_capital: capital,
            final_equity,
            trades: state.positions.into_ledger(),
            decisions: state.decisions,
            attribution,
            stats: state.stats,
            equity_curve,
            warmup,
            parity,
            redundancy,
            final_state,
            hook_audit,
        })
    }

    fn context_builder(&self, pipeline: &DecisionPipeline) -> Result<ContextBuilder, ExecutorError> {
        let ctx = &self.config.context;
        let mut required = pipeline.required_features();
        required.extend(ctx.required_features.iter().cloned());
        for key in &required {
            if !self.features.contains(key) {
                return Err(ExecutorError::MissingFeatureSource(key.clone()));
            }
        }

        let mut builder = ContextBuilder::new(ctx.native_spelling)
            .require_features(required)
            .require_regime(pipeline.needs_regime());
        if let Some(classifier) = &ctx.regime_classifier {
            if !self.features.contains(&classifier.feature) {
                return Err(ExecutorError::MissingFeatureSource(classifier.feature.clone()));
            }
            builder = builder.with_classifier(classifier.clone());
        }
        Ok(builder)
    }

    /// Prepare per-symbol features for the configured mode.
    fn feature_sources(
        &self,
        market: &MarketData,
    ) -> Result<BTreeMap<String, (FeatureSource, Option<ParityReport>)>, ExecutorError> {
        let mut sources = BTreeMap::new();
        for (symbol, bars) in market.iter() {
            let parity_err = |source| ExecutorError::Parity {
                symbol: symbol.to_string(),
                source,
            };
            let entry = match self.config.feature_mode {
                FeatureMode::Live => (FeatureSource::Live, None),
                FeatureMode::Precomputed => {
                    let rows = precompute_features(bars, &self.features).map_err(parity_err)?;
                    (FeatureSource::Rows(rows), None)
                }
                FeatureMode::Fast => {
                    let report = if self.config.verify_parity {
                        let report = verify_parity(bars, &self.features)
                            .and_then(ParityReport::into_result)
                            .map_err(parity_err)?;
                        Some(report)
                    } else {
                        None
                    };
                    (FeatureSource::Fast(FastFeatures::compute(bars, &self.features)), report)
                }
            };
            sources.insert(symbol.to_string(), entry);
        }
        Ok(sources)
    }

    /// Decide and, when allowed and directional, attempt execution for one bar.
    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        state: &mut RunState,
        context: &ContextBuilder,
        predictions: &dyn PredictionSource,
        sizing: &dyn SizingPolicy,
        symbol: &str,
        t: usize,
        bar: &Bar,
        features: &FeatureVector,
    ) -> Result<(), ExecutorError> {
        state.stats.bars_evaluated += 1;
        let prediction = predictions.predict(symbol, t, features).unwrap_or_default();
        let ctx = context
            .build(symbol, t, Some(bar.timestamp), &prediction, features)
            .map_err(|source| ExecutorError::Context {
                symbol: symbol.to_string(),
                bar_index: t,
                source,
            })?;

        let decision = state.pipeline.evaluate(&ctx);
        state.attribution.observe(&decision);

        if let Some(probe) = state.probe.as_mut() {
            if ctx.direction().is_entry() {
                let shadow = state.pipeline.shadow_evaluate(&ctx);
                let shadow_confidence = shadow
                    .iter()
                    .map(|(_, r)| r.confidence())
                    .fold(1.0_f64, f64::min);
                let quantity = sizing.size(&SizingRequest {
                    action: ctx.direction(),
                    model_confidence: ctx.confidence,
                    decision_confidence: shadow_confidence,
                    equity: state.positions.equity(),
                    price: bar.close,
                });
                let sizing_blocked = !(quantity.is_finite() && quantity > 0.0);
                probe.observe(
                    shadow
                        .iter()
                        .map(|(name, r)| (name.as_str(), !r.allowed()))
                        .chain(std::iter::once((SIZING_GATE, sizing_blocked))),
                );
            }
        }

        let outcome = if let Some(blocker) = decision.veto_component() {
            state.stats.vetoed += 1;
            debug!(symbol, bar = t, gate = blocker, reasons = ?decision.reasons(), "vetoed");
            BarOutcome::Vetoed
        } else if let Some(side) = decision.action().side() {
            self.execute(state, sizing, &decision, ctx.confidence, side, symbol, t, bar)?
        } else {
            state.stats.no_direction += 1;
            BarOutcome::NoDirection
        };

        if self.config.keep_decisions {
            state.decisions.push(DecisionRecord {
                bar_index: t,
                symbol: symbol.to_string(),
                timestamp: Some(bar.timestamp),
                decision,
                outcome,
            });
        }
        Ok(())
    }

    /// Drive one signal through `SignalEvaluated → Sized → ExecutionAttempted → {Executed | Rejected}`.
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        state: &mut RunState,
        sizing: &dyn SizingPolicy,
        decision: &StrategyDecision,
        model_confidence: f64,
        side: PositionSide,
        symbol: &str,
        t: usize,
        bar: &Bar,
    ) -> Result<BarOutcome, ExecutorError> {
        let signal = Signal {
            signal_id: state.ids.next_signal_id(),
            symbol: symbol.to_string(),
            bar_index: t,
            timestamp: bar.timestamp,
            side,
            confidence: decision.confidence(),
            model_confidence,
        };
        state.stats.signals += 1;

        let mut lifecycle = SignalLifecycle::new(signal.signal_id);
        let mut advance = |next: ExecutionStage| {
            lifecycle
                .advance(next)
                .map_err(|(from, to)| ExecutorError::Stage {
                    signal_id: signal.signal_id,
                    from,
                    to,
                })
        };

        if self.config.position.exit.exit_on_opposite_signal
            && state.positions.open_side(symbol) == Some(side.opposite())
        {
            if let Some(record) = state.positions.close(t, bar, ExitReason::OppositeSignal) {
                state.record_exit(&record);
            }
        }

        let quantity = sizing.size(&SizingRequest {
            action: decision.action(),
            model_confidence: signal.model_confidence,
            decision_confidence: signal.confidence,
            equity: state.positions.equity(),
            price: bar.close,
        });
        advance(ExecutionStage::Sized)?;

        advance(ExecutionStage::ExecutionAttempted)?;
        state.stats.attempts += 1;
        let outcome = state.positions.try_open(&signal, quantity, bar);
        state.hook.fire(&mut state.pipeline, &signal, &outcome)?;

        match outcome {
            ExecutionOutcome::Executed(trade) => {
                advance(ExecutionStage::Executed)?;
                state.stats.executed += 1;
                state.attribution.observe_execution();
                Ok(BarOutcome::Executed {
                    trade_id: trade.trade_id(),
                })
            }
            ExecutionOutcome::Rejected(reason) => {
                advance(ExecutionStage::Rejected)?;
                *state.stats.rejected.entry(reason.to_string()).or_default() += 1;
                state.attribution.observe_rejection(&reason);
                debug!(symbol, bar = t, signal = %signal.signal_id, %reason, quantity, "rejected");
                Ok(BarOutcome::Rejected { reason })
            }
        }
    }
}
