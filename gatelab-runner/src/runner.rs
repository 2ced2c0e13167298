//! Backtest runner: wires config, market, executor and metrics together.
//!
//! Two entry points:
//! - `run_backtest()`: caller supplies bars and predictions. Used by sweeps.
//! - `run_from_config()`: generates the configured synthetic market, then runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

use gatelab_core::components::FactoryError;
use gatelab_core::domain::{BarError, ConfigHash, FullHash, LedgerHash, MarketData, TradeRecord};
use gatelab_core::execution::{
    BacktestExecutor, ExecutionStats, ExecutorError, HookAudit, PredictionSource, RunResult,
};
use gatelab_core::features::ParityReport;
use gatelab_core::pipeline::{AttributionSnapshot, DecisionPipeline, DecisionRecord, RedundancyReport};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::metrics::PerformanceMetrics;
use crate::synthetic;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("market data error: {0}")]
    Market(#[from] BarError),
    #[error("composition error: {0}")]
    Composition(#[from] FactoryError),
    #[error("execution error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
    #[error("config has no [market] section and no market data was supplied")]
    NoMarket,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config_hash: ConfigHash,
    pub full_hash: FullHash,
    pub ledger_hash: LedgerHash,
    pub symbols: Vec<String>,
    pub bar_count: usize,
    pub warmup_bars: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub attribution: AttributionSnapshot,
    pub stats: ExecutionStats,
    pub redundancy: Option<RedundancyReport>,
    #[serde(default)]
    pub parity: BTreeMap<String, ParityReport>,
    pub hook_audit: HookAudit,
    /// Component → symbol → last confirmed trade bar, at end of run.
    #[serde(default)]
    pub final_state: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<DecisionRecord>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    fn from_run(
        run_id: RunId,
        config: &RunConfig,
        market: &MarketData,
        run: RunResult,
    ) -> Result<Self, RunError> {
        let pipeline = config.pipeline_config();
        let ledger_hash = run.ledger_hash()?;
        let metrics = PerformanceMetrics::from_run(&run);
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            config_hash: pipeline.config_hash(),
            full_hash: pipeline.full_hash(),
            ledger_hash,
            symbols: market.symbols().map(str::to_string).collect(),
            bar_count: market.max_len(),
            warmup_bars: run.warmup,
            initial_capital: run.initial_capital,
            final_equity: run.final_equity,
            metrics,
            trades: run.trades,
            equity_curve: run.equity_curve,
            attribution: run.attribution,
            stats: run.stats,
            redundancy: run.redundancy,
            parity: run.parity,
            hook_audit: run.hook_audit,
            final_state: run.final_state,
            decisions: run.decisions,
        })
    }
}

/// Run one backtest over caller-supplied bars and predictions.
///
/// Every call builds a fresh pipeline, so no component state leaks between runs.
pub fn run_backtest(
    config: &RunConfig,
    market: &MarketData,
    predictions: &dyn PredictionSource,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let run_id = config.run_id()?;
    let pipeline = DecisionPipeline::build(&config.pipeline_config())?;
    let sizing = config.sizing.build()?;
    let executor = BacktestExecutor::new(config.executor_config()?, config.feature_set()?);

    let lengths: Vec<usize> = market.iter().map(|(_, bars)| bars.len()).collect();
    if lengths.windows(2).any(|w| w[0] != w[1]) {
        warn!(?lengths, "symbols have uneven bar counts; shorter series stop early");
    }

    let run = executor.run(market, predictions, pipeline, sizing.as_ref())?;
    let result = BacktestResult::from_run(run_id, config, market, run)?;
    info!(
        run_id = %result.run_id,
        trades = result.metrics.trade_count,
        net_pnl = result.metrics.net_pnl,
        max_drawdown = result.metrics.max_drawdown,
        "run complete"
    );
    Ok(result)
}

/// Generate the configured synthetic market and run on it.
pub fn run_from_config(config: &RunConfig) -> Result<BacktestResult, RunError> {
    let market_config = config.market.as_ref().ok_or(RunError::NoMarket)?;
    let generated = synthetic::generate(market_config)?;
    run_backtest(config, &generated.market, &generated.predictions)
}
