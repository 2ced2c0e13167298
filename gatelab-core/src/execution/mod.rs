//! Execution layer: sizing, fills, the post-execution hook and the backtest executor.

pub mod executor;
pub mod fees;
pub mod hook;
pub mod position_manager;
pub mod signal;
pub mod sizing;

pub use executor::{
    BacktestExecutor, ContextConfig, ExecutionStats, ExecutorConfig, ExecutorError,
    PredictionSource, PredictionTable, RunResult,
};
pub use fees::{FeeModel, Leg};
pub use hook::{HookAudit, PostExecutionEvent, PostExecutionHook, StateConsistencyError};
pub use position_manager::{ExitPolicy, PositionManager, PositionManagerConfig};
pub use signal::{
    ExecutedTrade, ExecutionOutcome, ExecutionStage, RejectReason, Signal, SignalLifecycle,
};
pub use sizing::{
    ConfidenceScaled, EquityFraction, FixedNotional, FixedQuantity, SizingConfig, SizingPolicy,
    SizingRequest,
};
