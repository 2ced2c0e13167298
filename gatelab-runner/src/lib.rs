//! GateLab Runner: run configuration, orchestration, metrics, export and sweeps.
//!
//! This crate builds on `gatelab-core` to provide:
//! - TOML run configuration with fail-fast validation
//! - A seeded synthetic market (bars plus model predictions)
//! - Single-run orchestration with performance metrics
//! - JSON/CSV artifact export
//! - Parallel parameter sweeps over gate parameters
//! - `tracing` subscriber setup

pub mod config;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use config::{BacktestSection, ConfigError, RunConfig, RunId};
pub use metrics::PerformanceMetrics;
pub use runner::{run_backtest, run_from_config, BacktestResult, RunError, SCHEMA_VERSION};
pub use sweep::{ParamAxis, ParamGrid, ParamSweep, SweepResults};
pub use synthetic::{generate, SyntheticConfig, SyntheticMarket};
