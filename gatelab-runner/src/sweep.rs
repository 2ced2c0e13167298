//! Parameter sweeps: grid search over gate parameters.
//!
//! Each grid point is an independent `RunConfig`; every run builds its own
//! pipeline, position manager and attribution tracker, so runs share nothing
//! but the read-only market and predictions. Results are ordered by
//! `(config_hash, full_hash)` regardless of completion order.

use rayon::prelude::*;
use tracing::info;

use gatelab_core::domain::{FullHash, MarketData};
use gatelab_core::execution::PredictionSource;

use crate::config::RunConfig;
use crate::runner::{run_backtest, BacktestResult, RunError};

/// Values to try for one component parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAxis {
    /// Instance name of the component (its type when unnamed).
    pub component: String,
    pub param: String,
    pub values: Vec<f64>,
}

/// Cartesian grid over component parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    pub axes: Vec<ParamAxis>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(
        mut self,
        component: impl Into<String>,
        param: impl Into<String>,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.axes.push(ParamAxis {
            component: component.into(),
            param: param.into(),
            values: values.into_iter().collect(),
        });
        self
    }

    /// Total number of configurations in the grid.
    pub fn size(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Every configuration in the grid, in axis-major order.
    ///
    /// An empty grid yields the base config alone.
    pub fn generate_configs(&self, base_config: &RunConfig) -> Result<Vec<RunConfig>, RunError> {
        let mut configs = vec![base_config.clone()];
        for axis in &self.axes {
            let mut next = Vec::with_capacity(configs.len() * axis.values.len());
            for config in &configs {
                for &value in &axis.values {
                    next.push(config.with_component_param(&axis.component, &axis.param, value)?);
                }
            }
            configs = next;
        }
        Ok(configs)
    }
}

/// Parameter sweep executor.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every grid configuration over the same market and predictions.
    ///
    /// Fails on the first invalid configuration or failed run.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base_config: &RunConfig,
        market: &MarketData,
        predictions: &dyn PredictionSource,
    ) -> Result<SweepResults, RunError> {
        let configs = grid.generate_configs(base_config)?;
        info!(configs = configs.len(), parallel = self.parallel, "sweep started");

        let results: Vec<BacktestResult> = if self.parallel {
            configs
                .par_iter()
                .map(|config| run_backtest(config, market, predictions))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            configs
                .iter()
                .map(|config| run_backtest(config, market, predictions))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(results))
    }
}

/// Results from a parameter sweep, ordered by `(config_hash, full_hash)`.
#[derive(Debug, Clone)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
}

impl SweepResults {
    fn new(mut results: Vec<BacktestResult>) -> Self {
        results.sort_by(|a, b| {
            (&a.config_hash, &a.full_hash, &a.run_id).cmp(&(&b.config_hash, &b.full_hash, &b.run_id))
        });
        Self { results }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// First result whose pipeline has this full hash.
    pub fn get(&self, full_hash: &FullHash) -> Option<&BacktestResult> {
        self.results.iter().find(|r| &r.full_hash == full_hash)
    }

    /// Result with the highest score. Ties keep the earlier result; NaN never wins.
    pub fn best_by<F>(&self, score: F) -> Option<&BacktestResult>
    where
        F: Fn(&BacktestResult) -> f64,
    {
        let mut best: Option<(&BacktestResult, f64)> = None;
        for result in &self.results {
            let s = score(result);
            if s.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((result, s));
            }
        }
        best.map(|(r, _)| r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelab_core::fingerprint::ComponentConfig;

    fn base() -> RunConfig {
        RunConfig {
            components: vec![
                ComponentConfig::new("confidence").with_param("threshold", 0.5),
                ComponentConfig::new("cooldown").with_param("min_bars_between_trades", 3.0),
            ],
            ..RunConfig::default()
        }
    }

    #[test]
    fn grid_is_cartesian() {
        let grid = ParamGrid::new()
            .axis("confidence", "threshold", [0.5, 0.6, 0.7])
            .axis("cooldown", "min_bars_between_trades", [2.0, 4.0]);
        assert_eq!(grid.size(), 6);

        let configs = grid.generate_configs(&base()).unwrap();
        assert_eq!(configs.len(), 6);
        let pairs: Vec<(f64, f64)> = configs
            .iter()
            .map(|c| {
                (
                    c.components[0].params["threshold"],
                    c.components[1].params["min_bars_between_trades"],
                )
            })
            .collect();
        assert_eq!(pairs[0], (0.5, 2.0));
        assert_eq!(pairs[1], (0.5, 4.0));
        assert_eq!(pairs[5], (0.7, 4.0));
    }

    #[test]
    fn empty_grid_is_base_config() {
        let configs = ParamGrid::new().generate_configs(&base()).unwrap();
        assert_eq!(configs, vec![base()]);
        assert_eq!(ParamGrid::new().size(), 1);
    }

    #[test]
    fn unknown_component_is_an_error() {
        let grid = ParamGrid::new().axis("regime", "x", [1.0]);
        assert!(grid.generate_configs(&base()).is_err());
    }
}
