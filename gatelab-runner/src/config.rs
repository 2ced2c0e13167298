//! Run configuration: TOML in, validated executor inputs out.
//!
//! A `RunConfig` captures everything needed to reproduce a run: capital and
//! costs, sizing, exits, context building, the ordered gate list, the
//! feature set and (optionally) a synthetic market. Validation is fail-fast:
//! every component, the sizing policy and the feature set are built once
//! while loading, so a bad parameter never reaches the bar loop.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use gatelab_core::components::FactoryError;
use gatelab_core::execution::{
    ContextConfig, ExecutorConfig, ExitPolicy, FeeModel, PositionManagerConfig, SizingConfig,
};
use gatelab_core::features::{FeatureMode, FeatureSet};
use gatelab_core::fingerprint::{ComponentConfig, PipelineConfig};
use gatelab_core::pipeline::DecisionPipeline;

use crate::synthetic::SyntheticConfig;

/// Content-addressed identifier of a run configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Component(#[from] FactoryError),
}

// ─── Sections ────────────────────────────────────────────────────────

/// `[backtest]`: capital, costs and executor switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_capital: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    /// Quantities are floored to a multiple of this; 0 disables rounding.
    pub lot_size: f64,
    pub feature_mode: FeatureMode,
    pub verify_parity: bool,
    pub detect_redundancy: bool,
    pub keep_decisions: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        Self {
            initial_capital: executor.position.initial_capital,
            fee_bps: 0.0,
            slippage_bps: 0.0,
            lot_size: 0.0,
            feature_mode: executor.feature_mode,
            verify_parity: executor.verify_parity,
            detect_redundancy: executor.detect_redundancy,
            keep_decisions: executor.keep_decisions,
        }
    }
}

/// Serializable configuration for a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub exit: ExitPolicy,
    #[serde(default)]
    pub context: ContextConfig,
    /// Gates in evaluation order.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    /// Feature definitions; the standard set when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<ComponentConfig>>,
    /// Seeded synthetic market, used when no data is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<SyntheticConfig>,
}

impl RunConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build everything once and discard it; the first failure is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capital = self.backtest.initial_capital;
        if !(capital.is_finite() && capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_capital must be positive and finite, got {capital}"
            )));
        }
        self.executor_config()?.position.validate()?;
        self.sizing.build()?;
        DecisionPipeline::build(&self.pipeline_config())?;
        let features = self.feature_set()?;

        let missing = self
            .context
            .required_features
            .iter()
            .chain(self.context.regime_classifier.iter().map(|c| &c.feature))
            .find(|key| !features.contains(key));
        if let Some(key) = missing {
            return Err(ConfigError::Invalid(format!(
                "feature '{key}' is required but not produced by the feature set"
            )));
        }

        if let Some(market) = &self.market {
            market.validate()?;
        }
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    ///
    /// Two runs with identical configs share a `RunId`.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.components.clone())
    }

    pub fn feature_set(&self) -> Result<FeatureSet, FactoryError> {
        match &self.features {
            Some(configs) => FeatureSet::from_configs(configs),
            None => Ok(FeatureSet::standard()),
        }
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig, FactoryError> {
        Ok(ExecutorConfig {
            position: PositionManagerConfig {
                initial_capital: self.backtest.initial_capital,
                fees: FeeModel::new(self.backtest.fee_bps, self.backtest.slippage_bps)?,
                lot_size: self.backtest.lot_size,
                exit: self.exit,
            },
            feature_mode: self.backtest.feature_mode,
            verify_parity: self.backtest.verify_parity,
            detect_redundancy: self.backtest.detect_redundancy,
            keep_decisions: self.backtest.keep_decisions,
            context: self.context.clone(),
        })
    }

    /// Copy of this config with one component parameter replaced.
    ///
    /// `component` matches the instance name (the type when unnamed).
    pub fn with_component_param(
        &self,
        component: &str,
        param: &str,
        value: f64,
    ) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        let target = config
            .components
            .iter_mut()
            .find(|c| c.instance_name() == component)
            .ok_or_else(|| ConfigError::Invalid(format!("no component named '{component}'")))?;
        target.params.insert(param.to_string(), value);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelab_core::components::LabelSpelling;

    const SAMPLE: &str = r#"
[backtest]
initial_capital = 25000.0
fee_bps = 5.0
slippage_bps = 2.0
feature_mode = "fast"
detect_redundancy = true

[sizing]
type = "confidence_scaled"
fraction = 0.2
min_confidence = 0.3

[exit]
max_holding_bars = 12
stop_loss_pct = 0.02
exit_on_opposite_signal = true

[context]
native_spelling = "buy_sell"

[context.regime_classifier]
feature = "ema_trend_12_26"
band = 0.001

[[components]]
type = "confidence"
params = { threshold = 0.55 }

[[components]]
type = "regime"
labels = ["bull", "neutral"]

[[components]]
type = "cooldown"
params = { min_bars_between_trades = 6 }
"#;

    #[test]
    fn parses_sample() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.backtest.initial_capital, 25_000.0);
        assert_eq!(config.backtest.feature_mode, FeatureMode::Fast);
        assert!(config.backtest.verify_parity, "defaults survive partial sections");
        assert_eq!(
            config.sizing,
            SizingConfig::ConfidenceScaled {
                fraction: 0.2,
                min_confidence: 0.3
            }
        );
        assert_eq!(config.exit.max_holding_bars, Some(12));
        assert_eq!(config.context.native_spelling, LabelSpelling::BuySell);
        assert_eq!(config.components.len(), 3);
        assert_eq!(config.components[1].labels, vec!["bull", "neutral"]);
        assert_eq!(
            config.components[2].params.get("min_bars_between_trades"),
            Some(&6.0)
        );
    }

    #[test]
    fn executor_config_carries_every_section() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        let exec = config.executor_config().unwrap();
        assert_eq!(exec.position.initial_capital, 25_000.0);
        assert_eq!(exec.position.fees.fee_bps, 5.0);
        assert_eq!(exec.position.exit.stop_loss_pct, Some(0.02));
        assert!(exec.detect_redundancy);
        assert!(exec.context.regime_classifier.is_some());
    }

    #[test]
    fn toml_roundtrip() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        let text = config.to_toml().unwrap();
        let parsed = RunConfig::from_toml(&text).unwrap();
        assert_eq!(config, parsed);
        assert_eq!(config.run_id().unwrap(), parsed.run_id().unwrap());
    }

    #[test]
    fn run_id_sees_parameters() {
        let a = RunConfig::from_toml(SAMPLE).unwrap();
        let b = a.with_component_param("confidence", "threshold", 0.6).unwrap();
        assert_ne!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.pipeline_config().config_hash(), b.pipeline_config().config_hash());
    }

    #[test]
    fn unknown_component_fails_fast() {
        let bad = SAMPLE.replace("type = \"regime\"", "type = \"astrology\"");
        let err = RunConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Component(FactoryError::UnknownComponent(_))));
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let err = RunConfig::from_toml("[backtest]\ninitial_capital = 1000.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Component(FactoryError::EmptyPipeline)));
    }

    #[test]
    fn non_positive_capital_is_rejected() {
        let bad = SAMPLE.replace("initial_capital = 25000.0", "initial_capital = 0.0");
        assert!(matches!(
            RunConfig::from_toml(&bad).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn position_settings_fail_fast() {
        let cases = [
            SAMPLE.replace("fee_bps = 5.0", "fee_bps = -500.0"),
            SAMPLE.replace("fee_bps = 5.0", "fee_bps = 5.0\nlot_size = -1.0"),
            SAMPLE.replace("max_holding_bars = 12", "max_holding_bars = 0"),
            SAMPLE.replace("stop_loss_pct = 0.02", "stop_loss_pct = -0.02"),
        ];
        for bad in cases {
            assert!(matches!(
                RunConfig::from_toml(&bad).unwrap_err(),
                ConfigError::Component(FactoryError::InvalidParam { .. })
            ));
        }
    }

    #[test]
    fn classifier_feature_must_exist() {
        let bad = SAMPLE.replace("ema_trend_12_26", "no_such_feature");
        let err = RunConfig::from_toml(&bad).unwrap_err();
        assert!(err.to_string().contains("no_such_feature"));
    }

    #[test]
    fn with_component_param_rejects_unknown_name() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        assert!(config.with_component_param("expected_value", "min_ev", 0.1).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RunConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
