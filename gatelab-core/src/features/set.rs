//! Feature sets and the feature factory.

use std::collections::BTreeSet;

use crate::components::FactoryError;
use crate::fingerprint::ComponentConfig;

use super::{AtrPct, EmaTrend, Feature, Return, Rsi, SmaRatio, Volatility};

/// Validate an integer period parameter.
pub(crate) fn check_period(
    feature: &str,
    param: &str,
    period: usize,
    min: usize,
) -> Result<(), FactoryError> {
    if period < min {
        return Err(FactoryError::InvalidParam {
            component: feature.into(),
            param: param.into(),
            value: period as f64,
            expected: if min <= 1 {
                "an integer period >= 1"
            } else {
                "an integer period >= 2"
            },
        });
    }
    Ok(())
}

fn period_param(config: &ComponentConfig, name: &str, default: usize) -> Result<usize, FactoryError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(FactoryError::InvalidParam {
            component: config.component_type.clone(),
            param: name.into(),
            value: v,
            expected: "a whole number of bars",
        }),
    }
}

fn check_params(config: &ComponentConfig, known: &[&str]) -> Result<(), FactoryError> {
    if let Some(unknown) = config.params.keys().find(|k| !known.contains(&k.as_str())) {
        return Err(FactoryError::UnknownParam {
            component: config.component_type.clone(),
            param: unknown.clone(),
        });
    }
    Ok(())
}

/// Create a feature from a `ComponentConfig` (`type` + integer `params`).
pub fn create_feature(config: &ComponentConfig) -> Result<Box<dyn Feature>, FactoryError> {
    match config.component_type.as_str() {
        Return::TYPE => {
            check_params(config, &["period"])?;
            Ok(Box::new(Return::new(period_param(config, "period", 1)?)?))
        }
        SmaRatio::TYPE => {
            check_params(config, &["period"])?;
            Ok(Box::new(SmaRatio::new(period_param(config, "period", 20)?)?))
        }
        EmaTrend::TYPE => {
            check_params(config, &["fast", "slow"])?;
            let fast = period_param(config, "fast", 12)?;
            let slow = period_param(config, "slow", 26)?;
            Ok(Box::new(EmaTrend::new(fast, slow)?))
        }
        Rsi::TYPE => {
            check_params(config, &["period"])?;
            Ok(Box::new(Rsi::new(period_param(config, "period", 14)?)?))
        }
        AtrPct::TYPE => {
            check_params(config, &["period"])?;
            Ok(Box::new(AtrPct::new(period_param(config, "period", 14)?)?))
        }
        Volatility::TYPE => {
            check_params(config, &["period"])?;
            Ok(Box::new(Volatility::new(period_param(config, "period", 20)?)?))
        }
        other => Err(FactoryError::UnknownFeature(other.to_string())),
    }
}

/// An ordered, name-unique collection of features computed together.
pub struct FeatureSet {
    features: Vec<Box<dyn Feature>>,
}

impl std::fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FeatureSet {
    pub fn new(features: Vec<Box<dyn Feature>>) -> Result<Self, FactoryError> {
        let mut seen = BTreeSet::new();
        for feature in &features {
            if !seen.insert(feature.name().to_string()) {
                return Err(FactoryError::DuplicateComponent(feature.name().to_string()));
            }
        }
        Ok(Self { features })
    }

    pub fn from_configs(configs: &[ComponentConfig]) -> Result<Self, FactoryError> {
        let features = configs
            .iter()
            .map(create_feature)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(features)
    }

    /// return_1, sma_ratio_20, ema_trend_12_26, rsi_14, atr_pct_14, volatility_20.
    pub fn standard() -> Self {
        let features: Vec<Box<dyn Feature>> = vec![
            Box::new(Return { period: 1, name: "return_1".into() }),
            Box::new(SmaRatio { period: 20, name: "sma_ratio_20".into() }),
            Box::new(EmaTrend { fast: 12, slow: 26, name: "ema_trend_12_26".into() }),
            Box::new(Rsi { period: 14, name: "rsi_14".into() }),
            Box::new(AtrPct { period: 14, name: "atr_pct_14".into() }),
            Box::new(Volatility { period: 20, name: "volatility_20".into() }),
        ];
        Self { features }
    }

    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// Bars that must close before every feature is defined.
    pub fn warmup(&self) -> usize {
        self.features.iter().map(|f| f.lookback()).max().unwrap_or(0)
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Feature> {
        self.features.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_names_and_warmup() {
        let set = FeatureSet::standard();
        assert_eq!(
            set.names(),
            vec![
                "return_1",
                "sma_ratio_20",
                "ema_trend_12_26",
                "rsi_14",
                "atr_pct_14",
                "volatility_20"
            ]
        );
        assert_eq!(set.warmup(), 25);
    }

    #[test]
    fn factory_builds_named_features() {
        let f = create_feature(&ComponentConfig::new("ema_trend").with_param("fast", 5.0).with_param("slow", 20.0))
            .unwrap();
        assert_eq!(f.name(), "ema_trend_5_20");
        assert_eq!(f.lookback(), 19);
    }

    #[test]
    fn factory_defaults() {
        let f = create_feature(&ComponentConfig::new("rsi")).unwrap();
        assert_eq!(f.name(), "rsi_14");
    }

    #[test]
    fn factory_rejects_fractional_period() {
        let err = create_feature(&ComponentConfig::new("rsi").with_param("period", 2.5)).err().unwrap();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn factory_rejects_unknown_feature() {
        let err = create_feature(&ComponentConfig::new("macd")).err().unwrap();
        assert_eq!(err, FactoryError::UnknownFeature("macd".into()));
    }

    #[test]
    fn duplicate_feature_names_rejected() {
        let configs = vec![
            ComponentConfig::new("rsi").with_param("period", 14.0),
            ComponentConfig::new("rsi"),
        ];
        let err = FeatureSet::from_configs(&configs).unwrap_err();
        assert_eq!(err, FactoryError::DuplicateComponent("rsi_14".into()));
    }

    #[test]
    fn empty_set_has_zero_warmup() {
        assert_eq!(FeatureSet::empty().warmup(), 0);
    }
}
