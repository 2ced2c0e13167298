//! Factory system: converts `ComponentConfig` into runtime trait objects.
//!
//! Validation is fail-fast: unknown types, unknown or missing parameters and
//! out-of-range values are rejected here, before any bar is processed.

use crate::fingerprint::ComponentConfig;

use super::confidence::ConfidenceGate;
use super::cooldown::CooldownGate;
use super::expected_value::ExpectedValueGate;
use super::regime::RegimeGate;
use super::StrategyComponent;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during component or pipeline construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown component type: {0}")]
    UnknownComponent(String),
    #[error("unknown feature type: {0}")]
    UnknownFeature(String),
    #[error("component '{component}' does not take parameter '{param}'")]
    UnknownParam { component: String, param: String },
    #[error("component '{component}' requires parameter '{param}'")]
    MissingParam { component: String, param: String },
    #[error("component '{component}': parameter '{param}' = {value} (expected {expected})")]
    InvalidParam {
        component: String,
        param: String,
        value: f64,
        expected: &'static str,
    },
    #[error("component '{component}' requires a non-empty label list")]
    MissingLabels { component: String },
    #[error("pipeline has no components")]
    EmptyPipeline,
    #[error("duplicate component name: {0}")]
    DuplicateComponent(String),
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Reject any parameter the component does not understand.
fn check_params(config: &ComponentConfig, known: &[&str]) -> Result<(), FactoryError> {
    if let Some(unknown) = config.params.keys().find(|k| !known.contains(&k.as_str())) {
        return Err(FactoryError::UnknownParam {
            component: config.component_type.clone(),
            param: unknown.clone(),
        });
    }
    Ok(())
}

fn reject_labels(config: &ComponentConfig) -> Result<(), FactoryError> {
    if config.labels.is_empty() {
        Ok(())
    } else {
        Err(FactoryError::UnknownParam {
            component: config.component_type.clone(),
            param: "labels".into(),
        })
    }
}

/// Extract a named f64 parameter from a `ComponentConfig`, falling back to `default`.
fn param(config: &ComponentConfig, name: &str, default: f64) -> f64 {
    config.params.get(name).copied().unwrap_or(default)
}

/// Extract a parameter that has no sensible default.
fn required(config: &ComponentConfig, name: &str) -> Result<f64, FactoryError> {
    config
        .params
        .get(name)
        .copied()
        .ok_or_else(|| FactoryError::MissingParam {
            component: config.component_type.clone(),
            param: name.into(),
        })
}

// ─── Component factory ───────────────────────────────────────────────

/// Create a gating component from a `ComponentConfig`.
pub fn create_component(
    config: &ComponentConfig,
) -> Result<Box<dyn StrategyComponent>, FactoryError> {
    let name = config.instance_name().to_string();
    match config.component_type.as_str() {
        ConfidenceGate::TYPE => {
            check_params(config, &["threshold"])?;
            reject_labels(config)?;
            let threshold = required(config, "threshold")?;
            Ok(Box::new(ConfidenceGate::new(threshold)?.with_name(name)))
        }
        RegimeGate::TYPE => {
            check_params(config, &[])?;
            Ok(Box::new(RegimeGate::new(&config.labels)?.with_name(name)))
        }
        ExpectedValueGate::TYPE => {
            check_params(config, &["min_ev", "reward_risk"])?;
            reject_labels(config)?;
            let min_ev = required(config, "min_ev")?;
            let reward_risk = param(config, "reward_risk", ExpectedValueGate::DEFAULT_REWARD_RISK);
            Ok(Box::new(
                ExpectedValueGate::new(min_ev, reward_risk)?.with_name(name),
            ))
        }
        CooldownGate::TYPE => {
            check_params(config, &["min_bars_between_trades"])?;
            reject_labels(config)?;
            let min_bars = required(config, "min_bars_between_trades")?;
            Ok(Box::new(CooldownGate::from_param(min_bars)?.with_name(name)))
        }
        other => Err(FactoryError::UnknownComponent(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::EvaluationContext;
    use crate::components::Probabilities;

    #[test]
    fn creates_confidence_gate() {
        let c = create_component(&ComponentConfig::new("confidence").with_param("threshold", 0.6))
            .unwrap();
        assert_eq!(c.name(), "confidence");
        let ctx = EvaluationContext::new("BTC", 0, Probabilities::normalized(0.7, 0.3));
        assert!(c.evaluate(&ctx).allowed());
    }

    #[test]
    fn creates_regime_gate_from_labels() {
        let c = create_component(&ComponentConfig::new("regime").with_labels(["bull", "neutral"]))
            .unwrap();
        assert!(c.needs_regime());
        let ctx = EvaluationContext::new("BTC", 0, None).with_regime("neutral");
        assert!(c.evaluate(&ctx).allowed());
    }

    #[test]
    fn creates_ev_gate_with_default_reward_risk() {
        let c = create_component(&ComponentConfig::new("expected_value").with_param("min_ev", 0.1))
            .unwrap();
        assert_eq!(c.name(), "expected_value");
    }

    #[test]
    fn creates_cooldown_gate() {
        let c = create_component(
            &ComponentConfig::new("cooldown").with_param("min_bars_between_trades", 24.0),
        )
        .unwrap();
        assert_eq!(c.state_snapshot(), Some(Default::default()));
    }

    #[test]
    fn instance_name_overrides_type() {
        let c = create_component(
            &ComponentConfig::new("confidence")
                .with_param("threshold", 0.5)
                .named("conf_loose"),
        )
        .unwrap();
        assert_eq!(c.name(), "conf_loose");
    }

    #[test]
    fn unknown_component_returns_error() {
        let err = create_component(&ComponentConfig::new("martingale")).err().unwrap();
        assert_eq!(err, FactoryError::UnknownComponent("martingale".into()));
    }

    #[test]
    fn unknown_param_returns_error() {
        let err = create_component(
            &ComponentConfig::new("confidence")
                .with_param("threshold", 0.5)
                .with_param("treshold", 0.6),
        )
        .err().unwrap();
        assert!(matches!(err, FactoryError::UnknownParam { param, .. } if param == "treshold"));
    }

    #[test]
    fn missing_param_returns_error() {
        let err = create_component(&ComponentConfig::new("cooldown")).err().unwrap();
        assert!(matches!(err, FactoryError::MissingParam { .. }));
    }

    #[test]
    fn out_of_range_param_returns_error() {
        let err = create_component(&ComponentConfig::new("confidence").with_param("threshold", 1.5))
            .err().unwrap();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));

        let err = create_component(&ComponentConfig::new("confidence").with_param("threshold", f64::NAN))
            .err().unwrap();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn regime_without_labels_returns_error() {
        let err = create_component(&ComponentConfig::new("regime")).err().unwrap();
        assert!(matches!(err, FactoryError::MissingLabels { .. }));
    }

    #[test]
    fn labels_on_numeric_gate_return_error() {
        let err = create_component(
            &ComponentConfig::new("confidence")
                .with_param("threshold", 0.5)
                .with_labels(["bull"]),
        )
        .err().unwrap();
        assert!(matches!(err, FactoryError::UnknownParam { param, .. } if param == "labels"));
    }
}
