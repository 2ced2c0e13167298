//! End-to-end runs driven by TOML config files.

use std::io::Write;

use gatelab_core::pipeline::RedundancyKind;
use gatelab_runner::{run_from_config, ConfigError, RunConfig, RunError};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const FULL: &str = r#"
[backtest]
initial_capital = 10000.0
fee_bps = 5.0
slippage_bps = 2.0
feature_mode = "fast"
verify_parity = true
detect_redundancy = true

[sizing]
type = "equity_fraction"
fraction = 0.1

[exit]
max_holding_bars = 12
stop_loss_pct = 0.02
take_profit_pct = 0.04
exit_on_opposite_signal = true

[context]
native_spelling = "long_short"
required_features = ["rsi_14"]

[[components]]
type = "confidence"
params = { threshold = 0.55 }

[[components]]
type = "confidence"
name = "strict_confidence"
params = { threshold = 0.65 }

[[components]]
type = "expected_value"
params = { min_ev = 0.05 }

[[components]]
type = "regime"
labels = ["bull", "bear"]

[[components]]
type = "cooldown"
params = { min_bars_between_trades = 6 }

[market]
seed = 7
symbols = ["BTC", "ETH"]
bars = 300
regime_length = 40
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn full_config_runs_end_to_end() {
    let file = write_config(FULL);
    let config = RunConfig::load(file.path()).unwrap();
    let result = run_from_config(&config).unwrap();

    assert_eq!(result.symbols, vec!["BTC", "ETH"]);
    assert_eq!(result.parity.len(), 2);
    assert!(result.parity.values().all(|r| r.is_clean()));
    assert_eq!(result.attribution.components.len(), 5);
    assert_eq!(result.attribution.components[1].name, "strict_confidence");
    assert_eq!(result.hook_audit.executions_recorded as u64, result.stats.executed);
    assert_eq!(result.trades.len() as u64, result.stats.executed);
}

#[test]
fn nested_thresholds_are_flagged_redundant() {
    let config = RunConfig::from_toml(FULL).unwrap();
    let result = run_from_config(&config).unwrap();
    let report = result.redundancy.unwrap();

    // Every bar the loose gate blocks, the strict gate blocks too.
    let finding = report
        .findings
        .iter()
        .find(|f| {
            let pair = [f.gate.as_str(), f.dominated_by.as_str()];
            pair.contains(&"confidence") && pair.contains(&"strict_confidence")
        })
        .expect("nested confidence gates should be reported");
    if finding.kind == RedundancyKind::Subsumed {
        assert_eq!(finding.gate, "confidence");
        assert_eq!(finding.dominated_by, "strict_confidence");
    }
}

#[test]
fn loose_gate_never_vetoes_behind_strict_gate() {
    // With the strict gate second, the loose gate always vetoes first on
    // shared bars, so the strict gate only vetoes bars in (0.55, 0.65].
    let result = run_from_config(&RunConfig::from_toml(FULL).unwrap()).unwrap();
    let loose = result.attribution.component("confidence").unwrap();
    let strict = result.attribution.component("strict_confidence").unwrap();
    assert_eq!(strict.evaluations, loose.evaluations - loose.vetoes);
}

#[test]
fn modes_agree_through_config() {
    let fast = run_from_config(&RunConfig::from_toml(FULL).unwrap()).unwrap();
    let live_toml = FULL.replace("feature_mode = \"fast\"", "feature_mode = \"live\"");
    let live = run_from_config(&RunConfig::from_toml(&live_toml).unwrap()).unwrap();

    assert_eq!(fast.ledger_hash, live.ledger_hash);
    assert_eq!(fast.attribution, live.attribution);
    assert_ne!(fast.run_id, live.run_id, "mode is part of the run config");
}

#[test]
fn duplicate_component_names_fail_fast() {
    let bad = FULL.replace("name = \"strict_confidence\"\n", "");
    let err = RunConfig::from_toml(&bad).unwrap_err();
    assert!(err.to_string().contains("duplicate component name"));
}

#[test]
fn run_without_market_section_is_rejected() {
    let no_market = FULL.split("[market]").next().unwrap();
    let config = RunConfig::from_toml(no_market).unwrap();
    assert!(matches!(run_from_config(&config), Err(RunError::NoMarket)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = RunConfig::from_toml("[backtest\ninitial_capital = ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
