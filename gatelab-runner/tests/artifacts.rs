//! Artifact export tests: write to a temp dir, read back, compare.

use tempfile::TempDir;

use gatelab_core::fingerprint::ComponentConfig;
use gatelab_runner::export::{
    export_json, export_trades_csv, import_json, load_result, save_artifacts,
};
use gatelab_runner::{run_from_config, BacktestResult, RunConfig, SyntheticConfig, SCHEMA_VERSION};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn result() -> BacktestResult {
    let mut config = RunConfig {
        components: vec![
            ComponentConfig::new("confidence").with_param("threshold", 0.6),
            ComponentConfig::new("cooldown").with_param("min_bars_between_trades", 5.0),
        ],
        market: Some(SyntheticConfig {
            bars: 200,
            ..SyntheticConfig::default()
        }),
        ..RunConfig::default()
    };
    config.exit.max_holding_bars = Some(5);
    config.backtest.fee_bps = 5.0;
    run_from_config(&config).unwrap()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let result = result();
    let run_dir = save_artifacts(&result, dir.path()).unwrap();

    for name in ["result.json", "trades.csv", "equity.csv", "attribution.json"] {
        assert!(run_dir.join(name).exists(), "{name} missing");
    }
    let loaded = load_result(&run_dir).unwrap();
    assert_eq!(loaded, result);
}

#[test]
fn artifact_dir_is_content_addressed() {
    let dir = TempDir::new().unwrap();
    let result = result();
    let first = save_artifacts(&result, dir.path()).unwrap();
    let second = save_artifacts(&result, dir.path()).unwrap();
    assert_eq!(first, second);
    assert!(first
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("run_") && result.run_id.starts_with(&n[4..])));
}

#[test]
fn trades_csv_has_one_row_per_trade() {
    let result = result();
    assert!(!result.trades.is_empty(), "scenario should trade");
    let csv = export_trades_csv(&result.trades).unwrap();

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[2], "symbol");
    assert_eq!(&headers[11], "exit_reason");

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), result.trades.len());
    for (row, trade) in rows.iter().zip(&result.trades) {
        assert_eq!(&row[2], trade.symbol);
        assert_eq!(row[4].parse::<usize>().unwrap(), trade.entry_bar);
        assert_eq!(&row[11], trade.exit_reason.to_string());
    }
}

#[test]
fn newer_schema_is_rejected() {
    let mut result = result();
    result.schema_version = SCHEMA_VERSION + 1;
    let json = export_json(&result).unwrap();
    let err = import_json(&json).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn missing_schema_version_defaults_to_current() {
    let result = result();
    let mut value: serde_json::Value = serde_json::from_str(&export_json(&result).unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("schema_version");
    let loaded = import_json(&value.to_string()).unwrap();
    assert_eq!(loaded.schema_version, SCHEMA_VERSION);
}
