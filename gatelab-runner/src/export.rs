//! Reporting and export: JSON and CSV artifacts.
//!
//! - **JSON**: full round-trip serialization of `BacktestResult` with schema versioning
//! - **CSV**: trade ledger and equity curve for external analysis tools
//! - **Attribution JSON**: per-gate veto and confidence statistics on their own
//!
//! Persisted results carry a `schema_version`. Newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use gatelab_core::domain::TradeRecord;
use gatelab_core::pipeline::AttributionSnapshot;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

pub fn export_attribution_json(attribution: &AttributionSnapshot) -> Result<String> {
    serde_json::to_string_pretty(attribution).context("failed to serialize attribution to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade ledger as CSV, one row per closed trade.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "trade_id",
        "signal_id",
        "symbol",
        "side",
        "entry_bar",
        "entry_time",
        "entry_price",
        "entry_confidence",
        "exit_bar",
        "exit_time",
        "exit_price",
        "exit_reason",
        "quantity",
        "gross_pnl",
        "fees",
        "net_pnl",
        "bars_held",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.trade_id.0.to_string(),
            &t.signal_id.0.to_string(),
            &t.symbol,
            &format!("{:?}", t.side),
            &t.entry_bar.to_string(),
            &t.entry_time.to_string(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.4}", t.entry_confidence),
            &t.exit_bar.to_string(),
            &t.exit_time.to_string(),
            &format!("{:.6}", t.exit_price),
            &t.exit_reason.to_string(),
            &format!("{:.6}", t.quantity),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.fees),
            &format!("{:.2}", t.net_pnl),
            &t.bars_held.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export an equity curve as CSV with bar_index and equity columns.
pub fn export_equity_csv(equity_curve: &[f64]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "equity"])?;
    for (i, eq) in equity_curve.iter().enumerate() {
        wtr.write_record([&i.to_string(), &format!("{:.2}", eq)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates `run_{first 12 hex of run_id}/` under `output_dir` containing:
/// - `result.json`: the full `BacktestResult`
/// - `trades.csv`: the trade ledger
/// - `equity.csv`: bar-by-bar equity
/// - `attribution.json`: per-gate attribution
///
/// The directory name is content-addressed, so rerunning a config overwrites
/// its own artifacts. Returns the path to the directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("run_{short_id}"));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("result.json", export_json(result)?),
        ("trades.csv", export_trades_csv(&result.trades)?),
        ("equity.csv", export_equity_csv(&result.equity_curve)?),
        ("attribution.json", export_attribution_json(&result.attribution)?),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a result saved by [`save_artifacts`].
pub fn load_result(run_dir: &Path) -> Result<BacktestResult> {
    let path = run_dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equity_csv_has_header_and_rows() {
        let csv = export_equity_csv(&[100.0, 101.5]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["bar_index,equity", "0,100.00", "1,101.50"]);
    }

    #[test]
    fn empty_ledger_is_header_only() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("trade_id,signal_id,symbol,side"));
    }

    #[test]
    fn attribution_json_exposes_counters() {
        let json = export_attribution_json(&AttributionSnapshot::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["decisions"], 0);
        assert!(value["components"].as_array().unwrap().is_empty());
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(import_json("{ not json").is_err());
    }
}
