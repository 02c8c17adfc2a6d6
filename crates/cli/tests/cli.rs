use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;

// ============================================
// Fixtures
// ============================================

/// P1 trades every Monday, P2 every other Wednesday, over twenty weeks.
fn write_fixture(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut trades = String::from("entity_id,ticker,date,direction,notional_low,notional_high\n");
    for week in 0..20 {
        let monday = start + Duration::weeks(week);
        trades.push_str(&format!("P1,AAPL,{monday},purchase,1001,15000\n"));
        if week % 2 == 0 {
            let wednesday = monday + Duration::days(2);
            trades.push_str(&format!("P2,MSFT,{wednesday},sale (partial),15001,50000\n"));
        }
    }
    let trades_path = dir.join("trades.csv");
    std::fs::write(&trades_path, trades).unwrap();

    let metadata_path = dir.join("metadata.csv");
    std::fs::write(
        &metadata_path,
        "entity_id,name,surname,party,state\nP1,Ada,Lovelace,I,NY\nP2,Alan,Turing,,\n",
    )
    .unwrap();

    let config_path = dir.join("Config.toml");
    std::fs::write(
        &config_path,
        "[time_series]\nlookback_days = 150\n\n[analog]\nwindow_size = 14\ncooldown = 14\n",
    )
    .unwrap();

    (trades_path, metadata_path, config_path)
}

fn run(dir: &TempDir, args: &[&str]) -> Output {
    let (trades, metadata, config) = write_fixture(dir.path());
    Command::new(env!("CARGO_BIN_EXE_disclosure-analytics"))
        .args(args)
        .arg("--trades")
        .arg(&trades)
        .arg("--metadata")
        .arg(&metadata)
        .arg("--config")
        .arg(&config)
        .env_remove("DISCLOSURE_TRADES")
        .env_remove("DISCLOSURE_METADATA")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to launch binary")
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

// ============================================
// Commands
// ============================================

#[test]
fn time_series_covers_the_lookback_window() {
    let dir = TempDir::new().unwrap();
    let value = json(&run(&dir, &["time-series", "P1", "--format", "json"]));

    // Latest trade is the Monday of week 19; lookback is 150 days inclusive
    assert_eq!(value["entity_id"], "P1");
    assert_eq!(value["dates"].as_array().unwrap().len(), 150);
    let total: f64 = value["trade_count"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((total - 20.0).abs() < 1e-9);
}

#[test]
fn unknown_entity_prediction_is_insufficient() {
    let dir = TempDir::new().unwrap();
    let value = json(&run(&dir, &["predict", "NOBODY", "--format", "json"]));

    assert_eq!(value["prediction_type"], "insufficient_data");
    assert_eq!(value["confidence"].as_f64().unwrap(), 0.0);
}

#[test]
fn report_contains_every_section() {
    let dir = TempDir::new().unwrap();
    let value = json(&run(&dir, &["report", "P1", "--format", "json"]));

    for section in ["cyclical", "regime", "analogs", "prediction", "anomaly", "insights"] {
        assert!(value.get(section).is_some(), "missing section {section}");
    }
    let score = value["anomaly"]["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[test]
fn network_over_all_entities_lists_both() {
    let dir = TempDir::new().unwrap();
    let value = json(&run(&dir, &["network", "--format", "json"]));

    let entities: Vec<&str> = value["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(entities, vec!["P1", "P2"]);
}

#[test]
fn text_output_is_human_readable() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir, &["anomaly", "P1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("P1: anomaly score"));
}

// ============================================
// Failures
// ============================================

#[test]
fn invalid_severity_fails() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir, &["insights", "P1", "--min-severity", "severe"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown severity"));
}

#[test]
fn malformed_as_of_fails() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir, &["cycles", "P1", "--as-of", "yesterday"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("YYYY-MM-DD"));
}

#[test]
fn show_config_reflects_the_file() {
    let dir = TempDir::new().unwrap();
    let (_, _, config) = write_fixture(dir.path());
    let output = Command::new(env!("CARGO_BIN_EXE_disclosure-analytics"))
        .arg("show-config")
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to launch binary");

    let value = json(&output);
    assert_eq!(value["time_series"]["lookback_days"], 150);
    assert_eq!(value["regime"]["n_states"], 4);
}
