use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Writer};
use disclosure_core::{EntityMetadata, NotionalRange, TradeDirection, TradeEvent};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

pub struct CsvStorage;

#[derive(Debug, Deserialize)]
struct TradeRow {
    entity_id: String,
    ticker: String,
    date: String,
    direction: String,
    notional_low: String,
    notional_high: String,
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    entity_id: String,
    name: String,
    #[serde(default)]
    surname: Option<String>,
    #[serde(default)]
    party: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl CsvStorage {
    /// Reads disclosed trade events from CSV.
    ///
    /// Format: entity_id,ticker,date,direction,notional_low,notional_high
    /// with `date` as YYYY-MM-DD. Rows with an unrecognised direction are
    /// skipped with a warning; malformed dates or amounts are errors.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a row is malformed
    pub fn read_trades(path: impl AsRef<Path>) -> Result<Vec<TradeEvent>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open trades CSV: {}", path.display()))?;
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut events = Vec::new();
        for (line, row) in reader.deserialize::<TradeRow>().enumerate() {
            let row = row.with_context(|| format!("Malformed trade row {}", line + 2))?;

            let Some(direction) = TradeDirection::parse(&row.direction) else {
                tracing::warn!(
                    row = line + 2,
                    direction = %row.direction,
                    "Skipping trade with unrecognised direction"
                );
                continue;
            };

            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}' on row {}", row.date, line + 2))?;
            let low = parse_amount(&row.notional_low)
                .with_context(|| format!("Invalid notional_low on row {}", line + 2))?;
            let high = parse_amount(&row.notional_high)
                .with_context(|| format!("Invalid notional_high on row {}", line + 2))?;

            events.push(TradeEvent::new(
                row.entity_id,
                row.ticker,
                date,
                direction,
                NotionalRange::new(low, high),
            ));
        }

        events.sort_by(|a, b| a.date.cmp(&b.date));
        tracing::debug!(path = %path.display(), count = events.len(), "Loaded trade events");
        Ok(events)
    }

    /// Writes trade events to CSV in the format accepted by `read_trades`.
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_trades(path: impl AsRef<Path>, events: &[TradeEvent]) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record([
            "entity_id",
            "ticker",
            "date",
            "direction",
            "notional_low",
            "notional_high",
        ])?;

        let mut sorted = events.to_vec();
        sorted.sort_by(|a, b| a.date.cmp(&b.date));

        for event in sorted {
            writer.write_record(&[
                event.entity_id.clone(),
                event.ticker.clone(),
                event.date.format("%Y-%m-%d").to_string(),
                event.direction.as_str().to_string(),
                event.notional.low.to_string(),
                event.notional.high.to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads entity metadata from CSV.
    ///
    /// Format: entity_id,name,surname,party,state (last three optional/blank).
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a row is malformed
    pub fn read_metadata(path: impl AsRef<Path>) -> Result<Vec<EntityMetadata>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open metadata CSV: {}", path.display()))?;
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<MetadataRow>().enumerate() {
            let row = row.with_context(|| format!("Malformed metadata row {}", line + 2))?;
            records.push(EntityMetadata {
                entity_id: row.entity_id,
                name: row.name,
                surname: non_empty(row.surname),
                party: non_empty(row.party),
                state: non_empty(row.state),
            });
        }

        Ok(records)
    }
}

/// Parses an amount, tolerating "$" and thousands separators.
fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    Decimal::from_str(&cleaned).with_context(|| format!("Not a decimal amount: '{raw}'"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn read_trades_parses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "trades.csv",
            "entity_id,ticker,date,direction,notional_low,notional_high\n\
             P1,MSFT,2024-03-05,Sale (Partial),\"$15,001\",\"$50,000\"\n\
             P1,NVDA,2024-01-10,Purchase,1001,15000\n",
        );

        let events = CsvStorage::read_trades(&path).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ticker, "NVDA");
        assert_eq!(events[0].direction, TradeDirection::Buy);
        assert_eq!(events[1].direction, TradeDirection::Sell);
        assert_eq!(events[1].notional.low, dec!(15001));
        assert_eq!(events[1].notional.high, dec!(50000));
    }

    #[test]
    fn read_trades_skips_unknown_direction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "trades.csv",
            "entity_id,ticker,date,direction,notional_low,notional_high\n\
             P1,AAPL,2024-01-10,gift,1001,15000\n\
             P1,AAPL,2024-01-11,buy,1001,15000\n",
        );

        let events = CsvStorage::read_trades(&path).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn read_trades_rejects_bad_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "trades.csv",
            "entity_id,ticker,date,direction,notional_low,notional_high\n\
             P1,AAPL,01/10/2024,buy,1001,15000\n",
        );

        let err = CsvStorage::read_trades(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid date"));
    }

    #[test]
    fn write_then_read_preserves_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let events = vec![TradeEvent::new(
            "P2",
            "TSLA",
            NaiveDate::from_ymd_opt(2023, 7, 4).unwrap(),
            TradeDirection::Exchange,
            NotionalRange::new(dec!(250001), dec!(500000)),
        )];

        CsvStorage::write_trades(&path, &events).unwrap();
        let loaded = CsvStorage::read_trades(&path).unwrap();

        assert_eq!(loaded, events);
    }

    #[test]
    fn read_metadata_treats_blank_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "meta.csv",
            "entity_id,name,surname,party,state\n\
             P1,Jordan Smith,Smith,D,CA\n\
             P2,Alex Doe,,R,\n",
        );

        let records = CsvStorage::read_metadata(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].surname.as_deref(), Some("Smith"));
        assert_eq!(records[1].surname, None);
        assert_eq!(records[1].party.as_deref(), Some("R"));
        assert_eq!(records[1].state, None);
    }
}
