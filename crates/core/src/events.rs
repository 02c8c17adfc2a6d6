//! Disclosed trade events and entity metadata.
//!
//! These are the read-only inputs handed to the analytics core by the
//! ingestion side. Nothing in this workspace mutates a `TradeEvent` once
//! it has been created.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a disclosed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
    Exchange,
}

impl TradeDirection {
    /// Parses a direction from common disclosure spellings.
    ///
    /// Accepts "buy"/"purchase", "sell"/"sale"/"sale (partial)"/"sale (full)"
    /// and "exchange", case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "buy" | "purchase" | "p" => Some(Self::Buy),
            "exchange" | "e" => Some(Self::Exchange),
            _ if lower.starts_with("sale") || lower == "sell" || lower == "s" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Exchange => "exchange",
        }
    }
}

/// Disclosed notional range of a transaction (e.g. $1,001 - $15,000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionalRange {
    /// Lower bound in USD
    pub low: Decimal,
    /// Upper bound in USD
    pub high: Decimal,
}

impl NotionalRange {
    /// Creates a range, swapping the bounds if given in reverse order.
    #[must_use]
    pub fn new(low: Decimal, high: Decimal) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self { low: high, high: low }
        }
    }

    /// Midpoint of the range in USD.
    #[must_use]
    pub fn midpoint(&self) -> Decimal {
        (self.low + self.high) / Decimal::TWO
    }

    /// Midpoint as `f64` for numeric work.
    #[must_use]
    pub fn midpoint_f64(&self) -> f64 {
        self.midpoint().to_f64().unwrap_or(0.0)
    }
}

/// One disclosed transaction by one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Identifier of the disclosing official
    pub entity_id: String,
    /// Ticker symbol traded
    pub ticker: String,
    /// Transaction date
    pub date: NaiveDate,
    /// Buy, sell, or exchange
    pub direction: TradeDirection,
    /// Disclosed notional range
    pub notional: NotionalRange,
}

impl TradeEvent {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        ticker: impl Into<String>,
        date: NaiveDate,
        direction: TradeDirection,
        notional: NotionalRange,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            ticker: ticker.into(),
            date,
            direction,
            notional,
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range of `days` days ending on (and including) `end`.
    #[must_use]
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - chrono::Duration::days(span),
            end,
        }
    }

    /// Number of calendar days in the range; zero when `end < start`.
    #[must_use]
    pub fn num_days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    /// Returns true if the date falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Party/family/state metadata for an entity.
///
/// Only used for labeling correlation edges and clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity_id: String,
    /// Display name
    pub name: String,
    /// Family name used for the "family" edge heuristic
    pub surname: Option<String>,
    pub party: Option<String>,
    pub state: Option<String>,
}

impl EntityMetadata {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_surname(mut self, surname: impl Into<String>) -> Self {
        self.surname = Some(surname.into());
        self
    }

    #[must_use]
    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.party = Some(party.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_parses_disclosure_spellings() {
        assert_eq!(TradeDirection::parse("Purchase"), Some(TradeDirection::Buy));
        assert_eq!(TradeDirection::parse("sale (partial)"), Some(TradeDirection::Sell));
        assert_eq!(TradeDirection::parse("Sale (Full)"), Some(TradeDirection::Sell));
        assert_eq!(TradeDirection::parse("exchange"), Some(TradeDirection::Exchange));
        assert_eq!(TradeDirection::parse("gift"), None);
    }

    #[test]
    fn notional_range_midpoint() {
        let range = NotionalRange::new(dec!(1001), dec!(15000));
        assert_eq!(range.midpoint(), dec!(8000.5));
        assert!((range.midpoint_f64() - 8000.5).abs() < 1e-9);
    }

    #[test]
    fn notional_range_swaps_reversed_bounds() {
        let range = NotionalRange::new(dec!(50000), dec!(15001));
        assert_eq!(range.low, dec!(15001));
        assert_eq!(range.high, dec!(50000));
    }

    #[test]
    fn date_range_counts_inclusive_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(DateRange::new(start, end).num_days(), 31);
        assert_eq!(DateRange::new(end, start).num_days(), 0);
    }

    #[test]
    fn date_range_ending_at_spans_requested_days() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = DateRange::ending_at(end, 10);
        assert_eq!(range.num_days(), 10);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn trade_event_serializes_direction_lowercase() {
        let event = TradeEvent::new(
            "P000001",
            "NVDA",
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            TradeDirection::Buy,
            NotionalRange::new(dec!(1001), dec!(15000)),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"buy\""));
    }
}
