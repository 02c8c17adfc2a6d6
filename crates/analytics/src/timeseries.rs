//! Calendar-gridded activity series.
//!
//! Converts one entity's trade events into a gap-free series over a date
//! range. Days without trades are present with zero activity.

use chrono::NaiveDate;
use disclosure_core::{AnalyticsError, AnalyticsResult, DateRange, TradeDirection, TradeEvent};
use serde::{Deserialize, Serialize};

/// Uniform-grid activity series for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTimeSeries {
    pub entity_id: String,
    /// Width of each bucket in days
    pub bucket_days: u32,
    /// First day of each bucket
    pub dates: Vec<NaiveDate>,
    /// Trades per bucket
    pub trade_count: Vec<f64>,
    /// Sum of notional midpoints per bucket (USD)
    pub notional: Vec<f64>,
    /// (buys - sells) / (buys + sells) per bucket, 0 when neither occurred
    pub buy_sell_ratio: Vec<f64>,
}

impl EntityTimeSeries {
    /// Builds a daily series directly from activity values.
    ///
    /// Notional and buy/sell balance are zero. Used for synthetic series and
    /// for callers that already hold a gridded activity measure.
    #[must_use]
    pub fn from_activity(entity_id: impl Into<String>, start: NaiveDate, activity: Vec<f64>) -> Self {
        let dates = (0..activity.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        let n = activity.len();
        Self {
            entity_id: entity_id.into(),
            bucket_days: 1,
            dates,
            trade_count: activity,
            notional: vec![0.0; n],
            buy_sell_ratio: vec![0.0; n],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trade_count.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trade_count.is_empty()
    }

    /// Activity measure analysed by the models (trade counts).
    #[must_use]
    pub fn activity(&self) -> &[f64] {
        &self.trade_count
    }

    /// Number of buckets with at least one trade.
    #[must_use]
    pub fn active_days(&self) -> usize {
        self.trade_count.iter().filter(|v| **v > 0.0).count()
    }

    /// Total trades in the series.
    #[must_use]
    pub fn total_trades(&self) -> f64 {
        self.trade_count.iter().sum()
    }

    /// Mean activity over the trailing `window` buckets (whole series if shorter).
    ///
    /// This is the entity's own activity scale, used to normalise thresholds.
    #[must_use]
    pub fn trailing_mean(&self, window: usize) -> f64 {
        let n = self.len();
        if n == 0 {
            return 0.0;
        }
        let start = n.saturating_sub(window.max(1));
        disclosure_core::stats::mean(&self.trade_count[start..])
    }

    #[must_use]
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.dates.get(index).copied()
    }

    #[must_use]
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    #[must_use]
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Builds `EntityTimeSeries` from trade events.
#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesBuilder {
    bucket_days: u32,
}

impl Default for TimeSeriesBuilder {
    fn default() -> Self {
        Self { bucket_days: 1 }
    }
}

impl TimeSeriesBuilder {
    /// Creates a builder with the given bucket width.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for a zero bucket width.
    pub fn new(bucket_days: u32) -> AnalyticsResult<Self> {
        if bucket_days == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "bucket size must be at least 1 day".to_string(),
            ));
        }
        Ok(Self { bucket_days })
    }

    #[must_use]
    pub const fn bucket_days(&self) -> u32 {
        self.bucket_days
    }

    /// Grids `events` over `range`.
    ///
    /// Events for other entities or outside the range are ignored.
    ///
    /// # Errors
    /// Returns `InsufficientData` when the range contains zero days.
    pub fn build(
        &self,
        entity_id: &str,
        events: &[TradeEvent],
        range: DateRange,
    ) -> AnalyticsResult<EntityTimeSeries> {
        let num_days = range.num_days();
        if num_days <= 0 {
            return Err(AnalyticsError::insufficient("time_series", 1, 0));
        }

        let bucket = i64::from(self.bucket_days);
        let n_buckets = ((num_days + bucket - 1) / bucket) as usize;

        let dates: Vec<NaiveDate> = (0..n_buckets)
            .map(|i| range.start + chrono::Duration::days(i as i64 * bucket))
            .collect();
        let mut trade_count = vec![0.0; n_buckets];
        let mut notional = vec![0.0; n_buckets];
        let mut buys = vec![0.0_f64; n_buckets];
        let mut sells = vec![0.0_f64; n_buckets];

        for event in events
            .iter()
            .filter(|e| e.entity_id == entity_id && range.contains(e.date))
        {
            let idx = ((event.date - range.start).num_days() / bucket) as usize;
            trade_count[idx] += 1.0;
            notional[idx] += event.notional.midpoint_f64();
            match event.direction {
                TradeDirection::Buy => buys[idx] += 1.0,
                TradeDirection::Sell => sells[idx] += 1.0,
                TradeDirection::Exchange => {}
            }
        }

        let buy_sell_ratio = buys
            .iter()
            .zip(&sells)
            .map(|(b, s)| {
                let total = b + s;
                if total > 0.0 {
                    (b - s) / total
                } else {
                    0.0
                }
            })
            .collect();

        Ok(EntityTimeSeries {
            entity_id: entity_id.to_string(),
            bucket_days: self.bucket_days,
            dates,
            trade_count,
            notional,
            buy_sell_ratio,
        })
    }
}
