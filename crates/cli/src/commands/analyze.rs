//! Single-entity analysis commands.

use anyhow::{Context, Result};
use clap::Args;
use disclosure_analytics::Severity;
use disclosure_core::DateRange;

use super::context::{load, parse_date, DataArgs};
use crate::output::{self, emit};

/// Arguments shared by commands that analyse one entity.
#[derive(Args, Debug, Clone)]
pub struct EntityArgs {
    /// Entity identifier as it appears in the trades CSV
    pub entity: String,

    #[command(flatten)]
    pub data: DataArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TimeSeriesArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// First day (YYYY-MM-DD); defaults to the start of the lookback window
    #[arg(long)]
    pub start: Option<String>,

    /// Bucket width in days; defaults to the configured width
    #[arg(long)]
    pub bucket_days: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalogArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Query window length in buckets
    #[arg(long)]
    pub window: Option<usize>,

    /// Maximum matches to return
    #[arg(long)]
    pub top_k: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Prediction horizon in days
    #[arg(long)]
    pub horizon: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct InsightsArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Minimum insight confidence in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    pub min_confidence: f64,

    /// Minimum severity: info, low, medium, high, critical
    #[arg(long, default_value = "info")]
    pub min_severity: String,

    /// Peer entities whose correlation with this one should be reported
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,
}

pub async fn run_time_series(args: TimeSeriesArgs) -> Result<()> {
    let EntityArgs { entity, data } = args.entity;
    let loaded = load(&data).await?;
    let service = &loaded.service;

    let lookback = service.lookback_range();
    let range = match parse_date(args.start.as_deref())? {
        Some(start) if start > lookback.end => {
            anyhow::bail!("--start {start} is after the analysis date {}", lookback.end)
        }
        Some(start) => DateRange::new(start, lookback.end),
        None => lookback,
    };
    let bucket = args
        .bucket_days
        .unwrap_or(service.config().time_series.bucket_days);

    let series = service
        .get_time_series(&entity, range, bucket)
        .await
        .with_context(|| format!("Failed to build time series for {entity}"))?;
    emit(data.format, series.as_ref(), output::render_time_series)
}

pub async fn run_cycles(args: EntityArgs) -> Result<()> {
    let loaded = load(&args.data).await?;
    let analysis = loaded
        .service
        .get_cyclical_patterns(&args.entity)
        .await
        .with_context(|| format!("Cyclical analysis failed for {}", args.entity))?;
    emit(args.data.format, analysis.as_ref(), output::render_cycles)
}

pub async fn run_regimes(args: EntityArgs) -> Result<()> {
    let loaded = load(&args.data).await?;
    let analysis = loaded
        .service
        .get_regime_analysis(&args.entity)
        .await
        .with_context(|| format!("Regime analysis failed for {}", args.entity))?;
    emit(args.data.format, analysis.as_ref(), output::render_regimes)
}

pub async fn run_analogs(args: AnalogArgs) -> Result<()> {
    let EntityArgs { entity, data } = args.entity;
    let loaded = load(&data).await?;
    let analysis = loaded
        .service
        .get_historical_matches(&entity, args.window, args.top_k)
        .await
        .with_context(|| format!("Analog search failed for {entity}"))?;
    emit(data.format, analysis.as_ref(), output::render_analogs)
}

pub async fn run_predict(args: PredictArgs) -> Result<()> {
    let EntityArgs { entity, data } = args.entity;
    let loaded = load(&data).await?;
    let prediction = loaded
        .service
        .get_ensemble_prediction(&entity, args.horizon)
        .await
        .with_context(|| format!("Prediction failed for {entity}"))?;
    emit(data.format, prediction.as_ref(), output::render_prediction)
}

pub async fn run_anomaly(args: EntityArgs) -> Result<()> {
    let loaded = load(&args.data).await?;
    let report = loaded
        .service
        .get_anomaly_report(&args.entity)
        .await
        .with_context(|| format!("Anomaly scoring failed for {}", args.entity))?;
    emit(args.data.format, report.as_ref(), output::render_anomaly)
}

pub async fn run_insights(args: InsightsArgs) -> Result<()> {
    let min_severity = parse_severity(&args.min_severity)?;
    let EntityArgs { entity, data } = args.entity;
    let loaded = load(&data).await?;

    let peers: Vec<String> = args.peers.into_iter().filter(|p| *p != entity).collect();
    let service = loaded.service.with_peer_group(peers);
    let insights = service
        .get_insights(&entity, args.min_confidence, min_severity)
        .await
        .with_context(|| format!("Insight generation failed for {entity}"))?;
    emit(data.format, &insights, output::render_insights)
}

/// Parses a severity name.
///
/// # Errors
/// Returns an error naming the accepted values.
pub fn parse_severity(value: &str) -> Result<Severity> {
    Severity::parse(value).ok_or_else(|| {
        anyhow::anyhow!("Unknown severity '{value}', expected one of: info, low, medium, high, critical")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_names_parse() {
        assert_eq!(parse_severity("medium").unwrap(), Severity::Medium);
        assert!(parse_severity("severe").unwrap_err().to_string().contains("critical"));
    }
}
