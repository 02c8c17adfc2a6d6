//! Shared arguments and service construction for every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use disclosure_analytics::AnalyticsService;
use disclosure_core::{AnalyticsConfig, ConfigLoader};
use disclosure_data::{CsvStorage, InMemoryTradeStore};

use crate::output::OutputFormat;

pub type CliService = AnalyticsService<InMemoryTradeStore, InMemoryTradeStore>;

/// Configuration source selection.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file; defaults to config/Config.toml layered with APP_ env vars
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Config profile, layering config/Config.{profile}.toml
    #[arg(long, conflicts_with = "config")]
    pub profile: Option<String>,
}

impl ConfigArgs {
    /// Loads the effective configuration.
    ///
    /// # Errors
    /// Returns an error if a configuration file cannot be parsed.
    pub fn load(&self) -> Result<AnalyticsConfig> {
        match (&self.config, &self.profile) {
            (Some(path), _) => ConfigLoader::load_from(path),
            (None, Some(profile)) => ConfigLoader::load_with_profile(profile),
            (None, None) => ConfigLoader::load(),
        }
    }
}

/// Input data, configuration, and output options.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Trades CSV (entity_id,ticker,date,direction,notional_low,notional_high)
    #[arg(long, env = "DISCLOSURE_TRADES")]
    pub trades: PathBuf,

    /// Metadata CSV (entity_id,name,surname,party,state)
    #[arg(long, env = "DISCLOSURE_METADATA")]
    pub metadata: Option<PathBuf>,

    /// Analysis date (YYYY-MM-DD); defaults to the latest trade date
    #[arg(long)]
    pub as_of: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// A loaded store and the service running over it.
pub struct Loaded {
    pub store: Arc<InMemoryTradeStore>,
    pub service: CliService,
}

/// Loads trades and metadata and builds the analytics service.
///
/// # Errors
/// Returns an error if the CSV files or configuration cannot be read, or
/// if `--as-of` is not a valid date.
pub async fn load(args: &DataArgs) -> Result<Loaded> {
    let config = args.config.load()?;
    let events = CsvStorage::read_trades(&args.trades)?;
    let metadata = match &args.metadata {
        Some(path) => CsvStorage::read_metadata(path)?,
        None => Vec::new(),
    };
    let event_count = events.len();

    let store = Arc::new(InMemoryTradeStore::from_parts(events, metadata).await);
    let as_of = match parse_date(args.as_of.as_deref())? {
        Some(date) => date,
        None => store
            .latest_date()
            .await
            .unwrap_or_else(|| chrono::Utc::now().date_naive()),
    };

    tracing::info!(
        trades = event_count,
        entities = store.entity_ids().await.len(),
        %as_of,
        "Loaded disclosure data"
    );

    let service = AnalyticsService::new(Arc::clone(&store), Arc::clone(&store), config, as_of);
    Ok(Loaded { store, service })
}

/// Parses an optional `YYYY-MM-DD` date.
///
/// # Errors
/// Returns an error for a malformed date.
pub fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
        })
        .transpose()
}
