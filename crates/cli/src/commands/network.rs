//! Cross-entity correlation network command.

use anyhow::{Context, Result};
use clap::Args;

use super::context::{load, DataArgs};
use crate::output::{self, emit};

#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Entities to include; every entity in the trades file when omitted
    pub entities: Vec<String>,

    /// Minimum |r| for an edge; defaults to the configured threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    #[command(flatten)]
    pub data: DataArgs,
}

pub async fn run_network(args: NetworkArgs) -> Result<()> {
    let loaded = load(&args.data).await?;
    let entities = if args.entities.is_empty() {
        loaded.store.entity_ids().await
    } else {
        args.entities
    };
    if entities.len() < 2 {
        anyhow::bail!("A correlation network needs at least two entities, got {}", entities.len());
    }

    let network = loaded
        .service
        .get_correlation_network(&entities, args.threshold)
        .await
        .context("Correlation network failed")?;
    emit(args.data.format, network.as_ref(), output::render_network)
}
