use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{
    AnalogArgs, ConfigArgs, EntityArgs, InsightsArgs, NetworkArgs, PredictArgs, TimeSeriesArgs,
};

#[derive(Parser)]
#[command(name = "disclosure-analytics")]
#[command(about = "Multi-model analytics over disclosed trades by public officials", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the gridded activity series for one entity
    TimeSeries(TimeSeriesArgs),
    /// Detect recurring trading cycles
    Cycles(EntityArgs),
    /// Fit latent activity regimes
    Regimes(EntityArgs),
    /// Find historical windows resembling recent activity
    Analogs(AnalogArgs),
    /// Combined prediction from all models
    Predict(PredictArgs),
    /// Lagged-correlation network across entities
    Network(NetworkArgs),
    /// Composite anomaly score for recent activity
    Anomaly(EntityArgs),
    /// Severity-ranked findings for one entity
    Insights(InsightsArgs),
    /// Run every single-entity analysis at once
    Report(EntityArgs),
    /// Print the effective configuration as JSON
    ShowConfig(ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr (or a file) so stdout stays machine-readable
    if let Some(path) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::TimeSeries(args) => commands::run_time_series(args).await?,
        Commands::Cycles(args) => commands::run_cycles(args).await?,
        Commands::Regimes(args) => commands::run_regimes(args).await?,
        Commands::Analogs(args) => commands::run_analogs(args).await?,
        Commands::Predict(args) => commands::run_predict(args).await?,
        Commands::Network(args) => commands::run_network(args).await?,
        Commands::Anomaly(args) => commands::run_anomaly(args).await?,
        Commands::Insights(args) => commands::run_insights(args).await?,
        Commands::Report(args) => commands::run_report(args).await?,
        Commands::ShowConfig(args) => commands::run_show_config(&args)?,
    }

    Ok(())
}
