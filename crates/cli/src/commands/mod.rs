//! CLI commands for disclosed-trade analytics.

pub mod analyze;
pub mod context;
pub mod network;
pub mod report;

pub use analyze::{
    run_analogs, run_anomaly, run_cycles, run_insights, run_predict, run_regimes, run_time_series,
    AnalogArgs, EntityArgs, InsightsArgs, PredictArgs, TimeSeriesArgs,
};
pub use context::ConfigArgs;
pub use network::{run_network, NetworkArgs};
pub use report::{run_report, run_show_config};
