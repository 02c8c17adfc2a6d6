//! JSON and plain-text rendering of analysis results.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use disclosure_analytics::{
    AnalogAnalysis, AnomalyReport, CorrelationNetwork, CyclicalAnalysis, EnsemblePrediction,
    EntityTimeSeries, Insight, ModelContribution, RegimeAnalysis,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Prints `value` to stdout in the requested format.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, render: fn(&T) -> String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", render(value)),
    }
    Ok(())
}

/// Rows shown at the end of a time-series listing.
const SERIES_TAIL: usize = 14;

pub fn render_time_series(series: &EntityTimeSeries) -> String {
    let mut out = format!(
        "{}: {} bucket(s) of {} day(s), {} active, {:.0} trades\n",
        series.entity_id,
        series.len(),
        series.bucket_days,
        series.active_days(),
        series.total_trades()
    );
    let _ = writeln!(out, "{:<12} {:>8} {:>14} {:>8}", "date", "trades", "notional", "buy/sell");
    let skip = series.len().saturating_sub(SERIES_TAIL);
    for i in skip..series.len() {
        let _ = writeln!(
            out,
            "{:<12} {:>8.0} {:>14.0} {:>8.2}",
            series.dates[i], series.trade_count[i], series.notional[i], series.buy_sell_ratio[i]
        );
    }
    out
}

pub fn render_cycles(analysis: &CyclicalAnalysis) -> String {
    if analysis.patterns.is_empty() {
        return format!("No cyclical patterns in {} bucket(s)", analysis.series_length);
    }
    let mut out = format!("Cyclical patterns over {} bucket(s):\n", analysis.series_length);
    for p in &analysis.patterns {
        let _ = writeln!(
            out,
            "  {:>7.1}d  {:<9}  strength {:.2}  confidence {:.2}  cycles {:.1}",
            p.period_days,
            p.category.as_str(),
            p.strength,
            p.confidence,
            p.cycles_observed
        );
    }
    out
}

pub fn render_regimes(analysis: &RegimeAnalysis) -> String {
    let mut out = format!(
        "Current regime: {} (p = {:.2}), about {:.0} more period(s) expected\n",
        analysis.current_label.as_str(),
        analysis.current_probability,
        analysis.expected_remaining_duration
    );
    let _ = writeln!(
        out,
        "Fit: log-likelihood {:.1} after {} iteration(s){}",
        analysis.log_likelihood,
        analysis.iterations,
        if analysis.converged { "" } else { " (not converged)" }
    );
    for state in &analysis.states {
        let _ = writeln!(
            out,
            "  [{}] {:<17} mean {:.2}  vol {:.2}  avg run {:.1}  share {:.0}%",
            state.index,
            state.label.as_str(),
            state.mean_activity,
            state.volatility,
            state.average_duration,
            state.frequency * 100.0
        );
    }
    let _ = writeln!(out, "Regime switches observed: {}", analysis.transitions_observed());
    out
}

pub fn render_analogs(analysis: &AnalogAnalysis) -> String {
    let mut out = format!(
        "{} match(es) for a {}-bucket window ({} candidate(s) scanned)\n",
        analysis.matches.len(),
        analysis.window_size,
        analysis.candidates_scanned
    );
    for m in &analysis.matches {
        let start = m.start_date.map_or_else(|| m.start_index.to_string(), |d| d.to_string());
        let _ = writeln!(
            out,
            "  {start}  similarity {:.3}  +30 {}  +90 {}",
            m.similarity,
            fmt_change(m.outcome_30),
            fmt_change(m.outcome_90)
        );
    }
    if let Some(c) = &analysis.consensus {
        let _ = writeln!(
            out,
            "Consensus: +30 {}  +90 {}  confidence {:.2} from {} sample(s)",
            fmt_change(c.expected_change_30),
            fmt_change(c.expected_change_90),
            c.confidence,
            c.sample_size
        );
    }
    out
}

pub fn render_prediction(prediction: &EnsemblePrediction) -> String {
    let mut out = format!(
        "{} over {} day(s): {} ({:+.3} vs baseline {:.3}, threshold {:.3})\n",
        prediction.entity_id,
        prediction.horizon_days,
        prediction.prediction_type.as_str(),
        prediction.predicted_value,
        prediction.baseline_activity,
        prediction.threshold
    );
    let _ = writeln!(
        out,
        "Confidence {:.2}, agreement {:.2}",
        prediction.confidence, prediction.model_agreement
    );
    for contribution in &prediction.contributions {
        match contribution {
            ModelContribution::Used {
                model,
                estimate,
                confidence,
                weight,
                evidence,
            } => {
                let _ = writeln!(
                    out,
                    "  {:<8} {estimate:+.3}  confidence {confidence:.2}  weight {weight:.2}  {evidence}",
                    model.as_str()
                );
            }
            ModelContribution::Unavailable { model, reason } => {
                let _ = writeln!(out, "  {:<8} unavailable: {reason}", model.as_str());
            }
        }
    }
    for note in &prediction.notes {
        let _ = writeln!(out, "  note: {note}");
    }
    out
}

pub fn render_network(network: &CorrelationNetwork) -> String {
    let mut out = format!(
        "{} entities, {} edge(s) at |r| >= {:.2}, {} cluster(s){}\n",
        network.entities.len(),
        network.edges.len(),
        network.threshold,
        network.clusters.len(),
        if network.truncated { " (truncated)" } else { "" }
    );
    for edge in &network.edges {
        let _ = writeln!(
            out,
            "  {} -> {}  r {:+.2}  lag {:+}d  p {:.4}  {}",
            edge.source,
            edge.target,
            edge.coefficient,
            edge.lag_days,
            edge.p_value,
            edge.hypothesis.as_str()
        );
    }
    for cluster in &network.clusters {
        let _ = writeln!(
            out,
            "  cluster {}: {} (mean r {:.2})",
            cluster.id,
            cluster.members.join(", "),
            cluster.average_correlation
        );
    }
    for c in network.centrality.iter().take(5) {
        let _ = writeln!(out, "  #{} {}  influence {:.2}", c.rank, c.entity_id, c.influence);
    }
    let m = &network.metrics;
    let _ = writeln!(
        out,
        "Density {:.3}, clustering {:.3}, components {}, modularity {:.3}",
        m.density, m.average_clustering, m.connected_components, m.modularity
    );
    out
}

pub fn render_anomaly(report: &AnomalyReport) -> String {
    let mut out = format!(
        "{}: anomaly score {:.2} ({})\n",
        report.entity_id,
        report.score,
        report.level.as_str()
    );
    for f in &report.factors {
        if f.available {
            let _ = writeln!(
                out,
                "  {:<22} {:.2} x {:.2}  {}",
                f.kind.as_str(),
                f.score,
                f.weight,
                f.detail
            );
        } else {
            let _ = writeln!(out, "  {:<22} unavailable: {}", f.kind.as_str(), f.detail);
        }
    }
    out
}

#[allow(clippy::ptr_arg)]
pub fn render_insights(insights: &Vec<Insight>) -> String {
    if insights.is_empty() {
        return "No insights at the requested thresholds".to_string();
    }
    let mut out = String::new();
    for insight in insights {
        let _ = writeln!(
            out,
            "[{}] {} (confidence {:.2})\n    {}",
            insight.severity.as_str().to_uppercase(),
            insight.title,
            insight.confidence,
            insight.description
        );
        for action in &insight.recommended_actions {
            let _ = writeln!(out, "    - {action}");
        }
    }
    out
}

fn fmt_change(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.2}"))
}
