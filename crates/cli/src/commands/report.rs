//! Full single-entity report and configuration dump.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use disclosure_analytics::{
    AnalogAnalysis, AnomalyReport, CyclicalAnalysis, EnsemblePrediction, Insight, ModelOutcome,
    RegimeAnalysis, Severity,
};
use serde::Serialize;

use super::analyze::EntityArgs;
use super::context::{load, ConfigArgs};
use crate::output::{self, emit};

/// Every single-entity analysis; sub-models that cannot run are marked unavailable.
#[derive(Debug, Serialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub as_of: NaiveDate,
    pub cyclical: ModelOutcome<CyclicalAnalysis>,
    pub regime: ModelOutcome<RegimeAnalysis>,
    pub analogs: ModelOutcome<AnalogAnalysis>,
    pub prediction: EnsemblePrediction,
    pub anomaly: AnomalyReport,
    pub insights: Vec<Insight>,
}

pub async fn run_report(args: EntityArgs) -> Result<()> {
    let loaded = load(&args.data).await?;
    let service = &loaded.service;
    let entity = args.entity.as_str();

    let (cyclical, regime, analogs) = tokio::join!(
        service.get_cyclical_patterns(entity),
        service.get_regime_analysis(entity),
        service.get_historical_matches(entity, None, None),
    );
    let prediction = service
        .get_ensemble_prediction(entity, None)
        .await
        .with_context(|| format!("Prediction failed for {entity}"))?;
    let anomaly = service
        .get_anomaly_report(entity)
        .await
        .with_context(|| format!("Anomaly scoring failed for {entity}"))?;
    let insights = service
        .get_insights(entity, 0.0, Severity::Info)
        .await
        .with_context(|| format!("Insight generation failed for {entity}"))?;

    let report = EntityReport {
        entity_id: entity.to_string(),
        as_of: service.as_of(),
        cyclical: cyclical.map(|a| a.as_ref().clone()).into(),
        regime: regime.map(|a| a.as_ref().clone()).into(),
        analogs: analogs.map(|a| a.as_ref().clone()).into(),
        prediction: prediction.as_ref().clone(),
        anomaly: anomaly.as_ref().clone(),
        insights,
    };
    emit(args.data.format, &report, render_report)
}

pub fn run_show_config(args: &ConfigArgs) -> Result<()> {
    let config = args.load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn render_section<T>(title: &str, outcome: &ModelOutcome<T>, render: fn(&T) -> String) -> String {
    match outcome {
        ModelOutcome::Available(value) => format!("== {title} ==\n{}", render(value)),
        ModelOutcome::Unavailable { reason } => format!("== {title} ==\nunavailable: {reason}\n"),
    }
}

fn render_report(report: &EntityReport) -> String {
    [
        format!("Report for {} as of {}\n", report.entity_id, report.as_of),
        render_section("Cycles", &report.cyclical, output::render_cycles),
        render_section("Regimes", &report.regime, output::render_regimes),
        render_section("Analogs", &report.analogs, output::render_analogs),
        format!("== Prediction ==\n{}", output::render_prediction(&report.prediction)),
        format!("== Anomaly ==\n{}", output::render_anomaly(&report.anomaly)),
        format!("== Insights ==\n{}", output::render_insights(&report.insights)),
    ]
    .join("\n")
}
