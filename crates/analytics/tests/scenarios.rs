//! End-to-end scenarios driven through `AnalyticsService` and the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;
use disclosure_analytics::{
    AnalyticsService, ForecastComparison, InsightKind, PredictionType, Severity,
};
use disclosure_core::{
    AnalyticsConfig, AnalyticsError, EntityMetadata, NotionalRange, TradeDirection, TradeEvent,
};
use disclosure_data::InMemoryTradeStore;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal_macros::dec;

type Service = AnalyticsService<InMemoryTradeStore, InMemoryTradeStore>;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
}

fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Expands per-day trade counts ending at `as_of` into events.
fn events_from_counts(entity: &str, counts: &[u32]) -> Vec<TradeEvent> {
    let start = as_of() - chrono::Duration::days(counts.len() as i64 - 1);
    counts
        .iter()
        .enumerate()
        .flat_map(|(day, &n)| {
            let date = start + chrono::Duration::days(day as i64);
            (0..n).map(move |i| {
                let direction = if i % 2 == 0 { TradeDirection::Buy } else { TradeDirection::Sell };
                TradeEvent::new(
                    entity,
                    "NVDA",
                    date,
                    direction,
                    NotionalRange::new(dec!(1001), dec!(15000)),
                )
            })
        })
        .collect()
}

fn random_counts(rng: &mut ChaCha8Rng, days: usize) -> Vec<u32> {
    (0..days).map(|_| rng.gen_range(0..6)).collect()
}

async fn service(events: Vec<TradeEvent>, metadata: Vec<EntityMetadata>, config: AnalyticsConfig) -> Service {
    let store = Arc::new(InMemoryTradeStore::from_parts(events, metadata).await);
    AnalyticsService::new(Arc::clone(&store), store, config, as_of())
}

/// 400 days of trading on a 21-day cycle with unit noise.
fn cyclical_trader(entity: &str) -> Vec<TradeEvent> {
    let mut rng = ChaCha8Rng::seed_from_u64(21);
    let counts: Vec<u32> = (0..400)
        .map(|t| {
            let phase = 2.0 * std::f64::consts::PI * f64::from(t) / 21.0;
            let value = 15.0 + 10.0 * phase.sin() + gaussian(&mut rng);
            value.round().max(0.0) as u32
        })
        .collect();
    events_from_counts(entity, &counts)
}

fn cyclical_config() -> AnalyticsConfig {
    let mut config = AnalyticsConfig::default();
    config.time_series.lookback_days = 400;
    config
}

// ============================================
// Scenario A: injected 21-day cycle
// ============================================

#[tokio::test]
async fn recovers_injected_21_day_cycle() {
    let service = service(cyclical_trader("A1"), Vec::new(), cyclical_config()).await;
    let analysis = service.get_cyclical_patterns("A1").await.unwrap();

    let dominant = &analysis.patterns[0];
    assert!(
        (dominant.period_days - 21.0).abs() <= 2.0,
        "period {}",
        dominant.period_days
    );
    assert!(dominant.confidence > 0.7, "confidence {}", dominant.confidence);
    assert!(analysis
        .patterns
        .iter()
        .all(|p| p.cycles_observed >= 3.0));
}

#[tokio::test]
async fn cyclical_trader_gets_a_cycle_insight() {
    let service = service(cyclical_trader("A1"), Vec::new(), cyclical_config()).await;
    let insights = service.get_insights("A1", 0.0, Severity::Info).await.unwrap();

    assert!(insights.iter().any(|i| i.kind == InsightKind::CyclicalPattern));
    for pair in insights.windows(2) {
        assert!(pair[0].severity >= pair[1].severity);
    }
}

// ============================================
// Scenario B: lagged follower
// ============================================

#[tokio::test]
async fn detects_five_day_follower() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let leader = random_counts(&mut rng, 730);
    let follower: Vec<u32> = (0..730)
        .map(|t| {
            if t < 5 {
                return rng.gen_range(0..6);
            }
            let noise: i64 = if rng.gen_bool(0.1) { rng.gen_range(-1..=1) } else { 0 };
            (i64::from(leader[t - 5]) + noise).max(0) as u32
        })
        .collect();

    let mut events = events_from_counts("B1", &leader);
    events.extend(events_from_counts("B2", &follower));

    let service = service(events, Vec::new(), AnalyticsConfig::default()).await;
    let network = service
        .get_correlation_network(&["B1".to_string(), "B2".to_string()], Some(0.5))
        .await
        .unwrap();

    assert_eq!(network.edges.len(), 1);
    let edge = &network.edges[0];
    assert_eq!((edge.source.as_str(), edge.target.as_str()), ("B1", "B2"));
    assert!((edge.lag_days - 5).abs() <= 1, "lag {}", edge.lag_days);
    assert!(edge.coefficient > 0.8, "r = {}", edge.coefficient);
    assert!((-1.0..=1.0).contains(&edge.coefficient));
}

// ============================================
// Scenario C: no trades
// ============================================

#[tokio::test]
async fn entity_without_trades_gets_insufficient_prediction() {
    let service = service(cyclical_trader("A1"), Vec::new(), AnalyticsConfig::default()).await;
    let prediction = service.get_ensemble_prediction("C1", Some(30)).await.unwrap();

    assert_eq!(prediction.prediction_type, PredictionType::InsufficientData);
    assert!(prediction.predicted_value.abs() < f64::EPSILON);
    assert!(prediction.confidence.abs() < f64::EPSILON);
    assert!(prediction.model_agreement.abs() < f64::EPSILON);

    let report = service.get_anomaly_report("C1").await.unwrap();
    assert!((0.0..=1.0).contains(&report.score));
}

// ============================================
// Scenario D: short forecast
// ============================================

#[tokio::test]
async fn short_forecast_reports_insufficient_length() {
    let service = service(cyclical_trader("A1"), Vec::new(), cyclical_config()).await;
    let analysis = service.get_cyclical_patterns("A1").await.unwrap();
    let forecast = analysis.forecast(10, 3).unwrap();

    assert_eq!(forecast.len(), 10);
    assert_eq!(
        forecast.half_comparison(30),
        ForecastComparison::Insufficient {
            required: 30,
            available: 10
        }
    );
}

// ============================================
// Scenario E: correlated pair plus outsider
// ============================================

#[tokio::test]
async fn correlated_pair_shares_a_cluster() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let base = random_counts(&mut rng, 730);
    let twin: Vec<u32> = base
        .iter()
        .map(|&n| {
            let noise: i64 = if rng.gen_bool(0.2) { rng.gen_range(-1..=1) } else { 0 };
            (i64::from(n) + noise).max(0) as u32
        })
        .collect();
    let outsider = random_counts(&mut rng, 730);

    let mut events = events_from_counts("E1", &base);
    events.extend(events_from_counts("E2", &twin));
    events.extend(events_from_counts("E3", &outsider));
    let metadata = vec![
        EntityMetadata::new("E1", "First").with_party("D").with_state("CA"),
        EntityMetadata::new("E2", "Second").with_party("R").with_state("TX"),
        EntityMetadata::new("E3", "Third").with_party("D").with_state("NY"),
    ];

    let service = service(events, metadata, AnalyticsConfig::default()).await;
    let ids: Vec<String> = ["E1", "E2", "E3"].iter().map(ToString::to_string).collect();
    let network = service.get_correlation_network(&ids, Some(0.5)).await.unwrap();

    let pair = network.cluster_of("E1").expect("E1 clustered");
    assert!(pair.members.contains(&"E2".to_string()));
    assert!(!pair.members.contains(&"E3".to_string()));
    assert!(network.cluster_of("E3").map_or(true, |c| !c.members.contains(&"E1".to_string())));

    let edge = network.edges_for("E1").find(|e| e.touches("E2")).unwrap();
    assert!(edge.coefficient > 0.8);
    assert_eq!(edge.hypothesis, disclosure_analytics::EdgeHypothesis::Unexplained);
}

#[tokio::test]
async fn peer_group_surfaces_unexplained_correlation_insight() {
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let base = random_counts(&mut rng, 730);
    let mut events = events_from_counts("E1", &base);
    events.extend(events_from_counts("E2", &base));

    let store = Arc::new(InMemoryTradeStore::from_parts(events, Vec::new()).await);
    let service = AnalyticsService::new(Arc::clone(&store), store, AnalyticsConfig::default(), as_of())
        .with_peer_group(vec!["E2".to_string()]);

    let insights = service.get_insights("E1", 0.0, Severity::Info).await.unwrap();
    assert!(insights
        .iter()
        .any(|i| i.kind == InsightKind::Correlation && i.title.contains("E2")));
}

// ============================================
// Error propagation
// ============================================

#[tokio::test]
async fn short_lookback_is_insufficient_for_regimes() {
    let mut config = AnalyticsConfig::default();
    config.time_series.lookback_days = 30;
    let service = service(cyclical_trader("A1"), Vec::new(), config).await;

    let err = service.get_regime_analysis("A1").await.unwrap_err();
    assert!(matches!(
        err,
        AnalyticsError::InsufficientData {
            component: "regime",
            required: 40,
            available: 30
        }
    ));

    // The ensemble absorbs the failure instead of surfacing it.
    let prediction = service.get_ensemble_prediction("A1", None).await.unwrap();
    assert!(prediction.contributions.iter().any(|c| !c.is_used()));
}
