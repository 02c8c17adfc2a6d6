//! Cross-entity correlation and network structure.
//!
//! Every pair of entities with enough overlapping active days gets a lagged
//! Pearson correlation. Edges whose |r| clears the threshold form an
//! undirected graph weighted by |r|, which is partitioned with Louvain and
//! scored for degree, betweenness, and eigenvector centrality.

use std::collections::{HashMap, VecDeque};

use disclosure_core::stats::{correlation_p_value, pearson_correlation};
use disclosure_core::{AnalyticsError, AnalyticsResult, EntityMetadata, NetworkConfig};
use serde::{Deserialize, Serialize};

use crate::timeseries::EntityTimeSeries;

const MIN_NODES_FOR_METRICS: usize = 3;
const LOUVAIN_MAX_PASSES: usize = 100;
const POWER_ITERATIONS: usize = 200;

/// Heuristic explanation for a correlation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeHypothesis {
    Family,
    Party,
    State,
    Unexplained,
}

impl EdgeHypothesis {
    /// Labels a pair by shared surname, then party, then state.
    #[must_use]
    pub fn classify(a: Option<&EntityMetadata>, b: Option<&EntityMetadata>) -> Self {
        let (Some(a), Some(b)) = (a, b) else {
            return Self::Unexplained;
        };
        let shared = |x: &Option<String>, y: &Option<String>| match (x, y) {
            (Some(x), Some(y)) => x.trim().eq_ignore_ascii_case(y.trim()) && !x.trim().is_empty(),
            _ => false,
        };
        if shared(&a.surname, &b.surname) {
            Self::Family
        } else if shared(&a.party, &b.party) {
            Self::Party
        } else if shared(&a.state, &b.state) {
            Self::State
        } else {
            Self::Unexplained
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Party => "party",
            Self::State => "state",
            Self::Unexplained => "unexplained",
        }
    }
}

/// Lagged correlation between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEdge {
    pub source: String,
    pub target: String,
    /// Pearson r at the best lag, in [-1, 1]
    pub coefficient: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Positive when `target` follows `source`
    pub lag_days: i64,
    /// Days on which both entities traded
    pub overlap_days: usize,
    pub hypothesis: EdgeHypothesis,
}

impl CorrelationEdge {
    #[must_use]
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source == entity_id || self.target == entity_id
    }

    /// The other endpoint, if `entity_id` is one of them.
    #[must_use]
    pub fn counterpart(&self, entity_id: &str) -> Option<&str> {
        if self.source == entity_id {
            Some(&self.target)
        } else if self.target == entity_id {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Party,
    State,
    Surname,
}

/// Attribute value held by a majority of a cluster's members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedAttribute {
    pub kind: AttributeKind,
    pub value: String,
    /// Share of members holding the value
    pub share: f64,
}

/// Community found by modularity optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCluster {
    pub id: usize,
    pub members: Vec<String>,
    /// Mean coefficient over edges inside the cluster
    pub average_correlation: f64,
    pub dominant_attribute: Option<SharedAttribute>,
}

/// Centrality of one entity; every score is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScores {
    pub entity_id: String,
    pub degree: f64,
    pub betweenness: f64,
    pub eigenvector: f64,
    /// Mean of the three scores
    pub influence: f64,
    /// 1 = most influential
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_clustering: f64,
    pub connected_components: usize,
    pub modularity: f64,
}

/// Full network analysis over a set of entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationNetwork {
    pub entities: Vec<String>,
    /// Edges with |r| at or above `threshold`
    pub edges: Vec<CorrelationEdge>,
    pub clusters: Vec<NetworkCluster>,
    /// Sorted by influence descending
    pub centrality: Vec<CentralityScores>,
    pub metrics: NetworkMetrics,
    pub threshold: f64,
    pub pairs_evaluated: usize,
    /// True when the entity list exceeded the configured cap
    pub truncated: bool,
}

impl CorrelationNetwork {
    /// Edges touching `entity_id`.
    pub fn edges_for<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a CorrelationEdge> + 'a {
        self.edges.iter().filter(move |e| e.touches(entity_id))
    }

    #[must_use]
    pub fn cluster_of(&self, entity_id: &str) -> Option<&NetworkCluster> {
        self.clusters
            .iter()
            .find(|c| c.members.iter().any(|m| m == entity_id))
    }
}

/// One entity's series and optional metadata.
#[derive(Debug, Clone)]
pub struct NetworkInput {
    pub series: EntityTimeSeries,
    pub metadata: Option<EntityMetadata>,
}

impl NetworkInput {
    #[must_use]
    pub fn new(series: EntityTimeSeries, metadata: Option<EntityMetadata>) -> Self {
        Self { series, metadata }
    }
}

/// Best lagged correlation found for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaggedCorrelation {
    pub coefficient: f64,
    pub p_value: f64,
    /// In buckets; positive when the second series follows the first
    pub lag: i64,
    pub samples: usize,
}

/// Pearson correlation at the lag in `[-max_lag, max_lag]` maximising |r|.
///
/// Ties prefer the smaller absolute lag. Returns `None` when no lag leaves
/// at least 3 aligned samples.
#[must_use]
pub fn best_lagged_correlation(x: &[f64], y: &[f64], max_lag: usize) -> Option<LaggedCorrelation> {
    let n = x.len().min(y.len());
    let x = &x[x.len() - n..];
    let y = &y[y.len() - n..];

    let mut lags: Vec<i64> = (-(max_lag as i64)..=max_lag as i64).collect();
    lags.sort_by_key(|l| (l.abs(), *l < 0));

    let mut best: Option<LaggedCorrelation> = None;
    for lag in lags {
        let shift = lag.unsigned_abs() as usize;
        if shift + 3 > n {
            continue;
        }
        let (xs, ys) = if lag >= 0 {
            (&x[..n - shift], &y[shift..])
        } else {
            (&x[shift..], &y[..n - shift])
        };
        let r = pearson_correlation(xs, ys);
        if best.map_or(true, |b| r.abs() > b.coefficient.abs() + 1e-12) {
            best = Some(LaggedCorrelation {
                coefficient: r,
                p_value: correlation_p_value(r, xs.len()),
                lag,
                samples: xs.len(),
            });
        }
    }
    best
}

/// Days on which both series are non-zero, aligned on their latest buckets.
#[must_use]
pub fn overlapping_active_days(x: &[f64], y: &[f64]) -> usize {
    x.iter()
        .rev()
        .zip(y.iter().rev())
        .filter(|(a, b)| **a > 0.0 && **b > 0.0)
        .count()
}

/// Pairwise correlation and graph analysis.
#[derive(Debug, Clone, Default)]
pub struct NetworkAnalyzer {
    config: NetworkConfig,
}

impl NetworkAnalyzer {
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Builds the correlation network for `inputs`.
    ///
    /// Series are aligned on their most recent common buckets.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `threshold` is outside [0, 1].
    pub fn analyze(&self, inputs: &[NetworkInput], threshold: f64) -> AnalyticsResult<CorrelationNetwork> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "correlation threshold must be within [0, 1], got {threshold}"
            )));
        }

        let truncated = inputs.len() > self.config.max_entities;
        if truncated {
            tracing::warn!(
                requested = inputs.len(),
                cap = self.config.max_entities,
                "Entity count exceeds network cap, truncating"
            );
        }
        let inputs = &inputs[..inputs.len().min(self.config.max_entities)];
        let entities: Vec<String> = inputs.iter().map(|i| i.series.entity_id.clone()).collect();

        let mut edges = Vec::new();
        let mut pairs_evaluated = 0;
        for (a_idx, a) in inputs.iter().enumerate() {
            for b in &inputs[a_idx + 1..] {
                let (xa, xb) = (a.series.activity(), b.series.activity());
                let overlap = overlapping_active_days(xa, xb);
                if overlap < self.config.min_overlap_days {
                    continue;
                }
                pairs_evaluated += 1;

                let Some(best) = best_lagged_correlation(xa, xb, self.config.max_lag) else {
                    continue;
                };
                if best.coefficient.abs() < threshold {
                    continue;
                }
                edges.push(CorrelationEdge {
                    source: a.series.entity_id.clone(),
                    target: b.series.entity_id.clone(),
                    coefficient: best.coefficient.clamp(-1.0, 1.0),
                    p_value: best.p_value,
                    lag_days: best.lag * i64::from(a.series.bucket_days.max(1)),
                    overlap_days: overlap,
                    hypothesis: EdgeHypothesis::classify(a.metadata.as_ref(), b.metadata.as_ref()),
                });
            }
        }

        let graph = WeightedGraph::from_edges(&entities, &edges);
        let (clusters, centrality, metrics) = if entities.len() < MIN_NODES_FOR_METRICS {
            (
                Vec::new(),
                Vec::new(),
                NetworkMetrics {
                    node_count: entities.len(),
                    edge_count: edges.len(),
                    ..NetworkMetrics::default()
                },
            )
        } else {
            let membership = louvain(&graph.weights);
            let clusters = build_clusters(&membership, &entities, &edges, inputs);
            let centrality = graph.centrality(&entities);
            let metrics = NetworkMetrics {
                node_count: entities.len(),
                edge_count: edges.len(),
                density: graph.density(),
                average_clustering: graph.average_clustering(),
                connected_components: graph.connected_components(),
                modularity: modularity(&graph.weights, &membership),
            };
            (clusters, centrality, metrics)
        };

        tracing::debug!(
            nodes = metrics.node_count,
            edges = metrics.edge_count,
            clusters = clusters.len(),
            pairs_evaluated,
            "Correlation network built"
        );

        Ok(CorrelationNetwork {
            entities,
            edges,
            clusters,
            centrality,
            metrics,
            threshold,
            pairs_evaluated,
            truncated,
        })
    }
}

/// Dense symmetric |r| adjacency.
struct WeightedGraph {
    weights: Vec<Vec<f64>>,
}

impl WeightedGraph {
    fn from_edges(entities: &[String], edges: &[CorrelationEdge]) -> Self {
        let index: HashMap<&str, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.as_str(), i))
            .collect();
        let n = entities.len();
        let mut weights = vec![vec![0.0; n]; n];
        for edge in edges {
            if let (Some(&i), Some(&j)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                let w = edge.coefficient.abs().max(1e-9);
                weights[i][j] = w;
                weights[j][i] = w;
            }
        }
        Self { weights }
    }

    fn n(&self) -> usize {
        self.weights.len()
    }

    fn neighbours(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.weights[i]
            .iter()
            .enumerate()
            .filter(move |(j, w)| *j != i && **w > 0.0)
            .map(|(j, _)| j)
    }

    fn degree(&self, i: usize) -> usize {
        self.neighbours(i).count()
    }

    fn density(&self) -> f64 {
        let n = self.n();
        if n < 2 {
            return 0.0;
        }
        let edges: usize = (0..n).map(|i| self.degree(i)).sum::<usize>() / 2;
        2.0 * edges as f64 / (n * (n - 1)) as f64
    }

    fn average_clustering(&self) -> f64 {
        let n = self.n();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = (0..n)
            .map(|i| {
                let nbrs: Vec<usize> = self.neighbours(i).collect();
                let d = nbrs.len();
                if d < 2 {
                    return 0.0;
                }
                let mut links = 0;
                for (a_pos, &a) in nbrs.iter().enumerate() {
                    for &b in &nbrs[a_pos + 1..] {
                        if self.weights[a][b] > 0.0 {
                            links += 1;
                        }
                    }
                }
                2.0 * f64::from(links) / (d * (d - 1)) as f64
            })
            .sum();
        total / n as f64
    }

    fn connected_components(&self) -> usize {
        let n = self.n();
        let mut seen = vec![false; n];
        let mut components = 0;
        for start in 0..n {
            if seen[start] {
                continue;
            }
            components += 1;
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            while let Some(v) = queue.pop_front() {
                for w in self.neighbours(v) {
                    if !seen[w] {
                        seen[w] = true;
                        queue.push_back(w);
                    }
                }
            }
        }
        components
    }

    /// Brandes betweenness on the unweighted graph, normalised to [0, 1].
    fn betweenness(&self) -> Vec<f64> {
        let n = self.n();
        let mut centrality = vec![0.0; n];
        for s in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut distance = vec![-1_i64; n];
            sigma[s] = 1.0;
            distance[s] = 0;

            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for w in self.neighbours(v) {
                    if distance[w] < 0 {
                        distance[w] = distance[v] + 1;
                        queue.push_back(w);
                    }
                    if distance[w] == distance[v] + 1 {
                        sigma[w] += sigma[v];
                        predecessors[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0; n];
            while let Some(w) = stack.pop() {
                for &v in &predecessors[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }

        // Each undirected pair was counted from both ends.
        let norm = if n > 2 { ((n - 1) * (n - 2)) as f64 } else { 1.0 };
        centrality.iter().map(|c| (c / norm).clamp(0.0, 1.0)).collect()
    }

    /// Power iteration on (A + I), scaled so the maximum is 1.
    fn eigenvector(&self) -> Vec<f64> {
        let n = self.n();
        let has_edges = (0..n).any(|i| self.degree(i) > 0);
        if !has_edges {
            return vec![0.0; n];
        }
        let mut x = vec![1.0; n];
        for _ in 0..POWER_ITERATIONS {
            let mut next: Vec<f64> = (0..n)
                .map(|i| x[i] + self.weights[i].iter().zip(&x).map(|(w, v)| w * v).sum::<f64>())
                .collect();
            let max = next.iter().copied().fold(0.0_f64, f64::max);
            if max <= 0.0 {
                return vec![0.0; n];
            }
            for v in &mut next {
                *v /= max;
            }
            let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
            x = next;
            if change < 1e-10 {
                break;
            }
        }
        // Isolated nodes only keep the identity contribution, which decays towards 0.
        (0..n)
            .map(|i| if self.degree(i) == 0 { 0.0 } else { x[i].clamp(0.0, 1.0) })
            .collect()
    }

    fn centrality(&self, entities: &[String]) -> Vec<CentralityScores> {
        let n = self.n();
        let betweenness = self.betweenness();
        let eigenvector = self.eigenvector();
        let mut scores: Vec<CentralityScores> = (0..n)
            .map(|i| {
                let degree = if n > 1 {
                    self.degree(i) as f64 / (n - 1) as f64
                } else {
                    0.0
                };
                CentralityScores {
                    entity_id: entities[i].clone(),
                    degree,
                    betweenness: betweenness[i],
                    eigenvector: eigenvector[i],
                    influence: (degree + betweenness[i] + eigenvector[i]) / 3.0,
                    rank: 0,
                }
            })
            .collect();

        scores.sort_by(|a, b| {
            b.influence
                .partial_cmp(&a.influence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        for (i, s) in scores.iter_mut().enumerate() {
            s.rank = i + 1;
        }
        scores
    }
}

/// Louvain community detection; returns a community id per node.
fn louvain(weights: &[Vec<f64>]) -> Vec<usize> {
    let n = weights.len();
    let mut membership: Vec<usize> = (0..n).collect();
    let mut graph = weights.to_vec();

    loop {
        let local = local_moving(&graph);
        let (labels, count) = relabel(&local);
        if count == graph.len() {
            break;
        }
        for m in &mut membership {
            *m = labels[*m];
        }
        graph = aggregate(&graph, &labels, count);
    }

    relabel(&membership).0
}

fn local_moving(graph: &[Vec<f64>]) -> Vec<usize> {
    let n = graph.len();
    let strength: Vec<f64> = graph.iter().map(|row| row.iter().sum()).collect();
    let m2: f64 = strength.iter().sum();
    let mut community: Vec<usize> = (0..n).collect();
    if m2 <= 0.0 {
        return community;
    }
    let mut totals = strength.clone();

    for _ in 0..LOUVAIN_MAX_PASSES {
        let mut moved = false;
        for i in 0..n {
            let current = community[i];
            totals[current] -= strength[i];

            let mut links = vec![0.0; n];
            for (j, &w) in graph[i].iter().enumerate() {
                if j != i && w > 0.0 {
                    links[community[j]] += w;
                }
            }

            let gain = |c: usize| links[c] - totals[c] * strength[i] / m2;
            let mut best = current;
            let mut best_gain = gain(current);
            for c in 0..n {
                if c != current && links[c] > 0.0 {
                    let g = gain(c);
                    if g > best_gain + 1e-12 {
                        best = c;
                        best_gain = g;
                    }
                }
            }

            totals[best] += strength[i];
            if best != current {
                community[i] = best;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    community
}

/// Maps community ids to 0..count in order of first appearance.
fn relabel(assignment: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let labels = assignment
        .iter()
        .map(|c| {
            let next = mapping.len();
            *mapping.entry(*c).or_insert(next)
        })
        .collect();
    (labels, mapping.len())
}

fn aggregate(graph: &[Vec<f64>], labels: &[usize], count: usize) -> Vec<Vec<f64>> {
    let mut out = vec![vec![0.0; count]; count];
    for (i, row) in graph.iter().enumerate() {
        for (j, &w) in row.iter().enumerate() {
            out[labels[i]][labels[j]] += w;
        }
    }
    out
}

/// Newman modularity of `membership` on the weighted graph.
fn modularity(weights: &[Vec<f64>], membership: &[usize]) -> f64 {
    let strength: Vec<f64> = weights.iter().map(|row| row.iter().sum()).collect();
    let m2: f64 = strength.iter().sum();
    if m2 <= 0.0 {
        return 0.0;
    }
    let mut q = 0.0;
    for i in 0..weights.len() {
        for j in 0..weights.len() {
            if membership[i] == membership[j] {
                q += weights[i][j] - strength[i] * strength[j] / m2;
            }
        }
    }
    q / m2
}

fn build_clusters(
    membership: &[usize],
    entities: &[String],
    edges: &[CorrelationEdge],
    inputs: &[NetworkInput],
) -> Vec<NetworkCluster> {
    let count = membership.iter().copied().max().map_or(0, |m| m + 1);
    let mut clusters = Vec::new();

    for community in 0..count {
        let member_idx: Vec<usize> = (0..entities.len())
            .filter(|&i| membership[i] == community)
            .collect();
        if member_idx.len() < 2 {
            continue;
        }
        let members: Vec<String> = member_idx.iter().map(|&i| entities[i].clone()).collect();
        let internal: Vec<f64> = edges
            .iter()
            .filter(|e| members.contains(&e.source) && members.contains(&e.target))
            .map(|e| e.coefficient)
            .collect();
        let metadata: Vec<Option<&EntityMetadata>> =
            member_idx.iter().map(|&i| inputs[i].metadata.as_ref()).collect();

        clusters.push(NetworkCluster {
            id: clusters.len(),
            members,
            average_correlation: disclosure_core::stats::mean(&internal),
            dominant_attribute: dominant_attribute(&metadata),
        });
    }
    clusters
}

/// Most widely shared party, state, or surname, if held by a strict majority.
fn dominant_attribute(metadata: &[Option<&EntityMetadata>]) -> Option<SharedAttribute> {
    let total = metadata.len();
    if total == 0 {
        return None;
    }

    let most_common = |kind: AttributeKind, pick: fn(&EntityMetadata) -> Option<&String>| {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for value in metadata.iter().flatten().filter_map(|m| pick(m)) {
            let key = value.trim().to_string();
            if !key.is_empty() {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(value, count)| SharedAttribute {
                kind,
                value,
                share: count as f64 / total as f64,
            })
    };

    [
        most_common(AttributeKind::Party, |m| m.party.as_ref()),
        most_common(AttributeKind::State, |m| m.state.as_ref()),
        most_common(AttributeKind::Surname, |m| m.surname.as_ref()),
    ]
    .into_iter()
    .flatten()
    .filter(|attr| attr.share > 0.5)
    .fold(None, |best: Option<SharedAttribute>, attr| match best {
        Some(b) if b.share >= attr.share => Some(b),
        _ => Some(attr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn series(id: &str, values: Vec<f64>) -> EntityTimeSeries {
        EntityTimeSeries::from_activity(id, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), values)
    }

    fn random_activity(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| if rng.gen_bool(0.5) { f64::from(rng.gen_range(1..5)) } else { 0.0 })
            .collect()
    }

    fn input(id: &str, values: Vec<f64>) -> NetworkInput {
        NetworkInput::new(series(id, values), None)
    }

    fn graph(n: usize, links: &[(usize, usize)]) -> WeightedGraph {
        let mut weights = vec![vec![0.0; n]; n];
        for &(a, b) in links {
            weights[a][b] = 1.0;
            weights[b][a] = 1.0;
        }
        WeightedGraph { weights }
    }

    // ============================================
    // Lagged Correlation Tests
    // ============================================

    #[test]
    fn recovers_positive_lag_when_second_follows() {
        let x = random_activity(300, 11);
        let mut y = vec![0.0; 300];
        y[5..].copy_from_slice(&x[..295]);

        let best = best_lagged_correlation(&x, &y, 30).unwrap();
        assert_eq!(best.lag, 5);
        assert!(best.coefficient > 0.99);
        assert!(best.p_value < 0.001);
    }

    #[test]
    fn recovers_negative_lag_when_first_follows() {
        let y = random_activity(300, 12);
        let mut x = vec![0.0; 300];
        x[3..].copy_from_slice(&y[..297]);

        let best = best_lagged_correlation(&x, &y, 30).unwrap();
        assert_eq!(best.lag, -3);
    }

    #[test]
    fn too_short_for_any_lag() {
        assert!(best_lagged_correlation(&[1.0, 2.0], &[2.0, 1.0], 5).is_none());
    }

    #[test]
    fn overlap_counts_joint_activity() {
        let x = [1.0, 0.0, 2.0, 3.0];
        let y = [1.0, 1.0, 0.0, 5.0];
        assert_eq!(overlapping_active_days(&x, &y), 2);
    }

    // ============================================
    // Hypothesis Tests
    // ============================================

    #[test]
    fn hypothesis_prefers_family_then_party_then_state() {
        let a = EntityMetadata::new("A", "Pat Lee").with_surname("Lee").with_party("D").with_state("CA");
        let b = EntityMetadata::new("B", "Sam Lee").with_surname("lee").with_party("R").with_state("CA");
        let c = EntityMetadata::new("C", "Kim Park").with_surname("Park").with_party("D").with_state("TX");
        let d = EntityMetadata::new("D", "Ray Ortiz").with_surname("Ortiz").with_party("I").with_state("CA");
        let e = EntityMetadata::new("E", "Lu Chen").with_party("G");

        assert_eq!(EdgeHypothesis::classify(Some(&a), Some(&b)), EdgeHypothesis::Family);
        assert_eq!(EdgeHypothesis::classify(Some(&a), Some(&c)), EdgeHypothesis::Party);
        assert_eq!(EdgeHypothesis::classify(Some(&c), Some(&d)), EdgeHypothesis::Unexplained);
        assert_eq!(EdgeHypothesis::classify(Some(&a), Some(&d)), EdgeHypothesis::State);
        assert_eq!(EdgeHypothesis::classify(Some(&a), Some(&e)), EdgeHypothesis::Unexplained);
        assert_eq!(EdgeHypothesis::classify(None, Some(&a)), EdgeHypothesis::Unexplained);
    }

    // ============================================
    // Network Tests
    // ============================================

    #[test]
    fn correlated_pair_clusters_and_independent_entity_does_not() {
        let base = random_activity(365, 21);
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let twin: Vec<f64> = base
            .iter()
            .map(|v| if *v > 0.0 { v + f64::from(rng.gen_range(0..2)) } else { 0.0 })
            .collect();
        let inputs = vec![
            input("E1", base),
            input("E2", twin),
            input("E3", random_activity(365, 99)),
        ];

        let network = NetworkAnalyzer::default().analyze(&inputs, 0.5).unwrap();

        assert_eq!(network.edges.len(), 1);
        assert!(network.edges[0].touches("E1") && network.edges[0].touches("E2"));
        assert_eq!(network.clusters.len(), 1);
        let mut members = network.clusters[0].members.clone();
        members.sort();
        assert_eq!(members, vec!["E1".to_string(), "E2".to_string()]);
        assert!(network.cluster_of("E3").is_none());
        assert_eq!(network.metrics.connected_components, 2);
        assert!(network.centrality.iter().all(|c| (0.0..=1.0).contains(&c.influence)));
    }

    #[test]
    fn every_edge_clears_threshold_and_is_bounded() {
        let inputs: Vec<NetworkInput> = (0..6)
            .map(|i| input(&format!("E{i}"), random_activity(200, i)))
            .collect();
        let network = NetworkAnalyzer::default().analyze(&inputs, 0.1).unwrap();

        for edge in &network.edges {
            assert!(edge.coefficient.abs() >= 0.1);
            assert!((-1.0..=1.0).contains(&edge.coefficient));
            assert!((0.0..=1.0).contains(&edge.p_value));
        }
    }

    #[test]
    fn sparse_pairs_are_skipped() {
        let mut a = vec![0.0; 100];
        let mut b = vec![0.0; 100];
        for i in 0..5 {
            a[i * 10] = 1.0;
            b[i * 10] = 1.0;
        }
        let network = NetworkAnalyzer::default()
            .analyze(&[input("A", a), input("B", b)], 0.5)
            .unwrap();
        assert_eq!(network.pairs_evaluated, 0);
        assert!(network.edges.is_empty());
    }

    #[test]
    fn fewer_than_three_nodes_gives_empty_metrics() {
        let x = random_activity(100, 1);
        let network = NetworkAnalyzer::default()
            .analyze(&[input("A", x.clone()), input("B", x)], 0.5)
            .unwrap();

        assert_eq!(network.edges.len(), 1);
        assert!(network.clusters.is_empty());
        assert!(network.centrality.is_empty());
        assert_eq!(network.metrics.node_count, 2);
        assert_eq!(network.metrics.modularity, 0.0);
    }

    #[test]
    fn entity_cap_truncates() {
        let analyzer = NetworkAnalyzer::new(NetworkConfig {
            max_entities: 3,
            ..NetworkConfig::default()
        });
        let inputs: Vec<NetworkInput> = (0..5)
            .map(|i| input(&format!("E{i}"), random_activity(50, i)))
            .collect();
        let network = analyzer.analyze(&inputs, 0.5).unwrap();

        assert!(network.truncated);
        assert_eq!(network.entities.len(), 3);
    }

    #[test]
    fn threshold_out_of_range_is_invalid() {
        assert!(matches!(
            NetworkAnalyzer::default().analyze(&[], 1.5),
            Err(AnalyticsError::InvalidParameter(_))
        ));
    }

    // ============================================
    // Graph Algorithm Tests
    // ============================================

    #[test]
    fn path_centre_has_full_betweenness() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let b = g.betweenness();
        assert!((b[1] - 1.0).abs() < 1e-12);
        assert_eq!(b[0], 0.0);
        assert_eq!(b[2], 0.0);
    }

    #[test]
    fn star_centre_leads_eigenvector() {
        let g = graph(5, &[(0, 1), (0, 2), (0, 3), (0, 4)]);
        let e = g.eigenvector();
        assert!((e[0] - 1.0).abs() < 1e-9);
        assert!(e[1] < 1.0 && e[1] > 0.0);
    }

    #[test]
    fn louvain_separates_two_triangles() {
        let g = graph(6, &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)]);
        let membership = louvain(&g.weights);

        assert_eq!(membership[0], membership[1]);
        assert_eq!(membership[1], membership[2]);
        assert_eq!(membership[3], membership[4]);
        assert_eq!(membership[4], membership[5]);
        assert_ne!(membership[0], membership[3]);
        assert!(modularity(&g.weights, &membership) > 0.3);
    }

    #[test]
    fn clustering_and_density() {
        let triangle = graph(3, &[(0, 1), (1, 2), (0, 2)]);
        assert!((triangle.average_clustering() - 1.0).abs() < 1e-12);
        assert!((triangle.density() - 1.0).abs() < 1e-12);
        assert_eq!(triangle.connected_components(), 1);

        let path = graph(4, &[(0, 1), (2, 3)]);
        assert_eq!(path.average_clustering(), 0.0);
        assert_eq!(path.connected_components(), 2);
    }

    #[test]
    fn dominant_attribute_requires_majority() {
        let a = EntityMetadata::new("A", "A").with_party("D").with_state("CA");
        let b = EntityMetadata::new("B", "B").with_party("D").with_state("NY");
        let c = EntityMetadata::new("C", "C").with_party("R").with_state("TX");

        let attr = dominant_attribute(&[Some(&a), Some(&b), Some(&c)]).unwrap();
        assert_eq!(attr.kind, AttributeKind::Party);
        assert_eq!(attr.value, "D");
        assert!(dominant_attribute(&[Some(&a), Some(&c)]).is_none());
    }
}
