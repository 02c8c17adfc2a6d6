//! Statistical helpers shared by the analytics components.
//!
//! Provides descriptive statistics, correlation with significance testing,
//! and the normal CDF approximation used to turn test statistics into
//! p-values and bounded scores.

/// Arithmetic mean; 0.0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0.0 for fewer than 2 values.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    (sum_sq_dev(values, mean(values)) / (values.len() - 1) as f64).sqrt()
}

fn sum_sq_dev(values: &[f64], center: f64) -> f64 {
    values.iter().map(|v| (v - center).powi(2)).sum()
}

/// Median; 0.0 for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Weighted mean and weighted standard deviation.
///
/// Returns `None` when the weights sum to zero or the slices differ in length.
#[must_use]
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    if values.len() != weights.len() || values.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total < f64::EPSILON {
        return None;
    }
    let m = values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total;
    let var = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - m).powi(2))
        .sum::<f64>()
        / total;
    Some((m, var.max(0.0).sqrt()))
}

/// Z-normalizes a sequence. A constant sequence maps to all zeros.
#[must_use]
pub fn z_normalize(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = std_dev(values);
    if sd < 1e-12 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - m) / sd).collect()
}

/// Least-squares line through `(i, values[i])`, returned as `(slope, intercept)`.
#[must_use]
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = mean(values);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (slope, mean_y - slope * mean_x)
}

/// Pearson correlation of two equal-length series, clamped to [-1, 1].
///
/// Mismatched lengths, fewer than 2 points, or a constant side give 0.0.
#[must_use]
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let (mean_x, mean_y) = (mean(x), mean(y));
    let norm = (sum_sq_dev(x, mean_x) * sum_sq_dev(y, mean_y)).sqrt();
    if norm < f64::EPSILON {
        return 0.0;
    }
    let cross: f64 = x.iter().zip(y).map(|(a, b)| (a - mean_x) * (b - mean_y)).sum();
    (cross / norm).clamp(-1.0, 1.0)
}

/// Two-sided p-value of a correlation `r` over `n` pairs.
///
/// The t statistic `r * sqrt((n - 2) / (1 - r^2))` is read against the
/// standard normal, which slightly understates p for small `n`.
#[must_use]
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    let r = r.clamp(-0.9999, 0.9999);
    let t = r * ((n - 2) as f64 / (1.0 - r * r)).sqrt();
    (1.0 - z_to_unit_score(t)).clamp(0.0, 1.0)
}

/// Standard normal CDF, Abramowitz and Stegun 26.2.17 (absolute error below 7.5e-8).
#[must_use]
pub fn standard_normal_cdf(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const B: [f64; 5] = [0.319_381_530, -0.356_563_782, 1.781_477_937, -1.821_255_978, 1.330_274_429];

    let z = x.abs();
    let t = 1.0 / (1.0 + P * z);
    let poly = B.iter().rev().fold(0.0, |acc, b| acc * t + b) * t;
    let upper_tail = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt() * poly;
    if x >= 0.0 {
        1.0 - upper_tail
    } else {
        upper_tail
    }
}

/// Maps a z-score onto [0, 1] as the two-sided probability mass within |z|.
#[must_use]
pub fn z_to_unit_score(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { 0.0 } else { 1.0 };
    }
    (2.0 * standard_normal_cdf(z.abs()) - 1.0).clamp(0.0, 1.0)
}
