//! Cyclical pattern detection via spectral analysis.
//!
//! The series is linearly detrended, transformed with a discrete Fourier
//! transform, and the one-sided power spectrum is scanned for local maxima
//! that stand out from the median noise floor. Each surviving peak becomes a
//! `CyclicalPattern` provided at least `min_cycles` full cycles fit inside the
//! analysed window.
//!
//! The detected components can be recombined with the trend into a forecast.
//! Statistics derived from a forecast slice check the forecast length before
//! indexing and report `ForecastComparison::Insufficient` rather than
//! comparing empty slices.

use std::f64::consts::PI;

use disclosure_core::stats::{linear_fit, mean, median, std_dev};
use disclosure_core::{AnalyticsError, AnalyticsResult, CyclicalConfig};
use serde::{Deserialize, Serialize};

/// SNR at which the signal-to-noise component of confidence saturates.
const SNR_SATURATION: f64 = 100.0;
/// Cycles observed at which the cycle-count component of confidence saturates.
const CYCLES_SATURATION: f64 = 10.0;

/// Calendar category of a detected period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleCategory {
    Weekly,
    Monthly,
    Quarterly,
    Annual,
    Other,
}

impl CycleCategory {
    /// Classifies a period length in days.
    #[must_use]
    pub fn from_period(days: f64) -> Self {
        match days {
            d if (5.0..=9.0).contains(&d) => Self::Weekly,
            d if (18.0..=34.0).contains(&d) => Self::Monthly,
            d if (75.0..=105.0).contains(&d) => Self::Quarterly,
            d if (240.0..=270.0).contains(&d) => Self::Annual,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
            Self::Other => "other",
        }
    }
}

/// One detected periodicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclicalPattern {
    /// Period length in days
    pub period_days: f64,
    /// Cycles per day
    pub frequency: f64,
    /// Share of non-DC spectral power carried by this peak, 0..1
    pub strength: f64,
    /// Confidence from sharpness, signal-to-noise, and cycles observed, 0..1
    pub confidence: f64,
    /// Full cycles inside the analysed window
    pub cycles_observed: f64,
    pub category: CycleCategory,
    /// Peak-to-mean amplitude in activity units
    pub amplitude: f64,
    /// Phase in radians relative to the window start
    pub phase: f64,
    /// Fourier bin of the peak
    pub bin: usize,
}

/// Result of a cyclical analysis over one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclicalAnalysis {
    /// Patterns sorted by strength descending; may be empty
    pub patterns: Vec<CyclicalPattern>,
    /// Samples analysed (after the `max_points` cap)
    pub series_length: usize,
    pub bucket_days: u32,
    pub trend_slope: f64,
    pub trend_intercept: f64,
}

impl CyclicalAnalysis {
    /// Period of the strongest pattern, if any.
    #[must_use]
    pub fn dominant_period(&self) -> Option<f64> {
        self.patterns.first().map(|p| p.period_days)
    }

    /// True when at least one pattern was found.
    #[must_use]
    pub fn has_patterns(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Strength-weighted confidence over the patterns used for forecasting.
    #[must_use]
    pub fn forecast_confidence(&self, components: usize) -> f64 {
        let used = &self.patterns[..components.min(self.patterns.len())];
        let total: f64 = used.iter().map(|p| p.strength).sum();
        if total < f64::EPSILON {
            return 0.0;
        }
        (used.iter().map(|p| p.strength * p.confidence).sum::<f64>() / total).clamp(0.0, 1.0)
    }

    /// Extrapolates the top `components` cycles plus the linear trend.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `horizon` is zero or exceeds three
    /// times the analysed series length.
    pub fn forecast(&self, horizon: usize, components: usize) -> AnalyticsResult<CycleForecast> {
        let n = self.series_length;
        if horizon == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "forecast horizon must be at least 1".to_string(),
            ));
        }
        if horizon > 3 * n {
            return Err(AnalyticsError::InvalidParameter(format!(
                "forecast horizon {horizon} exceeds 3x series length {n}"
            )));
        }

        let used = &self.patterns[..components.min(self.patterns.len())];
        let values: Vec<f64> = (n..n + horizon)
            .map(|t| {
                let t_f = t as f64;
                let trend = self.trend_intercept + self.trend_slope * t_f;
                let cycles: f64 = used
                    .iter()
                    .map(|p| p.amplitude * (2.0 * PI * p.bin as f64 * t_f / n as f64 + p.phase).cos())
                    .sum();
                trend + cycles
            })
            .collect();

        let peak_index = first_prominent_peak(&values);
        Ok(CycleForecast {
            values,
            components: used.len(),
            peak_index,
        })
    }
}

/// Forecast reconstructed from detected cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleForecast {
    /// Forecast values for steps 1..=horizon after the series end
    pub values: Vec<f64>,
    /// Number of cycles used in the reconstruction
    pub components: usize,
    /// First prominent local maximum inside the horizon
    pub peak_index: Option<usize>,
}

/// Half-over-half comparison of a forecast slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastComparison {
    Computed {
        first_half_mean: f64,
        second_half_mean: f64,
        change: f64,
    },
    /// The forecast is shorter than the statistic requires.
    Insufficient { required: usize, available: usize },
}

impl CycleForecast {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of `values[start..end]`, or `None` when the slice is empty or out of bounds.
    #[must_use]
    pub fn window_mean(&self, start: usize, end: usize) -> Option<f64> {
        if start >= end {
            return None;
        }
        self.values.get(start..end).map(mean)
    }

    /// Compares the first and second halves of the first `required_len` steps.
    ///
    /// Returns `Insufficient` when the forecast holds fewer than `required_len`
    /// values or `required_len < 2`.
    #[must_use]
    pub fn half_comparison(&self, required_len: usize) -> ForecastComparison {
        let insufficient = ForecastComparison::Insufficient {
            required: required_len.max(2),
            available: self.values.len(),
        };
        if required_len < 2 || self.values.len() < required_len {
            return insufficient;
        }

        let mid = required_len / 2;
        match (self.window_mean(0, mid), self.window_mean(mid, required_len)) {
            (Some(first), Some(second)) => ForecastComparison::Computed {
                first_half_mean: first,
                second_half_mean: second,
                change: second - first,
            },
            _ => insufficient,
        }
    }
}

/// Spectral cyclical pattern detector.
#[derive(Debug, Clone, Default)]
pub struct CyclicalDetector {
    config: CyclicalConfig,
}

impl CyclicalDetector {
    #[must_use]
    pub fn new(config: CyclicalConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CyclicalConfig {
        &self.config
    }

    /// Minimum series length for any period to satisfy the cycle requirement.
    #[must_use]
    pub fn min_length(&self) -> usize {
        ((2.0 * self.config.min_cycles).ceil() as usize).max(8)
    }

    /// Detects dominant periodicities in `values`.
    ///
    /// An empty pattern list is a normal outcome.
    ///
    /// # Errors
    /// Returns `InsufficientData` when the series is too short for any period
    /// to be observed `min_cycles` times.
    pub fn detect(&self, values: &[f64], bucket_days: u32) -> AnalyticsResult<CyclicalAnalysis> {
        let min_len = self.min_length();
        if values.len() < min_len {
            return Err(AnalyticsError::insufficient("cyclical", min_len, values.len()));
        }

        let start = values.len().saturating_sub(self.config.max_points.max(min_len));
        let window = &values[start..];
        let n = window.len();
        let bucket = f64::from(bucket_days.max(1));

        let (slope, intercept) = linear_fit(window);
        let detrended: Vec<f64> = window
            .iter()
            .enumerate()
            .map(|(i, v)| v - (intercept + slope * i as f64))
            .collect();

        let spectrum = power_spectrum(&detrended);
        let mut analysis = CyclicalAnalysis {
            patterns: Vec::new(),
            series_length: n,
            bucket_days: bucket_days.max(1),
            trend_slope: slope,
            trend_intercept: intercept,
        };

        // Bins 1..=n/2; index 0 is DC and is ignored.
        let powers: Vec<f64> = spectrum.iter().skip(1).map(|c| c.power).collect();
        let total_power: f64 = powers.iter().sum();
        let max_power = powers.iter().copied().fold(0.0_f64, f64::max);
        if total_power < 1e-12 || max_power < 1e-12 {
            tracing::debug!(n, "Flat spectrum, no cyclical patterns");
            return Ok(analysis);
        }
        let noise_floor = median(&powers).max(max_power * 1e-9);

        for k in 1..spectrum.len() {
            let p = spectrum[k].power;
            let left = if k > 1 { spectrum[k - 1].power } else { 0.0 };
            let right = spectrum.get(k + 1).map_or(0.0, |c| c.power);
            if !(p > left && p >= right) {
                continue;
            }

            let snr = p / noise_floor;
            if p < self.config.min_relative_power * max_power || snr < self.config.min_snr {
                continue;
            }

            let refined_bin = refine_peak(k, &spectrum);
            let cycles = refined_bin;
            if cycles < self.config.min_cycles {
                continue;
            }

            let period_buckets = n as f64 / refined_bin;
            let period_days = period_buckets * bucket;

            let sharpness = peak_sharpness(k, &spectrum);
            let snr_score = (snr.ln() / SNR_SATURATION.ln()).clamp(0.0, 1.0);
            let cycles_score = (cycles / CYCLES_SATURATION).min(1.0);
            let confidence = (0.4 * snr_score + 0.3 * sharpness + 0.3 * cycles_score).clamp(0.0, 1.0);

            let coeff = &spectrum[k];
            analysis.patterns.push(CyclicalPattern {
                period_days,
                frequency: 1.0 / period_days,
                strength: (p / total_power).clamp(0.0, 1.0),
                confidence,
                cycles_observed: cycles,
                category: CycleCategory::from_period(period_days),
                amplitude: 2.0 * (coeff.re.hypot(coeff.im)) / n as f64,
                phase: coeff.im.atan2(coeff.re),
                bin: k,
            });
        }

        analysis.patterns.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        analysis.patterns.truncate(self.config.max_patterns);

        tracing::debug!(
            n,
            patterns = analysis.patterns.len(),
            dominant = ?analysis.dominant_period(),
            "Cyclical detection complete"
        );
        Ok(analysis)
    }
}

#[derive(Debug, Clone, Copy)]
struct SpectralBin {
    re: f64,
    im: f64,
    power: f64,
}

/// One-sided DFT of a real series, bins 0..=n/2.
fn power_spectrum(values: &[f64]) -> Vec<SpectralBin> {
    let n = values.len();
    let half = n / 2;
    let mut bins = Vec::with_capacity(half + 1);

    for k in 0..=half {
        let step = 2.0 * PI * k as f64 / n as f64;
        let (step_sin, step_cos) = step.sin_cos();
        // Rotate (cos, sin) incrementally instead of calling trig per sample
        let (mut c, mut s) = (1.0_f64, 0.0_f64);
        let mut re = 0.0;
        let mut im = 0.0;
        for &x in values {
            re += x * c;
            im -= x * s;
            let next_c = c * step_cos - s * step_sin;
            s = s * step_cos + c * step_sin;
            c = next_c;
        }
        bins.push(SpectralBin {
            re,
            im,
            power: (re * re + im * im) / n as f64,
        });
    }

    bins
}

/// Parabolic interpolation of a peak's bin position.
fn refine_peak(k: usize, spectrum: &[SpectralBin]) -> f64 {
    if k == 0 || k + 1 >= spectrum.len() {
        return k as f64;
    }
    let (left, right) = (spectrum[k - 1], spectrum[k + 1]);
    let centre = spectrum[k].power;
    let denom = left.power - 2.0 * centre + right.power;
    if denom.abs() < 1e-12 {
        return k as f64;
    }
    let delta = (0.5 * (left.power - right.power) / denom).clamp(-0.5, 0.5);
    (k as f64 + delta).max(0.5)
}

/// 1 minus the mean power of the two bins either side relative to the peak.
fn peak_sharpness(k: usize, spectrum: &[SpectralBin]) -> f64 {
    let peak = spectrum[k].power;
    if peak <= 0.0 {
        return 0.0;
    }
    let neighbours: Vec<f64> = [k.checked_sub(2), k.checked_sub(1), Some(k + 1), Some(k + 2)]
        .into_iter()
        .flatten()
        .filter(|&j| j >= 1)
        .filter_map(|j| spectrum.get(j).map(|b| b.power))
        .collect();
    if neighbours.is_empty() {
        return 0.0;
    }
    (1.0 - mean(&neighbours) / peak).clamp(0.0, 1.0)
}

/// First interior local maximum that rises half a standard deviation above the mean.
fn first_prominent_peak(values: &[f64]) -> Option<usize> {
    if values.len() < 3 {
        return None;
    }
    let bar = mean(values) + 0.5 * std_dev(values);
    (1..values.len() - 1).find(|&i| {
        values[i] > values[i - 1] && values[i] >= values[i + 1] && values[i] > bar
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
        // Box-Muller
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn sinusoid(n: usize, period: f64, amplitude: f64, noise: f64, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|t| {
                20.0 + amplitude * (2.0 * PI * t as f64 / period).sin() + noise * gaussian(&mut rng)
            })
            .collect()
    }

    // ============================================
    // Category Tests
    // ============================================

    #[test]
    fn category_boundaries() {
        assert_eq!(CycleCategory::from_period(7.0), CycleCategory::Weekly);
        assert_eq!(CycleCategory::from_period(21.0), CycleCategory::Monthly);
        assert_eq!(CycleCategory::from_period(91.0), CycleCategory::Quarterly);
        assert_eq!(CycleCategory::from_period(252.0), CycleCategory::Annual);
        assert_eq!(CycleCategory::from_period(14.0), CycleCategory::Other);
        assert_eq!(CycleCategory::from_period(365.0), CycleCategory::Other);
    }

    // ============================================
    // Detection Tests
    // ============================================

    #[test]
    fn recovers_21_day_cycle_with_high_confidence() {
        let values = sinusoid(400, 21.0, 10.0, 1.0, 7);
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();

        let dominant = analysis.patterns.first().expect("a pattern");
        assert!(
            (dominant.period_days - 21.0).abs() <= 2.0,
            "period was {}",
            dominant.period_days
        );
        assert!(dominant.confidence > 0.7, "confidence was {}", dominant.confidence);
        assert_eq!(dominant.category, CycleCategory::Monthly);
        assert!(dominant.cycles_observed >= 3.0);
    }

    #[test]
    fn never_reports_fewer_than_three_cycles() {
        // A 100-day cycle over 250 days is only 2.5 cycles.
        let values = sinusoid(250, 100.0, 10.0, 0.2, 3);
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();

        assert!(
            analysis.patterns.iter().all(|p| p.cycles_observed >= 3.0 - 1e-9),
            "{:?}",
            analysis.patterns
        );
        assert!(analysis
            .patterns
            .iter()
            .all(|p| p.period_days <= 250.0 / 3.0 + 1e-9));
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let values: Vec<f64> = (0..300).map(|_| gaussian(&mut rng).abs() * 3.0).collect();
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();

        for p in &analysis.patterns {
            assert!((0.0..=1.0).contains(&p.strength));
            assert!((0.0..=1.0).contains(&p.confidence));
        }
    }

    #[test]
    fn flat_series_yields_no_patterns() {
        let analysis = CyclicalDetector::default().detect(&[4.0; 120], 1).unwrap();
        assert!(analysis.patterns.is_empty());
        assert_eq!(analysis.dominant_period(), None);
    }

    #[test]
    fn pure_trend_yields_no_patterns() {
        let values: Vec<f64> = (0..200).map(|i| i as f64 * 0.3).collect();
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();
        assert!(analysis.patterns.is_empty());
    }

    #[test]
    fn short_series_is_insufficient() {
        let err = CyclicalDetector::default().detect(&[1.0, 2.0, 3.0], 1).unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientData { .. }));
    }

    #[test]
    fn bucket_width_scales_period() {
        // 4-bucket cycle on weekly buckets is a 28-day cycle.
        let values = sinusoid(120, 4.0, 5.0, 0.1, 11);
        let analysis = CyclicalDetector::default().detect(&values, 7).unwrap();
        let dominant = analysis.patterns.first().unwrap();
        assert!((dominant.period_days - 28.0).abs() < 2.0);
    }

    // ============================================
    // Forecast Tests
    // ============================================

    #[test]
    fn forecast_continues_the_cycle() {
        let wave = |t: usize| 20.0 + 10.0 * (2.0 * PI * t as f64 / 21.0).cos();
        let values: Vec<f64> = (0..420).map(wave).collect();
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();
        let forecast = analysis.forecast(42, 3).unwrap();

        assert_eq!(forecast.len(), 42);
        for (h, predicted) in forecast.values.iter().enumerate() {
            let actual = wave(420 + h);
            assert!((predicted - actual).abs() < 0.5, "step {h}: {predicted} vs {actual}");
        }
        assert!(forecast.peak_index.is_some());
    }

    #[test]
    fn forecast_horizon_bounded_by_three_times_length() {
        let values = sinusoid(100, 10.0, 5.0, 0.1, 2);
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();

        assert!(analysis.forecast(300, 3).is_ok());
        assert!(matches!(
            analysis.forecast(301, 3),
            Err(AnalyticsError::InvalidParameter(_))
        ));
        assert!(matches!(
            analysis.forecast(0, 3),
            Err(AnalyticsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn half_comparison_reports_insufficient_length() {
        let forecast = CycleForecast {
            values: vec![1.0; 10],
            components: 1,
            peak_index: None,
        };

        assert_eq!(
            forecast.half_comparison(30),
            ForecastComparison::Insufficient {
                required: 30,
                available: 10
            }
        );
    }

    #[test]
    fn half_comparison_on_empty_forecast_is_insufficient() {
        let forecast = CycleForecast {
            values: Vec::new(),
            components: 0,
            peak_index: None,
        };
        assert!(matches!(
            forecast.half_comparison(2),
            ForecastComparison::Insufficient { available: 0, .. }
        ));
        assert_eq!(forecast.window_mean(0, 5), None);
    }

    #[test]
    fn half_comparison_computes_when_long_enough() {
        let forecast = CycleForecast {
            values: (0..30).map(|i| if i < 15 { 1.0 } else { 3.0 }).collect(),
            components: 1,
            peak_index: None,
        };

        match forecast.half_comparison(30) {
            ForecastComparison::Computed {
                first_half_mean,
                second_half_mean,
                change,
            } => {
                assert!((first_half_mean - 1.0).abs() < 1e-12);
                assert!((second_half_mean - 3.0).abs() < 1e-12);
                assert!((change - 2.0).abs() < 1e-12);
            }
            other => panic!("expected computed comparison, got {other:?}"),
        }
    }

    #[test]
    fn forecast_confidence_weights_by_strength() {
        let values = sinusoid(400, 21.0, 10.0, 1.0, 5);
        let analysis = CyclicalDetector::default().detect(&values, 1).unwrap();
        let confidence = analysis.forecast_confidence(3);
        assert!((0.0..=1.0).contains(&confidence));
        assert!(confidence > 0.5);
    }
}
