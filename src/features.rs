//! Feature extraction
//!
//! Aggregates trailing windows of eye metrics into the fixed 21-dimensional
//! vector the fatigue classifier consumes. Optionally applies a z-score
//! standardization loaded from a scaler file exported alongside the model.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::error::EngineError;

/// Length of the extracted feature vector
pub const FEATURE_COUNT: usize = 21;

/// Feature names, in extraction order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ear_mean",
    "ear_std",
    "ear_min",
    "ear_max",
    "ear_median",
    "ear_skewness",
    "ear_kurtosis",
    "ear_trend",
    "blink_rate_mean",
    "blink_rate_std",
    "blink_rate_min",
    "blink_rate_max",
    "blink_rate_trend",
    "gaze_stability_mean",
    "gaze_stability_std",
    "gaze_stability_min",
    "session_duration_minutes",
    "session_duration_log",
    "ear_blink_interaction",
    "low_blink_indicator",
    "low_ear_indicator",
];

/// Extracted feature vector ready for inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    /// Whether scaler standardization was applied
    pub normalized: bool,
}

/// Per-feature z-score parameters, serialized as exported by training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Load scaler parameters from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::ScalerUnavailable(format!("{}: {e}", path.display()))
        })?;
        let scaler: StandardScaler = serde_json::from_str(&raw)?;
        if scaler.mean.len() != scaler.scale.len() {
            return Err(EngineError::DimensionMismatch {
                expected: scaler.mean.len(),
                actual: scaler.scale.len(),
            });
        }
        Ok(scaler)
    }

    /// Write scaler parameters to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), raw)
            .map_err(|e| EngineError::ScalerUnavailable(e.to_string()))
    }

    /// Standardize a vector in place: `(x - mean) / scale`, skipping any
    /// dimension whose scale is zero.
    pub fn transform(&self, values: &mut [f64]) -> Result<(), EngineError> {
        if values.len() != self.mean.len() {
            return Err(EngineError::DimensionMismatch {
                expected: self.mean.len(),
                actual: values.len(),
            });
        }
        for (i, v) in values.iter_mut().enumerate() {
            if self.scale[i] != 0.0 {
                *v = (*v - self.mean[i]) / self.scale[i];
            }
        }
        Ok(())
    }
}

/// Windowed feature extractor over per-frame metrics
#[derive(Debug)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    ear_values: VecDeque<f64>,
    blink_rates: VecDeque<f64>,
    gaze_stabilities: VecDeque<f64>,
    session_durations: VecDeque<f64>,
    scaler: Option<StandardScaler>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let cap = config.window_size;
        Self {
            config,
            ear_values: VecDeque::with_capacity(cap),
            blink_rates: VecDeque::with_capacity(cap),
            gaze_stabilities: VecDeque::with_capacity(cap),
            session_durations: VecDeque::with_capacity(cap),
            scaler: None,
        }
    }

    /// Install a scaler. The length must match the feature count.
    pub fn set_scaler(&mut self, scaler: StandardScaler) -> Result<(), EngineError> {
        if scaler.mean.len() != FEATURE_COUNT {
            return Err(EngineError::DimensionMismatch {
                expected: FEATURE_COUNT,
                actual: scaler.mean.len(),
            });
        }
        self.scaler = Some(scaler);
        Ok(())
    }

    /// Whether extracted vectors will be standardized.
    pub fn is_normalizing(&self) -> bool {
        self.scaler.is_some()
    }

    /// Append one frame's metrics. All four buffers advance together so
    /// indices stay aligned.
    pub fn add_data_point(
        &mut self,
        ear: f64,
        blink_rate: f64,
        gaze_stability: f64,
        session_duration_secs: f64,
    ) {
        while self.ear_values.len() >= self.config.window_size {
            self.ear_values.pop_front();
            self.blink_rates.pop_front();
            self.gaze_stabilities.pop_front();
            self.session_durations.pop_front();
        }
        self.ear_values.push_back(ear);
        self.blink_rates.push_back(blink_rate);
        self.gaze_stabilities.push_back(gaze_stability);
        self.session_durations.push_back(session_duration_secs);
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.ear_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ear_values.is_empty()
    }

    /// Extract the 21-feature vector, or `None` below the minimum sample
    /// count.
    pub fn extract(&self) -> Option<FeatureVector> {
        if self.ear_values.len() < self.config.min_samples {
            return None;
        }

        let ears: Vec<f64> = self.ear_values.iter().copied().collect();
        let blinks: Vec<f64> = self.blink_rates.iter().copied().collect();
        let gazes: Vec<f64> = self.gaze_stabilities.iter().copied().collect();

        let ear_mean = mean(&ears);
        let ear_std = std_dev(&ears, ear_mean);
        let blink_mean = mean(&blinks);
        let gaze_mean = mean(&gazes);

        let duration_secs = self.session_durations.back().copied().unwrap_or(0.0);
        let duration_minutes = duration_secs / 60.0;

        let mut values = Vec::with_capacity(FEATURE_COUNT);

        values.push(ear_mean);
        values.push(ear_std);
        values.push(min(&ears));
        values.push(max(&ears));
        values.push(median(&ears));
        values.push(skewness(&ears, ear_mean, ear_std));
        values.push(kurtosis(&ears, ear_mean, ear_std));
        values.push(trend_slope(&ears));

        values.push(blink_mean);
        values.push(std_dev(&blinks, blink_mean));
        values.push(min(&blinks));
        values.push(max(&blinks));
        values.push(trend_slope(&blinks));

        values.push(gaze_mean);
        values.push(std_dev(&gazes, gaze_mean));
        values.push(min(&gazes));

        values.push(duration_minutes);
        values.push(duration_secs.ln_1p());

        values.push(ear_mean * blink_mean);
        values.push(if blink_mean < 10.0 { 1.0 } else { 0.0 });
        values.push(if ear_mean < 0.25 { 1.0 } else { 0.0 });

        let normalized = if let Some(scaler) = &self.scaler {
            // Length was validated at install time
            scaler.transform(&mut values).is_ok()
        } else {
            false
        };

        Some(FeatureVector { values, normalized })
    }

    /// Clear all buffered samples. The scaler stays installed.
    pub fn reset(&mut self) {
        self.ear_values.clear();
        self.blink_rates.clear();
        self.gaze_stabilities.clear();
        self.session_durations.clear();
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn median(values: &[f64]) -> f64 {
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

/// Population skewness (third standardized moment); 0 when std is 0.
fn skewness(values: &[f64], mean: f64, std: f64) -> f64 {
    if std == 0.0 || values.is_empty() {
        return 0.0;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std).powi(3))
        .sum::<f64>()
        / values.len() as f64
}

/// Population excess kurtosis (Fisher); 0 when std is 0.
fn kurtosis(values: &[f64], mean: f64, std: f64) -> f64 {
    if std == 0.0 || values.is_empty() {
        return 0.0;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std).powi(4))
        .sum::<f64>()
        / values.len() as f64
        - 3.0
}

/// Ordinary least squares slope of values against their index; 0 below two
/// samples or when indices are degenerate.
fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filled_extractor(samples: usize) -> FeatureExtractor {
        let mut extractor = FeatureExtractor::default();
        for i in 0..samples {
            extractor.add_data_point(0.3 - 0.001 * i as f64, 15.0, 0.9, 120.0 + i as f64);
        }
        extractor
    }

    #[test]
    fn test_extract_requires_min_samples() {
        let extractor = filled_extractor(9);
        assert!(extractor.extract().is_none());

        let extractor = filled_extractor(10);
        let vector = extractor.extract().unwrap();
        assert_eq!(vector.values.len(), FEATURE_COUNT);
        assert!(!vector.normalized);
    }

    #[test]
    fn test_feature_names_match_count() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_buffers_bounded_by_window() {
        let extractor = filled_extractor(100);
        assert_eq!(extractor.len(), 30);
    }

    #[test]
    fn test_known_feature_values() {
        let mut extractor = FeatureExtractor::default();
        for _ in 0..10 {
            extractor.add_data_point(0.25, 15.0, 0.9, 300.0);
        }
        let v = extractor.extract().unwrap().values;

        assert!((v[0] - 0.25).abs() < 1e-9); // ear_mean
        assert!(v[1].abs() < 1e-9); // ear_std: constant input
        assert!((v[2] - 0.25).abs() < 1e-9); // ear_min
        assert!((v[3] - 0.25).abs() < 1e-9); // ear_max
        assert!((v[4] - 0.25).abs() < 1e-9); // ear_median
        assert!(v[5].abs() < 1e-9); // skewness with zero std
        assert!(v[6].abs() < 1e-9); // kurtosis with zero std
        assert!(v[7].abs() < 1e-9); // trend of a constant
        assert!((v[8] - 15.0).abs() < 1e-9); // blink_rate_mean
        assert!((v[16] - 5.0).abs() < 1e-9); // duration minutes
        assert!((v[17] - 300.0_f64.ln_1p()).abs() < 1e-9); // log of seconds
        assert!((v[18] - 0.25 * 15.0).abs() < 1e-9); // interaction
        assert_eq!(v[19], 0.0); // blink rate not low
        assert_eq!(v[20], 0.0); // ear not low
    }

    #[test]
    fn test_duration_log_is_of_seconds() {
        let mut extractor = FeatureExtractor::default();
        for _ in 0..10 {
            extractor.add_data_point(0.3, 15.0, 0.9, 300.0);
        }
        let v = extractor.extract().unwrap().values;

        // Minutes and the log feature come from the same raw duration, but
        // the log is taken over seconds
        assert!((v[16] - 5.0).abs() < 1e-9);
        assert!((v[17] - 300.0_f64.ln_1p()).abs() < 1e-9);
        assert!((v[17] - 5.707110264748875).abs() < 1e-9);
    }

    #[test]
    fn test_low_indicators() {
        let mut extractor = FeatureExtractor::default();
        for _ in 0..10 {
            extractor.add_data_point(0.2, 6.0, 0.9, 60.0);
        }
        let v = extractor.extract().unwrap().values;
        assert_eq!(v[19], 1.0);
        assert_eq!(v[20], 1.0);
    }

    #[test]
    fn test_trend_slope_linear_input() {
        let values: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        assert!((trend_slope(&values) - 2.0).abs() < 1e-9);
        assert_eq!(trend_slope(&[1.0]), 0.0);
        assert_eq!(trend_slope(&[]), 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_kurtosis_of_normal_like_spread() {
        // Symmetric two-point distribution has excess kurtosis -2
        let values = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let m = mean(&values);
        let s = std_dev(&values, m);
        assert!((kurtosis(&values, m, s) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = StandardScaler {
            mean: vec![1.0, 2.0, 0.0],
            scale: vec![2.0, 0.0, 1.0],
        };
        let mut values = vec![3.0, 5.0, 4.0];
        scaler.transform(&mut values).unwrap();
        assert_eq!(values, vec![1.0, 5.0, 4.0]); // zero scale skipped
    }

    #[test]
    fn test_scaler_dimension_mismatch() {
        let scaler = StandardScaler {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        let mut values = vec![1.0, 2.0];
        assert!(matches!(
            scaler.transform(&mut values),
            Err(EngineError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_set_scaler_validates_length() {
        let mut extractor = FeatureExtractor::default();
        let bad = StandardScaler {
            mean: vec![0.0; 5],
            scale: vec![1.0; 5],
        };
        assert!(extractor.set_scaler(bad).is_err());
        assert!(!extractor.is_normalizing());

        let good = StandardScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        };
        extractor.set_scaler(good).unwrap();
        assert!(extractor.is_normalizing());
    }

    #[test]
    fn test_extract_applies_scaler() {
        let mut extractor = filled_extractor(10);
        let scaler = StandardScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![2.0; FEATURE_COUNT],
        };
        extractor.set_scaler(scaler).unwrap();

        let raw = {
            let plain = filled_extractor(10);
            plain.extract().unwrap().values
        };
        let scaled = extractor.extract().unwrap();
        assert!(scaled.normalized);
        for (r, s) in raw.iter().zip(scaled.values.iter()) {
            assert!((r / 2.0 - s).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reset_keeps_scaler() {
        let mut extractor = filled_extractor(10);
        let scaler = StandardScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        };
        extractor.set_scaler(scaler).unwrap();
        extractor.reset();
        assert!(extractor.is_empty());
        assert!(extractor.is_normalizing());
    }

    #[test]
    fn test_scaler_load_missing_file() {
        let result = StandardScaler::load("/nonexistent/scaler.json");
        assert!(matches!(result, Err(EngineError::ScalerUnavailable(_))));
    }

    #[test]
    fn test_scaler_save_and_load() {
        let dir = std::env::temp_dir().join("ocuguard_scaler_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scaler.json");

        let scaler = StandardScaler {
            mean: vec![1.0, 2.0],
            scale: vec![0.5, 1.5],
        };
        scaler.save(&path).unwrap();
        let loaded = StandardScaler::load(&path).unwrap();
        assert_eq!(loaded.mean, scaler.mean);
        assert_eq!(loaded.scale, scaler.scale);

        std::fs::remove_file(&path).ok();
    }
}
