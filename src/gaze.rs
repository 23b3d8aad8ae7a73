//! Gaze tracking
//!
//! Consumes per-frame iris centers and eye landmarks, maintains bounded
//! trailing histories of horizontal/vertical gaze ratios, and derives a
//! stability score, a coarse direction, and the length of the current
//! fixation.

use std::collections::VecDeque;

use crate::config::GazeConfig;
use crate::geometry::{gaze_ratio, Point};
use crate::types::{GazeDirection, GazeReading};

/// Samples required before stability is computed from variance
const STABILITY_MIN_SAMPLES: usize = 10;

/// Both-axis deviation bound for two readings to count as the same fixation
const FIXATION_TOLERANCE: f64 = 0.1;

/// Sliding-window gaze tracker
#[derive(Debug)]
pub struct GazeTracker {
    config: GazeConfig,
    horizontal: VecDeque<f64>,
    vertical: VecDeque<f64>,
}

impl GazeTracker {
    pub fn new(config: GazeConfig) -> Self {
        let cap = config.history_size;
        Self {
            config,
            horizontal: VecDeque::with_capacity(cap),
            vertical: VecDeque::with_capacity(cap),
        }
    }

    /// Ingest one frame. Requires both iris centers and both landmark sets;
    /// returns `None` when either eye cannot contribute a ratio.
    pub fn update(
        &mut self,
        left_iris: Option<Point>,
        right_iris: Option<Point>,
        left_eye: &[Point],
        right_eye: &[Point],
    ) -> Option<GazeReading> {
        let left_iris = left_iris?;
        let right_iris = right_iris?;
        if left_eye.is_empty() || right_eye.is_empty() {
            return None;
        }

        let (lh, lv) = gaze_ratio(left_iris, left_eye);
        let (rh, rv) = gaze_ratio(right_iris, right_eye);
        let h = (lh + rh) / 2.0;
        let v = (lv + rv) / 2.0;

        self.push(h, v);

        let (avg_h, avg_v) = self.averages();
        Some(GazeReading {
            avg_horizontal: avg_h,
            avg_vertical: avg_v,
            stability: self.stability(),
            direction: self.classify(avg_h, avg_v),
        })
    }

    fn push(&mut self, h: f64, v: f64) {
        while self.horizontal.len() >= self.config.history_size {
            self.horizontal.pop_front();
            self.vertical.pop_front();
        }
        self.horizontal.push_back(h);
        self.vertical.push_back(v);
    }

    fn averages(&self) -> (f64, f64) {
        let n = self.horizontal.len() as f64;
        let h = self.horizontal.iter().sum::<f64>() / n;
        let v = self.vertical.iter().sum::<f64>() / n;
        (h, v)
    }

    /// Stability in [0, 1] from the variance of the trailing histories.
    ///
    /// `1 / (1 + 100·(var_h + var_v))`; exactly 1.0 below 10 samples.
    pub fn stability(&self) -> f64 {
        let n = self.horizontal.len();
        if n < STABILITY_MIN_SAMPLES {
            return 1.0;
        }

        let var = |values: &VecDeque<f64>| {
            let mean = values.iter().sum::<f64>() / n as f64;
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64
        };

        let score = 1.0 / (1.0 + 100.0 * (var(&self.horizontal) + var(&self.vertical)));
        score.clamp(0.0, 1.0)
    }

    fn classify(&self, h: f64, v: f64) -> GazeDirection {
        let dh = h - 0.5;
        let dv = v - 0.5;
        let threshold = self.config.center_threshold;

        if dh.abs() <= threshold && dv.abs() <= threshold {
            return GazeDirection::Center;
        }

        if dh.abs() > dv.abs() {
            if dh < 0.0 {
                GazeDirection::Left
            } else {
                GazeDirection::Right
            }
        } else if dv.abs() > dh.abs() {
            if dv < 0.0 {
                GazeDirection::Up
            } else {
                GazeDirection::Down
            }
        } else {
            GazeDirection::Center
        }
    }

    /// Seconds the gaze has stayed within the fixation tolerance of the
    /// newest sample, scanning backward. Frame count is converted to seconds
    /// at the assumed frame rate.
    pub fn focus_duration(&self) -> f64 {
        let n = self.horizontal.len();
        if n == 0 {
            return 0.0;
        }

        let latest_h = self.horizontal[n - 1];
        let latest_v = self.vertical[n - 1];

        let mut frames = 0usize;
        for i in (0..n).rev() {
            let dh = (self.horizontal[i] - latest_h).abs();
            let dv = (self.vertical[i] - latest_v).abs();
            if dh < FIXATION_TOLERANCE && dv < FIXATION_TOLERANCE {
                frames += 1;
            } else {
                break;
            }
        }

        frames as f64 / self.config.assumed_fps as f64
    }

    /// Whether stability currently exceeds the configured focus threshold.
    pub fn is_stable_focus(&self) -> bool {
        self.stability() > self.config.stable_focus_threshold
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.horizontal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty()
    }

    /// Clear all history.
    pub fn reset(&mut self) {
        self.horizontal.clear();
        self.vertical.clear();
    }
}

impl Default for GazeTracker {
    fn default() -> Self {
        Self::new(GazeConfig::default())
    }
}
