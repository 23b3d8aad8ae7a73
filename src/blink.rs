//! Blink detection
//!
//! A debounced threshold state machine over the per-frame eye aspect ratio.
//! Single closed frames are detector jitter; a closure only counts as a blink
//! once it has lasted `min_consecutive_frames` and the eye reopens.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::debug;

use crate::config::BlinkConfig;
use crate::types::{BlinkCadence, BlinkEvent, BlinkPattern, BlinkStats};

/// Maximum retained blink events
const BLINK_HISTORY_CAPACITY: usize = 1000;

/// Number of recent events considered by pattern analysis
const PATTERN_WINDOW_EVENTS: usize = 20;

/// Minimum recorded events before pattern analysis is meaningful
const PATTERN_MIN_EVENTS: usize = 10;

/// Debounced blink detector with bounded trailing history
#[derive(Debug)]
pub struct BlinkDetector {
    config: BlinkConfig,
    /// Consecutive frames below the closure threshold
    eye_closed_counter: u32,
    /// Whether a closure is currently in progress
    is_blinking: bool,
    /// Minimum EAR observed during the current closure
    min_ear_during_blink: f64,
    /// Completed blinks, oldest evicted past capacity
    history: VecDeque<BlinkEvent>,
    /// Trailing raw EAR samples (rate_window_secs × assumed_fps)
    recent_ear_values: VecDeque<f64>,
    total_blinks: u64,
    last_blink_time: Option<DateTime<Utc>>,
}

impl BlinkDetector {
    pub fn new(config: BlinkConfig) -> Self {
        let ear_capacity = config.rate_window_secs as usize * config.assumed_fps as usize;
        Self {
            config,
            eye_closed_counter: 0,
            is_blinking: false,
            min_ear_during_blink: 1.0,
            history: VecDeque::with_capacity(BLINK_HISTORY_CAPACITY),
            recent_ear_values: VecDeque::with_capacity(ear_capacity),
            total_blinks: 0,
            last_blink_time: None,
        }
    }

    /// Process one frame's average EAR. Returns true when a blink completed
    /// on this frame (eye reopened after a debounced closure).
    pub fn process_sample(&mut self, avg_ear: f64, now: DateTime<Utc>) -> bool {
        self.push_ear_sample(avg_ear);

        if avg_ear < self.config.closure_threshold {
            self.eye_closed_counter += 1;

            if !self.is_blinking {
                self.is_blinking = true;
                self.min_ear_during_blink = avg_ear;
            } else {
                self.min_ear_during_blink = self.min_ear_during_blink.min(avg_ear);
            }

            return false;
        }

        // Eye is open; a closure that met the debounce threshold is a blink
        let blink_detected = self.eye_closed_counter >= self.config.min_consecutive_frames;
        if blink_detected {
            self.register_blink(now, self.eye_closed_counter);
            debug!(
                "blink detected, duration {} frames, min EAR {:.3}",
                self.eye_closed_counter, self.min_ear_during_blink
            );
        }

        self.eye_closed_counter = 0;
        self.is_blinking = false;
        self.min_ear_during_blink = 1.0;

        blink_detected
    }

    fn register_blink(&mut self, timestamp: DateTime<Utc>, duration_frames: u32) {
        if self.history.len() >= BLINK_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(BlinkEvent {
            timestamp,
            duration_frames,
            min_ear: self.min_ear_during_blink,
        });
        self.total_blinks += 1;
        self.last_blink_time = Some(timestamp);
    }

    fn push_ear_sample(&mut self, avg_ear: f64) {
        let capacity =
            self.config.rate_window_secs as usize * self.config.assumed_fps as usize;
        while self.recent_ear_values.len() >= capacity {
            self.recent_ear_values.pop_front();
        }
        self.recent_ear_values.push_back(avg_ear);
    }

    /// Blinks per minute over the trailing window ending at `now`.
    ///
    /// Returns 0.0 when no events fall inside the window, or when the span
    /// between the oldest in-window event and `now` is zero. Never negative,
    /// never NaN.
    pub fn blink_rate(&self, window_secs: u32, now: DateTime<Utc>) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }

        let cutoff = now - chrono::Duration::seconds(window_secs as i64);
        let mut count = 0usize;
        let mut oldest_in_window: Option<DateTime<Utc>> = None;

        for event in &self.history {
            if event.timestamp >= cutoff {
                if oldest_in_window.is_none() {
                    oldest_in_window = Some(event.timestamp);
                }
                count += 1;
            }
        }

        let oldest = match oldest_in_window {
            Some(t) => t,
            None => return 0.0,
        };

        let span_secs = (now - oldest).num_milliseconds() as f64 / 1000.0;
        if span_secs <= 0.0 {
            return 0.0;
        }

        (count as f64 / span_secs) * 60.0
    }

    /// Blink rate using the configured default window.
    pub fn current_rate(&self, now: DateTime<Utc>) -> f64 {
        self.blink_rate(self.config.rate_window_secs, now)
    }

    /// Whether the current rate falls inside the healthy range.
    pub fn is_healthy_rate(&self, now: DateTime<Utc>) -> bool {
        let rate = self.current_rate(now);
        rate >= self.config.healthy_rate_min && rate <= self.config.healthy_rate_max
    }

    /// Snapshot of current blink statistics.
    pub fn stats(&self, now: DateTime<Utc>) -> BlinkStats {
        let blink_rate = self.current_rate(now);

        let avg_blink_duration = if self.history.is_empty() {
            0.0
        } else {
            let total: u64 = self.history.iter().map(|b| b.duration_frames as u64).sum();
            total as f64 / self.history.len() as f64
        };

        let time_since_last_blink = match self.last_blink_time {
            Some(t) => ((now - t).num_milliseconds() as f64 / 1000.0).max(0.0),
            None => 0.0,
        };

        let recent_start = self.history.len().saturating_sub(10);
        let recent_blinks = self.history.iter().skip(recent_start).cloned().collect();

        BlinkStats {
            total_blinks: self.total_blinks,
            blink_rate,
            avg_blink_duration,
            time_since_last_blink,
            is_low_blink_rate: blink_rate < self.config.low_rate_threshold,
            recent_blinks,
        }
    }

    /// Classify the recent blink cadence from inter-blink intervals.
    ///
    /// Requires at least 10 recorded events and examines the last 20.
    /// Returns `None` below the minimum.
    pub fn pattern_analysis(&self) -> Option<BlinkPattern> {
        if self.history.len() < PATTERN_MIN_EVENTS {
            return None;
        }

        let start = self.history.len().saturating_sub(PATTERN_WINDOW_EVENTS);
        let recent: Vec<&BlinkEvent> = self.history.iter().skip(start).collect();

        let intervals: Vec<f64> = recent
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .collect();

        if intervals.is_empty() {
            return None;
        }

        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        let cadence = if mean > 10.0 {
            BlinkCadence::Infrequent
        } else if mean < 2.0 {
            BlinkCadence::Frequent
        } else if std > 5.0 {
            BlinkCadence::Irregular
        } else {
            BlinkCadence::Normal
        };

        Some(BlinkPattern {
            cadence,
            mean_interval_secs: mean,
            std_interval_secs: std,
            regularity_score: 1.0 / (1.0 + std),
        })
    }

    /// Total blinks since construction or the last reset.
    pub fn total_blinks(&self) -> u64 {
        self.total_blinks
    }

    /// Clear all state, returning to the freshly constructed state.
    pub fn reset(&mut self) {
        self.eye_closed_counter = 0;
        self.is_blinking = false;
        self.min_ear_during_blink = 1.0;
        self.history.clear();
        self.recent_ear_values.clear();
        self.total_blinks = 0;
        self.last_blink_time = None;
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self::new(BlinkConfig::default())
    }
}
