//! Engine configuration
//!
//! All tuning constants for the decision pipeline live here as config structs
//! with sensible defaults. Every threshold that the alert and detection logic
//! depends on is an explicit field rather than a buried literal, so callers
//! can adjust per-user sensitivity without touching component code.

use serde::{Deserialize, Serialize};

/// Blink detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkConfig {
    /// EAR below this value indicates a closed eye
    pub closure_threshold: f64,
    /// Consecutive closed frames required for a valid blink (debounce)
    pub min_consecutive_frames: u32,
    /// Default trailing window for blink rate (seconds)
    pub rate_window_secs: u32,
    /// Healthy blink rate range lower bound (blinks/min)
    pub healthy_rate_min: f64,
    /// Healthy blink rate range upper bound (blinks/min)
    pub healthy_rate_max: f64,
    /// Blink rate below this is flagged as low (blinks/min)
    pub low_rate_threshold: f64,
    /// Assumed camera frame rate, used to size the trailing EAR buffer
    pub assumed_fps: u32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            closure_threshold: 0.25,
            min_consecutive_frames: 3,
            rate_window_secs: 60,
            healthy_rate_min: 12.0,
            healthy_rate_max: 25.0,
            low_rate_threshold: 8.0,
            assumed_fps: 30,
        }
    }
}

/// Gaze tracking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeConfig {
    /// Number of frames retained for stability calculation
    pub history_size: usize,
    /// Distance from 0.5 within which gaze counts as centered
    pub center_threshold: f64,
    /// Minimum stability score to be considered a stable focus
    pub stable_focus_threshold: f64,
    /// Assumed camera frame rate, used for focus duration estimates
    pub assumed_fps: u32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            history_size: 30,
            center_threshold: 0.15,
            stable_focus_threshold: 0.7,
            assumed_fps: 30,
        }
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Capacity of each trailing feature buffer (frames)
    pub window_size: usize,
    /// Minimum buffered samples before a feature vector can be produced
    pub min_samples: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            min_samples: 10,
        }
    }
}

/// Alert engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minutes between 20-20-20 break reminders
    pub break_interval_minutes: u32,
    /// Recommended break length included in reminder messages (seconds)
    pub break_duration_secs: u32,
    /// Minimum gap between consecutive break reminders (anti-spam, seconds)
    pub break_reminder_min_gap_secs: u32,
    /// Blink rate below this triggers a low-blink alert (blinks/min)
    pub low_blink_threshold: f64,
    /// Low-blink alert escalates to warning severity below this rate
    pub low_blink_warning_threshold: f64,
    /// Gaze stability above this counts toward prolonged focus
    pub prolonged_focus_stability: f64,
    /// Session duration before prolonged focus can fire (seconds)
    pub prolonged_focus_min_duration_secs: u32,
    /// Suppression window for repeated fatigue alerts (seconds)
    pub fatigue_suppression_secs: u32,
    /// Session duration milestones that fire once each (minutes)
    pub duration_milestones_minutes: Vec<u32>,
    /// Default snooze length (minutes)
    pub snooze_minutes: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            break_interval_minutes: 20,
            break_duration_secs: 20,
            break_reminder_min_gap_secs: 60,
            low_blink_threshold: 8.0,
            low_blink_warning_threshold: 5.0,
            prolonged_focus_stability: 0.8,
            prolonged_focus_min_duration_secs: 300,
            fatigue_suppression_secs: 300,
            duration_milestones_minutes: vec![60, 90, 120],
            snooze_minutes: 5,
        }
    }
}

/// Session lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity timeout that force-ends a session (seconds)
    pub timeout_secs: u32,
    /// Flush metrics to the store every Nth sample (~5 s at 30 fps)
    pub flush_every_samples: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            flush_every_samples: 150,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub blink: BlinkConfig,
    pub gaze: GazeConfig,
    pub features: FeatureConfig,
    pub alerts: AlertConfig,
    pub session: SessionConfig,
    /// Run the fatigue classifier every Nth frame
    pub prediction_interval_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blink: BlinkConfig::default(),
            gaze: GazeConfig::default(),
            features: FeatureConfig::default(),
            alerts: AlertConfig::default(),
            session: SessionConfig::default(),
            prediction_interval_frames: 10,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = EngineConfig::new();
        assert!((config.blink.closure_threshold - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.blink.min_consecutive_frames, 3);
        assert_eq!(config.alerts.break_interval_minutes, 20);
        assert_eq!(config.alerts.duration_milestones_minutes, vec![60, 90, 120]);
        assert_eq!(config.session.timeout_secs, 300);
        assert_eq!(config.prediction_interval_frames, 10);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = EngineConfig::new();
        let json = config.to_json().unwrap();
        let loaded = EngineConfig::from_json(&json).unwrap();
        assert_eq!(
            loaded.alerts.fatigue_suppression_secs,
            config.alerts.fatigue_suppression_secs
        );
        assert_eq!(loaded.features.window_size, config.features.window_size);
    }
}
