//! Core types for the ocuguard pipeline
//!
//! This module defines the data structures that flow between the pipeline
//! stages: per-frame eye samples, blink events, gaze readings, and fatigue
//! predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Per-frame eye measurements produced by an external landmark provider.
///
/// The landmark detector is a collaborator outside this crate; a frame with
/// no detected face simply has no `EyeSample` and downstream components
/// tolerate the gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyeSample {
    /// Left eye aspect ratio
    pub left_ear: f64,
    /// Right eye aspect ratio
    pub right_ear: f64,
    /// Average of both eyes
    pub avg_ear: f64,
    /// Left eye contour landmarks (6-point ordering)
    pub left_eye_landmarks: Vec<Point>,
    /// Right eye contour landmarks (6-point ordering)
    pub right_eye_landmarks: Vec<Point>,
    /// Left iris center, when iris landmarks were detected
    pub left_iris_center: Option<Point>,
    /// Right iris center, when iris landmarks were detected
    pub right_iris_center: Option<Point>,
}

impl EyeSample {
    /// Build a sample from raw EAR values without landmark geometry.
    /// Useful for replay and simulation inputs where only the openness
    /// signal is available.
    pub fn from_ear(avg_ear: f64) -> Self {
        Self {
            left_ear: avg_ear,
            right_ear: avg_ear,
            avg_ear,
            left_eye_landmarks: Vec::new(),
            right_eye_landmarks: Vec::new(),
            left_iris_center: None,
            right_iris_center: None,
        }
    }
}

/// A single completed blink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkEvent {
    /// When the blink completed (eye reopened)
    pub timestamp: DateTime<Utc>,
    /// Closure duration in frames
    pub duration_frames: u32,
    /// Minimum EAR observed during the closure
    pub min_ear: f64,
}

/// Snapshot of blink statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkStats {
    /// Total blinks since construction or last reset
    pub total_blinks: u64,
    /// Blinks per minute over the trailing window
    pub blink_rate: f64,
    /// Mean blink duration in frames
    pub avg_blink_duration: f64,
    /// Seconds since the most recent blink (0 when none recorded)
    pub time_since_last_blink: f64,
    /// Whether the current rate is below the low-rate threshold
    pub is_low_blink_rate: bool,
    /// The most recent blinks (up to 10)
    pub recent_blinks: Vec<BlinkEvent>,
}

/// Classified blink cadence over recent events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkCadence {
    Normal,
    /// Mean inter-blink interval above 10 s
    Infrequent,
    /// Mean inter-blink interval below 2 s
    Frequent,
    /// Interval standard deviation above 5 s
    Irregular,
}

/// Blink pattern analysis over the last 20 events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkPattern {
    pub cadence: BlinkCadence,
    /// Mean inter-blink interval in seconds
    pub mean_interval_secs: f64,
    /// Standard deviation of inter-blink intervals in seconds
    pub std_interval_secs: f64,
    /// 1/(1+stdev); higher is more regular
    pub regularity_score: f64,
}

/// Dominant gaze direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl GazeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            GazeDirection::Center => "center",
            GazeDirection::Left => "left",
            GazeDirection::Right => "right",
            GazeDirection::Up => "up",
            GazeDirection::Down => "down",
        }
    }
}

/// Derived gaze state for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeReading {
    /// Averaged horizontal gaze ratio across both eyes (0-1)
    pub avg_horizontal: f64,
    /// Averaged vertical gaze ratio across both eyes (0-1)
    pub avg_vertical: f64,
    /// Inverse-variance stability score (0-1, higher is steadier)
    pub stability: f64,
    /// Dominant direction label
    pub direction: GazeDirection,
}

impl GazeReading {
    pub fn looking_center(&self) -> bool {
        self.direction == GazeDirection::Center
    }
}

/// Ordinal fatigue severity produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueLevel {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl FatigueLevel {
    /// Number of fatigue classes
    pub const COUNT: usize = 4;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(FatigueLevel::Normal),
            1 => Some(FatigueLevel::Mild),
            2 => Some(FatigueLevel::Moderate),
            3 => Some(FatigueLevel::Severe),
            _ => None,
        }
    }

    pub fn as_index(&self) -> usize {
        match self {
            FatigueLevel::Normal => 0,
            FatigueLevel::Mild => 1,
            FatigueLevel::Moderate => 2,
            FatigueLevel::Severe => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueLevel::Normal => "normal",
            FatigueLevel::Mild => "mild_strain",
            FatigueLevel::Moderate => "moderate_strain",
            FatigueLevel::Severe => "severe_strain",
        }
    }
}

/// Output of a single classifier inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatiguePrediction {
    /// Argmax class
    pub level: FatigueLevel,
    /// Probability of the predicted class (0-1)
    pub confidence: f64,
    /// Per-class probabilities in level order, summing to 1
    pub probabilities: [f64; FatigueLevel::COUNT],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatigue_level_index_round_trip() {
        for index in 0..FatigueLevel::COUNT {
            let level = FatigueLevel::from_index(index).unwrap();
            assert_eq!(level.as_index(), index);
        }
        assert!(FatigueLevel::from_index(4).is_none());
    }

    #[test]
    fn test_fatigue_level_ordering() {
        assert!(FatigueLevel::Severe > FatigueLevel::Moderate);
        assert!(FatigueLevel::Mild > FatigueLevel::Normal);
    }

    #[test]
    fn test_gaze_direction_serialization() {
        let json = serde_json::to_string(&GazeDirection::Left).unwrap();
        assert_eq!(json, "\"left\"");
        let parsed: GazeDirection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GazeDirection::Left);
    }

    #[test]
    fn test_eye_sample_from_ear() {
        let sample = EyeSample::from_ear(0.31);
        assert_eq!(sample.avg_ear, 0.31);
        assert!(sample.left_iris_center.is_none());
        assert!(sample.left_eye_landmarks.is_empty());
    }
}
