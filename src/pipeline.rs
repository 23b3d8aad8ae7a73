//! Frame pipeline
//!
//! `StrainProcessor` wires the components together: every frame flows
//! through blink detection, gaze tracking, and feature buffering, the
//! classifier runs on a fixed frame interval, and the session manager and
//! alert engine are fed from the same tick. Frames without eye data leave
//! the signal state untouched but still drive timeouts and duration alerts.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertEngine, AlertType};
use crate::blink::BlinkDetector;
use crate::classifier::FatigueClassifier;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::{FeatureExtractor, StandardScaler};
use crate::gaze::GazeTracker;
use crate::session::{
    MemorySessionStore, SessionManager, SessionState, SessionStats, SessionStore, SessionSummary,
};
use crate::types::{EyeSample, FatigueLevel, FatiguePrediction, GazeReading};

/// One frame of input to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInput {
    pub observed_at: DateTime<Utc>,
    /// `None` when no face was found this frame
    pub eye: Option<EyeSample>,
}

/// Per-frame pipeline output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameOutput {
    pub blink_detected: bool,
    pub blink_rate: f64,
    pub gaze: Option<GazeReading>,
    pub prediction: Option<FatiguePrediction>,
    pub fatigue_level: FatigueLevel,
    pub new_alerts: Vec<Alert>,
}

/// End-to-end eye strain processor
pub struct StrainProcessor {
    config: EngineConfig,
    blink: BlinkDetector,
    gaze: GazeTracker,
    features: FeatureExtractor,
    classifier: Option<FatigueClassifier>,
    alerts: AlertEngine,
    session: SessionManager,
    frame_count: u64,
    last_prediction: Option<FatiguePrediction>,
    last_gaze: Option<GazeReading>,
}

impl StrainProcessor {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Box::new(MemorySessionStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Box<dyn SessionStore>) -> Self {
        Self {
            blink: BlinkDetector::new(config.blink.clone()),
            gaze: GazeTracker::new(config.gaze.clone()),
            features: FeatureExtractor::new(config.features.clone()),
            classifier: None,
            alerts: AlertEngine::new(config.alerts.clone()),
            session: SessionManager::new(config.session.clone(), store),
            frame_count: 0,
            last_prediction: None,
            last_gaze: None,
            config,
        }
    }

    /// Attach a trained classifier. Without one the pipeline reports
    /// `Normal` and never predicts.
    pub fn with_classifier(mut self, classifier: FatigueClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Attach a feature scaler.
    pub fn with_scaler(mut self, scaler: StandardScaler) -> Result<Self, EngineError> {
        self.features.set_scaler(scaler)?;
        Ok(self)
    }

    pub fn start_session(&mut self, user: &str, now: DateTime<Utc>) -> String {
        info!("starting session for {user}");
        self.session.start(user, now)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.session.pause(now);
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.session.resume(now);
    }

    pub fn end_session(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        self.session.end_session(now)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_stats(&self, now: DateTime<Utc>) -> Option<SessionStats> {
        self.session.current_stats(now)
    }

    pub fn alerts_mut(&mut self) -> &mut AlertEngine {
        &mut self.alerts
    }

    /// Timed-out session summary, if the idle limit was exceeded.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        self.session.check_timeout(now)
    }

    /// Process one frame.
    pub fn process_frame(&mut self, input: FrameInput) -> FrameOutput {
        let now = input.observed_at;
        self.frame_count += 1;

        let mut blink_detected = false;
        if let Some(eye) = &input.eye {
            blink_detected = self.blink.process_sample(eye.avg_ear, now);

            self.last_gaze = self
                .gaze
                .update(
                    eye.left_iris_center,
                    eye.right_iris_center,
                    &eye.left_eye_landmarks,
                    &eye.right_eye_landmarks,
                )
                .or(self.last_gaze.take());
        }

        let blink_rate = self.blink.current_rate(now);
        let gaze_stability = self.gaze.stability();
        let session_duration = self.session.duration(true, now);

        if let Some(eye) = &input.eye {
            self.features.add_data_point(
                eye.avg_ear,
                blink_rate,
                gaze_stability,
                session_duration,
            );
        }

        // Inference on the configured frame interval
        let interval = self.config.prediction_interval_frames as u64;
        if input.eye.is_some()
            && interval > 0
            && self.frame_count % interval == 0
        {
            self.run_prediction();
        }

        let fatigue_level = self
            .last_prediction
            .as_ref()
            .map(|p| p.level)
            .unwrap_or(FatigueLevel::Normal);

        if let Some(eye) = &input.eye {
            self.session.update_metrics(
                eye.avg_ear,
                blink_rate,
                fatigue_level,
                blink_detected,
                now,
            );
        }
        self.session.check_timeout(now);

        let new_alerts = if self.session.state() == SessionState::Active {
            let raised = self.alerts.check_alerts(
                blink_rate,
                fatigue_level,
                session_duration,
                gaze_stability,
                now,
            );
            for alert in &raised {
                self.session.record_alert();
                if alert.alert_type == AlertType::BreakReminder {
                    self.session.record_break();
                }
            }
            raised
        } else {
            Vec::new()
        };

        FrameOutput {
            blink_detected,
            blink_rate,
            gaze: self.last_gaze.clone(),
            prediction: self.last_prediction.clone(),
            fatigue_level,
            new_alerts,
        }
    }

    fn run_prediction(&mut self) {
        let Some(classifier) = &self.classifier else {
            return;
        };
        let Some(vector) = self.features.extract() else {
            return;
        };
        match classifier.predict_single(&vector) {
            Ok(prediction) => {
                debug!(
                    "fatigue prediction: {} ({:.2})",
                    prediction.level.as_str(),
                    prediction.confidence
                );
                self.last_prediction = Some(prediction);
            }
            Err(e) => debug!("prediction skipped: {e}"),
        }
    }

    /// Reset all signal state and alerts. The session is left untouched.
    pub fn reset_signals(&mut self) {
        self.blink.reset();
        self.gaze.reset();
        self.features.reset();
        self.alerts.reset();
        self.frame_count = 0;
        self.last_prediction = None;
        self.last_gaze = None;
    }
}
