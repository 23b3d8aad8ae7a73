//! Ocuguard - On-device decision engine for eye strain and fatigue monitoring
//!
//! Ocuguard turns per-frame eye landmark observations into actionable signals
//! through a deterministic pipeline: geometry → blink detection / gaze
//! tracking → feature extraction → fatigue inference → alerting, with session
//! lifecycle and persistence around it.
//!
//! ## Modules
//!
//! - **Signal components**: blink detector, gaze tracker, feature extractor
//! - **Inference**: dense feed-forward fatigue classifier loaded from JSON
//! - **Decisions**: rule-based alert engine, session lifecycle manager
//! - **Pipeline**: `StrainProcessor` wiring everything into one per-frame call

pub mod alerts;
pub mod blink;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod gaze;
pub mod geometry;
pub mod pipeline;
pub mod session;
pub mod types;

pub use error::EngineError;
pub use pipeline::{FrameInput, FrameOutput, StrainProcessor};

// Signal exports
pub use blink::BlinkDetector;
pub use gaze::GazeTracker;

// Inference exports
pub use classifier::FatigueClassifier;
pub use features::{FeatureExtractor, FeatureVector, StandardScaler, FEATURE_COUNT};

// Decision exports
pub use alerts::{Alert, AlertEngine, AlertSeverity, AlertType};
pub use session::{MemorySessionStore, SessionManager, SessionStore, SessionSummary};

pub use config::EngineConfig;
pub use geometry::Point;
pub use types::{EyeSample, FatigueLevel, FatiguePrediction, GazeReading};

/// Engine version embedded in reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
