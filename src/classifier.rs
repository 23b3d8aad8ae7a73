//! Fatigue classification
//!
//! A small dense feed-forward network loaded from a JSON export. Inference
//! is plain matrix-vector arithmetic; softmax over the final layer yields
//! one probability per fatigue level.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::FeatureVector;
use crate::types::{FatigueLevel, FatiguePrediction};

/// Activation applied after a layer's affine transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

/// One dense layer. `weights` is row-major with one row per input
/// dimension, one column per output dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.len()
    }

    fn output_dim(&self) -> usize {
        self.biases.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.biases.clone();
        for (i, x) in input.iter().enumerate() {
            for (j, o) in out.iter_mut().enumerate() {
                *o += x * self.weights[i][j];
            }
        }
        if self.activation == Activation::Relu {
            for o in out.iter_mut() {
                *o = o.max(0.0);
            }
        }
        out
    }
}

/// Serialized model layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub input_dim: usize,
    pub num_classes: usize,
    pub layers: Vec<DenseLayer>,
}

/// Feed-forward fatigue classifier
#[derive(Debug, Clone)]
pub struct FatigueClassifier {
    spec: ModelSpec,
}

impl FatigueClassifier {
    /// Load a model from a JSON file. A missing file surfaces as
    /// `ModelUnavailable` so callers can run without inference.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::ModelUnavailable(format!("{}: {e}", path.display()))
        })?;
        let spec: ModelSpec = serde_json::from_str(&raw)?;
        Self::from_spec(spec)
    }

    /// Validate layer dimensions and build the classifier.
    pub fn from_spec(spec: ModelSpec) -> Result<Self, EngineError> {
        if spec.layers.is_empty() {
            return Err(EngineError::InvalidModel("model has no layers".into()));
        }
        if spec.num_classes != FatigueLevel::COUNT {
            return Err(EngineError::InvalidModel(format!(
                "expected {} classes, model declares {}",
                FatigueLevel::COUNT,
                spec.num_classes
            )));
        }

        let mut dim = spec.input_dim;
        for (idx, layer) in spec.layers.iter().enumerate() {
            if layer.input_dim() != dim {
                return Err(EngineError::InvalidModel(format!(
                    "layer {idx} expects {} inputs, got {dim}",
                    layer.input_dim()
                )));
            }
            let out = layer.output_dim();
            if layer.weights.iter().any(|row| row.len() != out) {
                return Err(EngineError::InvalidModel(format!(
                    "layer {idx} has ragged weight rows"
                )));
            }
            dim = out;
        }
        if dim != spec.num_classes {
            return Err(EngineError::InvalidModel(format!(
                "final layer emits {dim} values, expected {}",
                spec.num_classes
            )));
        }

        Ok(Self { spec })
    }

    /// Expected feature vector length.
    pub fn input_dim(&self) -> usize {
        self.spec.input_dim
    }

    /// Run inference on a single feature vector.
    pub fn predict_single(
        &self,
        features: &FeatureVector,
    ) -> Result<FatiguePrediction, EngineError> {
        if features.values.len() != self.spec.input_dim {
            return Err(EngineError::DimensionMismatch {
                expected: self.spec.input_dim,
                actual: features.values.len(),
            });
        }

        let mut current = features.values.clone();
        for layer in &self.spec.layers {
            current = layer.forward(&current);
        }
        let probs = softmax(&current);

        let mut best = 0usize;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }

        let mut probabilities = [0.0; FatigueLevel::COUNT];
        probabilities.copy_from_slice(&probs);

        Ok(FatiguePrediction {
            level: FatigueLevel::from_index(best).unwrap_or(FatigueLevel::Normal),
            confidence: probs[best],
            probabilities,
        })
    }
}

/// Numerically stable softmax: shift by the maximum before exponentiating.
fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
