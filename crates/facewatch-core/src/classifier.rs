//! Identity classifier via ONNX Runtime.
//!
//! Runs the face classification model on a 200×200 grayscale face tensor
//! and maps the most probable output index to an identity name.

use crate::labels::LabelSet;
use crate::preprocess::FaceTensor;
use crate::types::Prediction;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; export the trained classifier to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model emits {outputs} classes but the label set has {labels} names")]
    LabelMismatch { outputs: usize, labels: usize },
    #[error("model returned an empty probability vector")]
    EmptyOutput,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A model producing one probability per known identity.
pub trait ScoreModel: Send {
    fn scores(&mut self, input: &FaceTensor) -> Result<Vec<f32>, ClassifierError>;

    /// Number of classes, found by running a blank input.
    fn output_width(&mut self) -> Result<usize, ClassifierError> {
        Ok(self.scores(&FaceTensor::zeros())?.len())
    }
}

/// ONNX classification model with a single (1, 200, 200, 1) input.
pub struct OnnxModel {
    session: Session,
}

impl OnnxModel {
    /// Load the ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)
            .map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face classifier model"
        );

        Ok(Self { session })
    }
}

impl ScoreModel for OnnxModel {
    fn scores(&mut self, input: &FaceTensor) -> Result<Vec<f32>, ClassifierError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.as_array().view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("probability extraction: {e}")))?;

        Ok(raw.to_vec())
    }
}

/// Maps face tensors to [`Prediction`]s over a fixed label set.
pub struct IdentityClassifier {
    model: Box<dyn ScoreModel>,
    labels: LabelSet,
}

impl IdentityClassifier {
    /// Pair a model with its labels, checking that the model's output
    /// width matches the label count.
    pub fn new(mut model: Box<dyn ScoreModel>, labels: LabelSet) -> Result<Self, ClassifierError> {
        let outputs = model.output_width()?;
        if outputs != labels.len() {
            return Err(ClassifierError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }
        tracing::debug!(classes = outputs, "classifier output width matches label set");
        Ok(Self { model, labels })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn classify(&mut self, tensor: &FaceTensor) -> Result<Prediction, ClassifierError> {
        let probabilities = self.model.scores(tensor)?;
        if probabilities.len() != self.labels.len() {
            return Err(ClassifierError::LabelMismatch {
                outputs: probabilities.len(),
                labels: self.labels.len(),
            });
        }

        let (index, confidence) = argmax(&probabilities).ok_or(ClassifierError::EmptyOutput)?;
        let identity = self
            .labels
            .get(index)
            .ok_or(ClassifierError::LabelMismatch {
                outputs: probabilities.len(),
                labels: self.labels.len(),
            })?;

        Ok(Prediction::new(identity, confidence.clamp(0.0, 1.0)))
    }
}

/// Index and value of the largest element; the first one wins ties.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ if v.is_nan() => best,
            _ => Some((i, v)),
        })
}
