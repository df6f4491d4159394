//! File-backed logistic model over the flattened input tensor.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{DefectModel, InputSize, ModelError};
use super::preprocess::ImageTensor;

/// Versioned logistic regression weights, one per input value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDefectModel {
    pub model_version: i64,
    pub input_width: u32,
    pub input_height: u32,
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LinearDefectModel {
    /// Read and validate a JSON model file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;
        Ok(model)
    }

    /// Check dimensions and reject non-finite parameters.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ModelError::Invalid("input size must be non-zero".into()));
        }
        let expected = self.input_size().element_count();
        if self.weights.len() != expected {
            return Err(ModelError::Invalid(format!(
                "weights length {} does not match {}x{}x3 = {expected}",
                self.weights.len(),
                self.input_width,
                self.input_height
            )));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::Invalid("parameters must be finite".into()));
        }
        Ok(())
    }
}

impl DefectModel for LinearDefectModel {
    fn input_size(&self) -> InputSize {
        InputSize::new(self.input_width, self.input_height)
    }

    fn predict(&self, input: &ImageTensor) -> Result<f32, ModelError> {
        let values = input.data();
        if values.len() != self.weights.len() {
            return Err(ModelError::InputShape {
                expected: self.weights.len(),
                actual: values.len(),
            });
        }
        let logit = self
            .weights
            .iter()
            .zip(values)
            .fold(self.bias, |sum, (w, x)| sum + w * x);
        Ok(sigmoid(logit))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::preprocess::tensor_from_values;
    use tempfile::tempdir;

    fn model(bias: f32) -> LinearDefectModel {
        LinearDefectModel {
            model_version: 1,
            input_width: 2,
            input_height: 1,
            weights: vec![1.0, 0.0, 0.0, -1.0, 0.0, 0.0],
            bias,
        }
    }

    #[test]
    fn predicts_sigmoid_of_weighted_sum() {
        let size = InputSize::new(2, 1);
        let tensor = tensor_from_values(size, vec![1.0, 0.5, 0.5, 0.0, 0.5, 0.5]);
        let p = model(0.0).predict(&tensor).unwrap();
        assert!((p - sigmoid(1.0)).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_input() {
        let tensor = tensor_from_values(InputSize::new(1, 1), vec![0.0; 3]);
        assert!(matches!(
            model(0.0).predict(&tensor),
            Err(ModelError::InputShape { expected: 6, actual: 3 })
        ));
    }

    #[test]
    fn load_validates_dimensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut broken = model(0.0);
        broken.weights.pop();
        std::fs::write(&path, serde_json::to_vec(&broken).unwrap()).unwrap();
        assert!(matches!(
            LinearDefectModel::load(&path),
            Err(ModelError::Invalid(_))
        ));

        std::fs::write(&path, serde_json::to_vec(&model(0.25)).unwrap()).unwrap();
        let loaded = LinearDefectModel::load(&path).unwrap();
        assert_eq!(loaded.input_size(), InputSize::new(2, 1));
        assert_eq!(loaded.bias, 0.25);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            LinearDefectModel::load(&dir.path().join("absent.json")),
            Err(ModelError::Read { .. })
        ));
    }
}
