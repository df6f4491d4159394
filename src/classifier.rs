//! Defect classification: preprocessing, the model seam and the decision rule.
//!
//! A [`Classifier`] is built once per session and shared with the worker threads. Whether it
//! wraps a loaded model or the demo stand-in, classification runs the same steps; only the
//! `demo` marker on the resulting [`Verdict`] differs.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ModelSettings;

mod demo;
mod linear;
mod model;
mod preprocess;
mod verdict;

pub use demo::DemoModel;
pub use linear::LinearDefectModel;
pub use model::{DEFAULT_INPUT_SIZE, DefectModel, InputSize, ModelError};
pub use preprocess::{ImageTensor, preprocess};
pub use verdict::{DECISION_THRESHOLD, Label, Polarity, Verdict, decide};

/// Injected classifier handle: a model, the polarity it is read with, and the demo marker.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: Arc<dyn DefectModel>,
    polarity: Polarity,
    demo: bool,
}

impl Classifier {
    pub fn new(model: Arc<dyn DefectModel>, polarity: Polarity) -> Self {
        Self {
            model,
            polarity,
            demo: false,
        }
    }

    /// Deterministic stand-in so the pipeline stays exercisable without a model.
    pub fn demo(polarity: Polarity) -> Self {
        Self {
            model: Arc::new(DemoModel),
            polarity,
            demo: true,
        }
    }

    /// Load the configured model, degrading to demo mode when it is missing or broken.
    pub fn from_settings(settings: &ModelSettings, polarity: Polarity) -> Self {
        let Some(path) = settings.path.as_deref() else {
            warn!("No model configured; classifying in demo mode");
            return Self::demo(polarity);
        };
        match LinearDefectModel::load(path) {
            Ok(model) => {
                info!(model = %path.display(), %polarity, "Defect model loaded");
                Self::new(Arc::new(model), polarity)
            }
            Err(err) => {
                warn!(
                    model = %path.display(),
                    error = %err,
                    "Model unavailable; classifying in demo mode"
                );
                Self::demo(polarity)
            }
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Same model, read with `polarity`.
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    /// Classify encoded image bytes. Failures become [`Label::Error`] verdicts.
    pub fn classify(&self, bytes: &[u8]) -> Verdict {
        match self.raw_output(bytes) {
            Ok(raw) => decide(raw, self.polarity, self.demo),
            Err(err) => {
                warn!(error = %err, demo = self.demo, "Classification failed");
                Verdict::error(self.demo)
            }
        }
    }

    /// Read and classify a file without touching it.
    pub fn classify_file(&self, path: &Path) -> Verdict {
        match std::fs::read(path) {
            Ok(bytes) => self.classify(&bytes),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read image");
                Verdict::error(self.demo)
            }
        }
    }

    fn raw_output(&self, bytes: &[u8]) -> Result<f32, ModelError> {
        let tensor = preprocess(bytes, self.model.input_size())?;
        self.model.predict(&tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct Fixed(f32);

    impl DefectModel for Fixed {
        fn input_size(&self) -> InputSize {
            InputSize::new(4, 4)
        }

        fn predict(&self, input: &ImageTensor) -> Result<f32, ModelError> {
            assert_eq!(input.shape(), [1, 4, 4, 3]);
            Ok(self.0)
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl DefectModel for Failing {
        fn input_size(&self) -> InputSize {
            InputSize::new(2, 2)
        }

        fn predict(&self, _input: &ImageTensor) -> Result<f32, ModelError> {
            Err(ModelError::Inference("backend crashed".into()))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(9, 7, Rgb([10, 20, 30])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn real_model_verdict_carries_no_demo_marker() {
        let classifier = Classifier::new(Arc::new(Fixed(0.9)), Polarity::DefectProbability);
        let verdict = classifier.classify(&png_bytes());
        assert_eq!(verdict.label, Label::Defect);
        assert!((verdict.confidence - 0.9).abs() < 1e-6);
        assert!(!verdict.demo);
    }

    #[test]
    fn inference_failure_is_error_verdict() {
        let classifier = Classifier::new(Arc::new(Failing), Polarity::DefectProbability);
        assert!(classifier.classify(&png_bytes()).is_error());
    }

    #[test]
    fn undecodable_bytes_are_error_verdict() {
        let classifier = Classifier::new(Arc::new(Fixed(0.9)), Polarity::DefectProbability);
        assert!(classifier.classify(b"definitely not an image").is_error());
    }

    #[test]
    fn demo_mode_is_deterministic_and_marked() {
        let classifier = Classifier::demo(Polarity::NotDefectProbability);
        let first = classifier.classify(&png_bytes());
        let second = classifier.classify(&png_bytes());
        assert_eq!(first, second);
        assert!(first.demo);
        assert!(!first.is_error());
        assert!((first.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn with_polarity_flips_the_reading_of_the_same_output() {
        let classifier = Classifier::new(Arc::new(Fixed(0.9)), Polarity::DefectProbability)
            .with_polarity(Polarity::NotDefectProbability);
        assert_eq!(classifier.polarity(), Polarity::NotDefectProbability);
        let verdict = classifier.classify(&png_bytes());
        assert_eq!(verdict.label, Label::NotDefect);
        assert!((verdict.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn missing_model_file_falls_back_to_demo() {
        let dir = tempdir().unwrap();
        let settings = ModelSettings {
            path: Some(dir.path().join("missing.json")),
        };
        let classifier = Classifier::from_settings(&settings, Polarity::DefectProbability);
        assert!(classifier.is_demo());
        assert_eq!(classifier.polarity(), Polarity::DefectProbability);
    }

    #[test]
    fn configured_model_file_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = LinearDefectModel {
            model_version: 1,
            input_width: 2,
            input_height: 2,
            weights: vec![0.0; 12],
            bias: 3.0,
        };
        std::fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();
        let settings = ModelSettings { path: Some(path) };

        let classifier = Classifier::from_settings(&settings, Polarity::DefectProbability);

        assert!(!classifier.is_demo());
        let verdict = classifier.classify(&png_bytes());
        assert_eq!(verdict.label, Label::Defect);
        assert!(verdict.confidence > 0.9);
    }
}
