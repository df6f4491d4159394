use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Model outputs at or above this value fall in the "high" band.
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Which label the model's raw output is a probability of.
///
/// Deployments disagree on this, so it is configuration rather than a property of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// `p >= 0.5` means defect.
    DefectProbability,
    /// `p >= 0.5` means not defect.
    NotDefectProbability,
}

impl Polarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::DefectProbability => "defect_probability",
            Polarity::NotDefectProbability => "not_defect_probability",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "defect_probability" | "defect" => Ok(Polarity::DefectProbability),
            "not_defect_probability" | "not_defect" | "inverted" => {
                Ok(Polarity::NotDefectProbability)
            }
            other => Err(format!(
                "Unknown polarity '{other}' (expected defect_probability or not_defect_probability)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Defect,
    NotDefect,
    /// Preprocessing or inference failed; no filesystem action follows.
    Error,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Defect => "defect",
            Label::NotDefect => "not_defect",
            Label::Error => "error",
        }
    }
}

/// Label plus the probability of that label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    /// Probability of `label`, never the raw model output.
    pub confidence: f32,
    /// Produced by the deterministic stand-in instead of a loaded model.
    pub demo: bool,
}

impl Verdict {
    pub fn error(demo: bool) -> Self {
        Self {
            label: Label::Error,
            confidence: 0.0,
            demo,
        }
    }

    pub fn is_error(&self) -> bool {
        self.label == Label::Error
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error() {
            f.write_str("analysis error")?;
        } else {
            write!(f, "{} ({:.2})", self.label.as_str(), self.confidence)?;
        }
        if self.demo {
            f.write_str(" [demo]")?;
        }
        Ok(())
    }
}

/// Map a raw model output to a verdict under `polarity`.
///
/// Outputs outside `[0, 1]` or not finite are reported as [`Label::Error`].
pub fn decide(raw: f32, polarity: Polarity, demo: bool) -> Verdict {
    if !raw.is_finite() || !(0.0..=1.0).contains(&raw) {
        return Verdict::error(demo);
    }
    let high = raw >= DECISION_THRESHOLD;
    let (label, confidence) = match (polarity, high) {
        (Polarity::DefectProbability, true) => (Label::Defect, raw),
        (Polarity::DefectProbability, false) => (Label::NotDefect, 1.0 - raw),
        (Polarity::NotDefectProbability, true) => (Label::NotDefect, raw),
        (Polarity::NotDefectProbability, false) => (Label::Defect, 1.0 - raw),
    };
    Verdict {
        label,
        confidence,
        demo,
    }
}
