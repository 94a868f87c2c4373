use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Feature order the classifier was fitted with. The artifact must list the
/// same names in the same order or it is rejected at load time.
pub const FEATURE_NAMES: [&str; 12] = [
    "age",
    "anaemia",
    "creatinine_phosphokinase",
    "diabetes",
    "ejection_fraction",
    "high_blood_pressure",
    "platelets",
    "serum_creatinine",
    "serum_sodium",
    "sex",
    "smoking",
    "time",
];

pub struct FeatureMeta {
    pub name: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: Option<f64>,
}

pub const FEATURE_METADATA: [FeatureMeta; 12] = [
    FeatureMeta { name: "age", unit: "years", min: 0.0, max: Some(120.0) },
    FeatureMeta { name: "anaemia", unit: "0=No/1=Yes", min: 0.0, max: Some(1.0) },
    FeatureMeta { name: "creatinine_phosphokinase", unit: "mcg/L", min: 0.0, max: None },
    FeatureMeta { name: "diabetes", unit: "0=No/1=Yes", min: 0.0, max: Some(1.0) },
    FeatureMeta { name: "ejection_fraction", unit: "%", min: 0.0, max: Some(100.0) },
    FeatureMeta { name: "high_blood_pressure", unit: "0=No/1=Yes", min: 0.0, max: Some(1.0) },
    FeatureMeta { name: "platelets", unit: "kiloplatelets/mL", min: 0.0, max: None },
    FeatureMeta { name: "serum_creatinine", unit: "mg/dL", min: 0.0, max: None },
    FeatureMeta { name: "serum_sodium", unit: "mEq/L", min: 0.0, max: None },
    FeatureMeta { name: "sex", unit: "0=Female/1=Male", min: 0.0, max: Some(1.0) },
    FeatureMeta { name: "smoking", unit: "0=No/1=Yes", min: 0.0, max: Some(1.0) },
    FeatureMeta { name: "time", unit: "days", min: 0.0, max: None },
];

/// One complete set of patient vitals, validated at the transport boundary.
/// Missing fields are rejected by serde before the classifier runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub age: f64,
    pub anaemia: f64,
    pub creatinine_phosphokinase: f64,
    pub diabetes: f64,
    pub ejection_fraction: f64,
    pub high_blood_pressure: f64,
    pub platelets: f64,
    pub serum_creatinine: f64,
    pub serum_sodium: f64,
    pub sex: f64,
    pub smoking: f64,
    pub time: f64,
}

impl FeatureVector {
    /// Values in training order, matching [`FEATURE_NAMES`].
    pub fn ordered(&self) -> [f64; 12] {
        [
            self.age,
            self.anaemia,
            self.creatinine_phosphokinase,
            self.diabetes,
            self.ejection_fraction,
            self.high_blood_pressure,
            self.platelets,
            self.serum_creatinine,
            self.serum_sodium,
            self.sex,
            self.smoking,
            self.time,
        ]
    }
}

/// Frozen classifier artifact: standard-scaler parameters plus logistic
/// regression weights exported by the offline training job. Scoring is a
/// pure function; nothing here retrains or tunes.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskModel {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl RiskModel {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read model artifact {}", path.display()))?;
        let model: RiskModel = serde_json::from_str(&raw)
            .with_context(|| format!("parse model artifact {}", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.feature_names.len() != FEATURE_NAMES.len() {
            anyhow::bail!(
                "model artifact lists {} features, expected {}",
                self.feature_names.len(),
                FEATURE_NAMES.len()
            );
        }
        for (got, want) in self.feature_names.iter().zip(FEATURE_NAMES) {
            if got != want {
                anyhow::bail!("model artifact feature order mismatch: {got} where {want} expected");
            }
        }
        if self.mean.len() != self.feature_names.len()
            || self.scale.len() != self.feature_names.len()
            || self.coefficients.len() != self.feature_names.len()
        {
            anyhow::bail!("model artifact parameter vectors disagree on length");
        }
        if self.scale.iter().any(|s| *s == 0.0) {
            anyhow::bail!("model artifact contains a zero scale entry");
        }
        Ok(())
    }

    /// Probability of the positive class for one feature vector, in [0, 1].
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let values = features.ordered();
        let mut z = self.intercept;
        for i in 0..values.len() {
            z += self.coefficients[i] * (values[i] - self.mean[i]) / self.scale[i];
        }
        1.0 / (1.0 + (-z).exp())
    }

    /// Identity-scaled model whose probability is sigmoid(time). Lets tests
    /// steer the category from the input alone.
    #[cfg(test)]
    pub fn time_only_for_tests() -> Self {
        let n = FEATURE_NAMES.len();
        let mut coefficients = vec![0.0; n];
        coefficients[n - 1] = 1.0;
        Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            mean: vec![0.0; n],
            scale: vec![1.0; n],
            coefficients,
            intercept: 0.0,
        }
    }
}

const MEDIUM_FROM: f64 = 0.33;
const HIGH_FROM: f64 = 0.67;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCategory {
    #[sqlx(rename = "LOW")]
    Low,
    #[sqlx(rename = "MEDIUM")]
    Medium,
    #[sqlx(rename = "HIGH")]
    High,
}

impl RiskCategory {
    /// Threshold mapping, total over [0, 1]: below 0.33 is LOW, below 0.67
    /// is MEDIUM, the rest is HIGH.
    pub fn from_probability(probability: f64) -> Self {
        if probability < MEDIUM_FROM {
            RiskCategory::Low
        } else if probability < HIGH_FROM {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "LOW",
            RiskCategory::Medium => "MEDIUM",
            RiskCategory::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Some(RiskCategory::Low),
            "MEDIUM" => Some(RiskCategory::Medium),
            "HIGH" => Some(RiskCategory::High),
            _ => None,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskCategory::Low => {
                "Continue regular health check-ups. Maintain healthy lifestyle."
            }
            RiskCategory::Medium => {
                "Schedule appointment with cardiologist for further evaluation."
            }
            RiskCategory::High => {
                "URGENT: Consult cardiologist immediately. Consider additional testing."
            }
        }
    }
}
