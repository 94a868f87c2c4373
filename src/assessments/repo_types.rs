use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::risk::{FeatureVector, RiskCategory};

/// One persisted risk computation. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assessment {
    pub id: i64,
    pub user_id: i64,
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
    pub probability: f64,
    pub risk_category: RiskCategory,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Assessment joined to its owning user, for the doctor views.
#[derive(Debug, Clone, FromRow)]
pub struct AssessmentWithUser {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
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
    pub probability: f64,
    pub risk_category: RiskCategory,
    pub created_at: OffsetDateTime,
}

impl AssessmentWithUser {
    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            age: self.age,
            anaemia: self.anaemia,
            creatinine_phosphokinase: self.creatinine_phosphokinase,
            diabetes: self.diabetes,
            ejection_fraction: self.ejection_fraction,
            high_blood_pressure: self.high_blood_pressure,
            platelets: self.platelets,
            serum_creatinine: self.serum_creatinine,
            serum_sodium: self.serum_sodium,
            sex: self.sex,
            smoking: self.smoking,
            time: self.time,
        }
    }
}

/// Conjunction of the doctor-view filters; `None` fields match everything.
#[derive(Debug, Default, Clone)]
pub struct AssessmentFilter {
    pub risk: Option<RiskCategory>,
    pub username_substring: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

/// Patient row with assessment count for the doctor dashboard.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientSummary {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered: OffsetDateTime,
    pub predictions_count: i64,
}
