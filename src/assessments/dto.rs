use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime};

use crate::assessments::repo_types::{Assessment, AssessmentFilter, AssessmentWithUser};
use crate::error::ApiError;
use crate::risk::{FeatureVector, RiskCategory};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 10;

/// Result of scoring one feature vector. The probability is reported on a
/// 0-100 scale, rounded to two decimals.
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub probability: f64,
    pub risk_category: RiskCategory,
    pub recommendation: &'static str,
}

/// Doctor-view record: features nested under their own key, owner exposed
/// by username.
#[derive(Debug, Serialize)]
pub struct AssessmentRecord {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub features: FeatureVector,
    pub probability: f64,
    pub risk_category: RiskCategory,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<AssessmentWithUser> for AssessmentRecord {
    fn from(row: AssessmentWithUser) -> Self {
        Self {
            features: row.features(),
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            probability: row.probability,
            risk_category: row.risk_category,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentPageResponse {
    pub assessments: Vec<AssessmentRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// One patient with their complete history, for the doctor detail view.
#[derive(Debug, Serialize)]
pub struct PatientProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered: OffsetDateTime,
    pub predictions: Vec<Assessment>,
}

/// Raw doctor-view query string. Everything is optional and tolerated:
/// unusable page/per_page values fall back to defaults, while an unusable
/// filter value is a validation error rather than a silently wider result.
#[derive(Debug, Default, Deserialize)]
pub struct AssessmentListQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub risk: Option<String>,
    pub username: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn parse_positive(value: &Option<String>, default: i64) -> i64 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

fn parse_date(field: &str, value: &str) -> Result<Date, ApiError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, &format)
        .map_err(|_| ApiError::Validation(format!("{field} must be formatted YYYY-MM-DD")))
}

impl AssessmentListQuery {
    pub fn page(&self) -> i64 {
        parse_positive(&self.page, DEFAULT_PAGE)
    }

    pub fn per_page(&self) -> i64 {
        parse_positive(&self.per_page, DEFAULT_PER_PAGE)
    }

    pub fn filter(&self) -> Result<AssessmentFilter, ApiError> {
        let risk = match self.risk.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(RiskCategory::parse(value).ok_or_else(|| {
                ApiError::Validation("risk must be one of LOW, MEDIUM, HIGH".into())
            })?),
        };
        let username_substring = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let start_date = match self.start_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_date("start_date", value)?),
        };
        let end_date = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_date("end_date", value)?),
        };
        Ok(AssessmentFilter {
            risk,
            username_substring,
            start_date,
            end_date,
        })
    }
}
