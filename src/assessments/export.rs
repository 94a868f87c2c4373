use time::format_description::well_known::Rfc3339;

use crate::assessments::dto::AssessmentRecord;
use crate::error::ApiError;

/// Fixed export column order: metadata first, then the features in training
/// order.
pub const EXPORT_COLUMNS: [&str; 18] = [
    "id",
    "user_id",
    "username",
    "created_at",
    "probability",
    "risk_category",
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

/// Render rows as CSV in the order they were given. Filtering and ordering
/// are the repository's job; quoting is the csv writer's.
pub fn write_csv(rows: &[AssessmentRecord]) -> Result<String, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_COLUMNS)
        .map_err(|e| ApiError::Storage(e.into()))?;

    for row in rows {
        let created_at = row
            .created_at
            .format(&Rfc3339)
            .map_err(|e| ApiError::Storage(e.into()))?;
        let f = &row.features;
        writer
            .write_record([
                row.id.to_string(),
                row.user_id.to_string(),
                row.username.clone(),
                created_at,
                row.probability.to_string(),
                row.risk_category.as_str().to_string(),
                f.age.to_string(),
                f.anaemia.to_string(),
                f.creatinine_phosphokinase.to_string(),
                f.diabetes.to_string(),
                f.ejection_fraction.to_string(),
                f.high_blood_pressure.to_string(),
                f.platelets.to_string(),
                f.serum_creatinine.to_string(),
                f.serum_sodium.to_string(),
                f.sex.to_string(),
                f.smoking.to_string(),
                f.time.to_string(),
            ])
            .map_err(|e| ApiError::Storage(e.into()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("flush csv writer: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Storage(e.into()))
}
