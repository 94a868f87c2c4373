use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::{Date, OffsetDateTime};

use crate::assessments::repo_types::{
    Assessment, AssessmentFilter, AssessmentWithUser, PatientSummary,
};
use crate::auth::repo_types::User;
use crate::error::ApiError;
use crate::risk::{FeatureVector, RiskCategory};

const ASSESSMENT_COLUMNS: &str = "id, user_id, age, anaemia, creatinine_phosphokinase, diabetes, \
     ejection_fraction, high_blood_pressure, platelets, serum_creatinine, serum_sodium, \
     sex, smoking, time, probability, risk_category, created_at";

const JOINED_SELECT: &str = "SELECT a.id, a.user_id, u.username, a.age, a.anaemia, \
     a.creatinine_phosphokinase, a.diabetes, a.ejection_fraction, a.high_blood_pressure, \
     a.platelets, a.serum_creatinine, a.serum_sodium, a.sex, a.smoking, a.time, \
     a.probability, a.risk_category, a.created_at \
     FROM assessments a JOIN users u ON u.id = a.user_id";

// Newest first; rows sharing a second keep insertion order so pagination is
// deterministic.
const JOINED_ORDER: &str = " ORDER BY datetime(a.created_at) DESC, a.id ASC";

pub struct AssessmentPage {
    pub rows: Vec<AssessmentWithUser>,
    pub total: i64,
}

/// Insert one immutable assessment row on behalf of a patient.
pub async fn record(
    db: &SqlitePool,
    user_id: i64,
    features: &FeatureVector,
    probability: f64,
    risk_category: RiskCategory,
) -> Result<i64, ApiError> {
    let result = sqlx::query(
        r#"
        INSERT INTO assessments
            (user_id, age, anaemia, creatinine_phosphokinase, diabetes,
             ejection_fraction, high_blood_pressure, platelets,
             serum_creatinine, serum_sodium, sex, smoking, time,
             probability, risk_category, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(features.age)
    .bind(features.anaemia)
    .bind(features.creatinine_phosphokinase)
    .bind(features.diabetes)
    .bind(features.ejection_fraction)
    .bind(features.high_blood_pressure)
    .bind(features.platelets)
    .bind(features.serum_creatinine)
    .bind(features.serum_sodium)
    .bind(features.sex)
    .bind(features.smoking)
    .bind(features.time)
    .bind(probability)
    .bind(risk_category)
    .bind(OffsetDateTime::now_utc())
    .execute(db)
    .await?;
    Ok(result.last_insert_rowid())
}

/// All assessments owned by one patient, newest first. Bounded by a single
/// patient's history, so no pagination.
pub async fn list_for_patient(
    db: &SqlitePool,
    user_id: i64,
) -> Result<Vec<Assessment>, ApiError> {
    let rows = sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE user_id = ? \
         ORDER BY datetime(created_at) DESC, id ASC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn start_bound(date: Date) -> String {
    format!("{date} 00:00:00")
}

fn end_bound(date: Date) -> String {
    format!("{date} 23:59:59")
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AssessmentFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(risk) = filter.risk {
        qb.push(" AND a.risk_category = ").push_bind(risk.as_str());
    }
    if let Some(ref username) = filter.username_substring {
        qb.push(" AND lower(u.username) LIKE ")
            .push_bind(format!("%{}%", escape_like(&username.to_lowercase())))
            .push(" ESCAPE '\\'");
    }
    // datetime() normalizes both sides to whole seconds, keeping the bounds
    // inclusive.
    if let Some(start) = filter.start_date {
        qb.push(" AND datetime(a.created_at) >= datetime(")
            .push_bind(start_bound(start))
            .push(")");
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND datetime(a.created_at) <= datetime(")
            .push_bind(end_bound(end))
            .push(")");
    }
}

/// One page of the doctor view plus the total number of matching rows.
/// Pages are 1-indexed; a page past the end yields an empty slice.
pub async fn list_all(
    db: &SqlitePool,
    filter: &AssessmentFilter,
    page: i64,
    per_page: i64,
) -> Result<AssessmentPage, ApiError> {
    let mut count_qb = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM assessments a JOIN users u ON u.id = a.user_id",
    );
    push_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(JOINED_SELECT);
    push_filters(&mut qb, filter);
    qb.push(JOINED_ORDER);
    qb.push(" LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind((page - 1) * per_page);

    let rows = qb
        .build_query_as::<AssessmentWithUser>()
        .fetch_all(db)
        .await?;
    Ok(AssessmentPage { rows, total })
}

/// The complete filtered set, unpaginated, for bulk export.
pub async fn list_all_filtered(
    db: &SqlitePool,
    filter: &AssessmentFilter,
) -> Result<Vec<AssessmentWithUser>, ApiError> {
    let mut qb = QueryBuilder::<Sqlite>::new(JOINED_SELECT);
    push_filters(&mut qb, filter);
    qb.push(JOINED_ORDER);
    let rows = qb
        .build_query_as::<AssessmentWithUser>()
        .fetch_all(db)
        .await?;
    Ok(rows)
}

/// Every patient with their assessment count, for the doctor dashboard.
pub async fn list_patients(db: &SqlitePool) -> Result<Vec<PatientSummary>, ApiError> {
    let rows = sqlx::query_as::<_, PatientSummary>(
        r#"
        SELECT u.id, u.username, u.email, u.created_at AS registered,
               COUNT(a.id) AS predictions_count
        FROM users u
        LEFT JOIN assessments a ON a.user_id = u.id
        WHERE u.role = 'patient'
        GROUP BY u.id
        ORDER BY u.id ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// One patient and their full history, or `None` when the id does not name
/// a patient.
pub async fn patient_profile(
    db: &SqlitePool,
    patient_id: i64,
) -> Result<Option<(User, Vec<Assessment>)>, ApiError> {
    let patient = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, role, created_at \
         FROM users WHERE id = ? AND role = 'patient'",
    )
    .bind(patient_id)
    .fetch_optional(db)
    .await?;

    let Some(patient) = patient else {
        return Ok(None);
    };
    let assessments = list_for_patient(db, patient.id).await?;
    Ok(Some((patient, assessments)))
}
