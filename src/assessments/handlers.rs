use axum::{
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    assessments::{
        dto::{
            AssessmentListQuery, AssessmentPageResponse, AssessmentRecord,
            PatientProfileResponse, PredictionResponse,
        },
        export, repo,
        repo_types::{Assessment, PatientSummary},
    },
    auth::extractors::{DoctorSession, PatientSession},
    error::ApiError,
    extract::FormOrJson,
    risk::{FeatureVector, RiskCategory, FEATURE_METADATA, FEATURE_NAMES},
    state::AppState,
};

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/api/predict", post(predict))
        .route("/patient/assessments", get(patient_assessments))
}

pub fn doctor_routes() -> Router<AppState> {
    Router::new()
        .route("/doctor/assessments", get(doctor_assessments))
        .route("/doctor/assessments.csv", get(doctor_assessments_csv))
        .route("/doctor/patients", get(doctor_patients))
        .route("/doctor/patients/:id", get(doctor_patient_details))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/features", get(api_features))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score one feature vector and persist the assessment. A storage failure
/// while recording does not lose the computation: the result is still
/// returned and the failure is only logged.
#[instrument(skip(state, payload))]
pub async fn predict(
    State(state): State<AppState>,
    PatientSession(session): PatientSession,
    payload: FormOrJson<FeatureVector>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let features = payload.into_inner();

    let probability = state.model.score(&features);
    let risk_category = RiskCategory::from_probability(probability);

    match repo::record(&state.db, session.user_id, &features, probability, risk_category).await {
        Ok(id) => {
            info!(
                assessment_id = id,
                user_id = session.user_id,
                username = %session.username,
                category = risk_category.as_str(),
                "assessment recorded"
            );
        }
        Err(e) => {
            warn!(error = %e, user_id = session.user_id, "failed to record assessment");
        }
    }

    Ok(Json(PredictionResponse {
        success: true,
        probability: round2(probability * 100.0),
        risk_category,
        recommendation: risk_category.recommendation(),
    }))
}

#[instrument(skip(state))]
pub async fn patient_assessments(
    State(state): State<AppState>,
    PatientSession(session): PatientSession,
) -> Result<Json<Vec<Assessment>>, ApiError> {
    let rows = repo::list_for_patient(&state.db, session.user_id).await?;
    Ok(Json(rows))
}

#[instrument(skip(state, _session))]
pub async fn doctor_assessments(
    State(state): State<AppState>,
    _session: DoctorSession,
    Query(query): Query<AssessmentListQuery>,
) -> Result<Json<AssessmentPageResponse>, ApiError> {
    let filter = query.filter()?;
    let page = query.page();
    let per_page = query.per_page();

    let result = repo::list_all(&state.db, &filter, page, per_page).await?;
    let total_pages = std::cmp::max(1, (result.total + per_page - 1) / per_page);

    Ok(Json(AssessmentPageResponse {
        assessments: result.rows.into_iter().map(AssessmentRecord::from).collect(),
        total: result.total,
        page,
        per_page,
        total_pages,
    }))
}

#[instrument(skip(state, session))]
pub async fn doctor_assessments_csv(
    State(state): State<AppState>,
    DoctorSession(session): DoctorSession,
    Query(query): Query<AssessmentListQuery>,
) -> Result<Response, ApiError> {
    let filter = query.filter()?;
    let rows = repo::list_all_filtered(&state.db, &filter).await?;
    let records: Vec<AssessmentRecord> = rows.into_iter().map(AssessmentRecord::from).collect();
    let body = export::write_csv(&records)?;
    info!(user_id = session.user_id, rows = records.len(), "assessments exported");

    Ok((
        [
            (CONTENT_TYPE, "text/csv"),
            (
                CONTENT_DISPOSITION,
                "attachment; filename=patient_assessments.csv",
            ),
        ],
        body,
    )
        .into_response())
}

#[instrument(skip(state, _session))]
pub async fn doctor_patients(
    State(state): State<AppState>,
    _session: DoctorSession,
) -> Result<Json<Vec<PatientSummary>>, ApiError> {
    let patients = repo::list_patients(&state.db).await?;
    Ok(Json(patients))
}

#[instrument(skip(state, _session))]
pub async fn doctor_patient_details(
    State(state): State<AppState>,
    _session: DoctorSession,
    Path(patient_id): Path<i64>,
) -> Result<Json<PatientProfileResponse>, ApiError> {
    let (patient, predictions) = repo::patient_profile(&state.db, patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;

    Ok(Json(PatientProfileResponse {
        id: patient.id,
        username: patient.username,
        email: patient.email,
        registered: patient.created_at,
        predictions,
    }))
}

/// Ordered feature list with display metadata. Public: the input form needs
/// it before any session exists.
#[instrument]
pub async fn api_features() -> Json<serde_json::Value> {
    let mut descriptions = serde_json::Map::new();
    for meta in &FEATURE_METADATA {
        let mut entry = serde_json::Map::new();
        entry.insert("unit".into(), json!(meta.unit));
        entry.insert("min".into(), json!(meta.min));
        if let Some(max) = meta.max {
            entry.insert("max".into(), json!(max));
        }
        descriptions.insert(meta.name.to_string(), serde_json::Value::Object(entry));
    }

    Json(json!({
        "features": FEATURE_NAMES,
        "feature_descriptions": descriptions,
    }))
}
