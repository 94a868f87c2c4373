use axum::{
    extract::{Form, FromRequest, Json, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// One typed payload regardless of transport: JSON bodies go through
/// `axum::Json`, everything else through `axum::Form`. Handlers keep the
/// variant so browser submissions can be answered with redirects and API
/// calls with JSON.
pub enum FormOrJson<T> {
    Form(T),
    Json(T),
}

impl<T> FormOrJson<T> {
    pub fn into_inner(self) -> T {
        match self {
            FormOrJson::Form(v) | FormOrJson::Json(v) => v,
        }
    }

    pub fn is_form(&self) -> bool {
        matches!(self, FormOrJson::Form(_))
    }
}

#[axum::async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(e.body_text()))?;
            Ok(FormOrJson::Json(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(e.body_text()))?;
            Ok(FormOrJson::Form(value))
        }
    }
}
