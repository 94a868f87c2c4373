use axum::{
    extract::{FromRef, FromRequestParts},
    http::{
        header::{ACCEPT, AUTHORIZATION, COOKIE},
        request::Parts, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::auth::dto::SessionKeys;
use crate::auth::repo_types::Role;

pub const SESSION_COOKIE: &str = "cad_session";
pub const SESSION_COOKIE_MAX_AGE: i64 = 24 * 3600;

/// `Set-Cookie` value carrying a freshly signed session token.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={SESSION_COOKIE_MAX_AGE}"
    )
}

/// `Set-Cookie` value that instructs the client to discard the session.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

/// Verified identity of the current request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
    pub username: String,
}

/// Session narrowed to the patient role.
pub struct PatientSession(pub Session);

/// Session narrowed to the doctor role.
pub struct DoctorSession(pub Session);

/// Single deny signal for the whole service: browsers are sent to the login
/// page, API clients get 401. A wrong role produces exactly the same
/// response as a missing session.
pub struct AuthRedirect {
    wants_html: bool,
}

impl AuthRedirect {
    fn from_parts(parts: &Parts) -> Self {
        let wants_html = parts
            .headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false);
        Self { wants_html }
    }
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        if self.wants_html {
            Redirect::to("/login").into_response()
        } else {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
                .into_response()
        }
    }
}

/// The session token travels as a cookie for the web flow and may also be
/// supplied as a bearer header by API clients.
fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
            })
        });
    if from_cookie.is_some() {
        return from_cookie;
    }

    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        let Some(token) = token_from_parts(parts) else {
            return Err(AuthRedirect::from_parts(parts));
        };

        match keys.verify(&token) {
            Ok(claims) => Ok(Session {
                user_id: claims.sub,
                role: claims.role,
                username: claims.username,
            }),
            Err(_) => {
                warn!("invalid or expired session token");
                Err(AuthRedirect::from_parts(parts))
            }
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for PatientSession
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        if session.role != Role::Patient {
            warn!(user_id = session.user_id, "patient route denied");
            return Err(AuthRedirect::from_parts(parts));
        }
        Ok(PatientSession(session))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for DoctorSession
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        if session.role != Role::Doctor {
            warn!(user_id = session.user_id, "doctor route denied");
            return Err(AuthRedirect::from_parts(parts));
        }
        Ok(DoctorSession(session))
    }
}
