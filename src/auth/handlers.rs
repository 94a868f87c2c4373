use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, ProfileUpdateRequest, PublicUser, RegisterRequest},
        extractors::{clear_session_cookie, session_cookie, Session},
        repo::ProfileChanges,
        repo_types::{Role, User},
        services::{hash_password, is_valid_email, verify_credentials, SessionKeys},
    },
    error::ApiError,
    extract::FormOrJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/update", post(profile_update))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: FormOrJson<RegisterRequest>,
) -> Result<Response, ApiError> {
    let from_form = payload.is_form();
    let payload = payload.into_inner();

    let username = payload.username.trim().to_string();
    let password = payload.password.trim().to_string();
    let confirm_password = payload.confirm_password.trim().to_string();
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let role = payload.role.unwrap_or(Role::Patient);

    if password != confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    if username.len() < 3 {
        return Err(ApiError::Validation(
            "Username must be at least 3 characters".into(),
        ));
    }
    if password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            warn!(email, "invalid email");
            return Err(ApiError::Validation("Invalid email address".into()));
        }
    }

    // Fast path; the UNIQUE index still decides under concurrent submission.
    if User::find_by_username(&state.db, &username).await?.is_some() {
        warn!(username = %username, "username already registered");
        return Err(ApiError::Validation("Username already exists".into()));
    }

    let hash = hash_password(&password)?;
    let user = User::create(&state.db, &username, email, &hash, role).await?;

    info!(user_id = user.id, username = %user.username, role = ?user.role, "user registered");
    if from_form {
        Ok(Redirect::to("/login").into_response())
    } else {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "success": true, "message": "Registration successful" })),
        )
            .into_response())
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: FormOrJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let from_form = payload.is_form();
    let payload = payload.into_inner();

    let username = payload.username.trim();
    let password = payload.password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::Validation("Username and password required".into()));
    }

    let user = verify_credentials(&state.db, username, password).await?;

    let keys = SessionKeys::from_ref(&state);
    let token = keys.sign(&user)?;
    let cookie = session_cookie(&token);

    info!(user_id = user.id, username = %user.username, "user logged in");
    if from_form {
        Ok((
            AppendHeaders([(SET_COOKIE, cookie)]),
            Redirect::to(user.role.dashboard_path()),
        )
            .into_response())
    } else {
        Ok((
            AppendHeaders([(SET_COOKIE, cookie)]),
            Json(AuthResponse {
                token,
                user: PublicUser::from(user),
            }),
        )
            .into_response())
    }
}

/// Sessions are stateless, so logout only tells the client to drop the
/// cookie.
#[instrument]
pub async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        Redirect::to("/login"),
    )
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, session.user_id)
        .await?
        .ok_or(ApiError::Authorization)?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn profile_update(
    State(state): State<AppState>,
    session: Session,
    payload: FormOrJson<ProfileUpdateRequest>,
) -> Result<Response, ApiError> {
    let payload = payload.into_inner();

    let new_username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let new_email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let new_password = payload
        .password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    if let Some(password) = new_password {
        if password.len() < 6 {
            return Err(ApiError::Validation(
                "Password must be at least 6 characters".into(),
            ));
        }
        let confirm = payload.confirm_password.as_deref().map(str::trim);
        if confirm != Some(password) {
            return Err(ApiError::Validation("Passwords do not match".into()));
        }
    }
    if let Some(username) = new_username {
        if username.len() < 3 {
            return Err(ApiError::Validation(
                "Username must be at least 3 characters".into(),
            ));
        }
    }
    if let Some(email) = new_email {
        if !is_valid_email(email) {
            return Err(ApiError::Validation("Invalid email address".into()));
        }
    }

    let changes = ProfileChanges {
        username: new_username.map(str::to_string),
        email: new_email.map(str::to_string),
        password_hash: match new_password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        },
    };

    let username_changed = changes.username.is_some();
    let user = User::update_profile(&state.db, session.user_id, changes)
        .await?
        .ok_or(ApiError::Authorization)?;

    info!(user_id = user.id, "profile updated");
    let body = Json(json!({ "success": true, "message": "Profile updated successfully" }));

    // The username travels inside the signed token, so a rename needs a
    // fresh cookie.
    if username_changed {
        let keys = SessionKeys::from_ref(&state);
        let token = keys.sign(&user)?;
        Ok((AppendHeaders([(SET_COOKIE, session_cookie(&token))]), body).into_response())
    } else {
        Ok(body.into_response())
    }
}
