use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::auth::repo_types::{Role, User};
use crate::error::ApiError;

/// Changed fields of a partial profile update; `None` leaves a field as is.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

/// The UNIQUE indexes on users are the authority for duplicates; a violation
/// that slips past the application-level pre-check comes back here and is
/// reported as the same validation failure.
fn map_unique_violation(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = db.message();
            if message.contains("users.username") {
                return ApiError::Validation("Username already exists".into());
            }
            if message.contains("users.email") {
                return ApiError::Validation("Email already registered".into());
            }
            return ApiError::Validation("Username or email already exists".into());
        }
    }
    ApiError::from(e)
}

impl User {
    /// Find a user by username. Lookup is case-sensitive.
    pub async fn find_by_username(
        db: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    pub async fn create(
        db: &SqlitePool,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        role: Role,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, username, email, password_hash, role, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    /// Apply a partial profile update and return the updated row. `None`
    /// when the user does not exist.
    pub async fn update_profile(
        db: &SqlitePool,
        user_id: i64,
        changes: ProfileChanges,
    ) -> Result<Option<User>, ApiError> {
        if changes.is_empty() {
            return User::find_by_id(db, user_id).await;
        }

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE users SET ");
        let mut fields = qb.separated(", ");
        if let Some(ref username) = changes.username {
            fields.push("username = ").push_bind_unseparated(username);
        }
        if let Some(ref email) = changes.email {
            fields.push("email = ").push_bind_unseparated(email);
        }
        if let Some(ref password_hash) = changes.password_hash {
            fields
                .push("password_hash = ")
                .push_bind_unseparated(password_hash);
        }
        qb.push(" WHERE id = ").push_bind(user_id);
        qb.push(" RETURNING id, username, email, password_hash, role, created_at");

        let user = qb
            .build_query_as::<User>()
            .fetch_optional(db)
            .await
            .map_err(map_unique_violation)?;
        Ok(user)
    }
}
