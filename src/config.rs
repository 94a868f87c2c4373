use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub model_path: String,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:cad_system.db?mode=rwc".into());
        let model_path =
            std::env::var("MODEL_PATH").unwrap_or_else(|_| "model/cad_model.json".into());
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".into()),
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "cadscore".into()),
            audience: std::env::var("SESSION_AUDIENCE")
                .unwrap_or_else(|_| "cadscore-users".into()),
            ttl_hours: std::env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24),
        };
        Ok(Self {
            database_url,
            model_path,
            session,
        })
    }
}
