use std::sync::Arc;

use anyhow::Context;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::config::AppConfig;
use crate::risk::RiskModel;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub model: Arc<RiskModel>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let model = Arc::new(RiskModel::load(&config.model_path)?);

        Ok(Self { db, config, model })
    }

    /// Hermetic state over an in-memory database with migrations applied and
    /// a deterministic test model.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        use crate::config::SessionConfig;

        // A single connection keeps every query on the same in-memory database.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("migrations");

        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            model_path: String::new(),
            session: SessionConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_hours: 24,
            },
        });

        Self {
            db,
            config,
            model: Arc::new(RiskModel::time_only_for_tests()),
        }
    }
}
