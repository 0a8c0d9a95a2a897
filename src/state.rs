use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connects the pool; the caller keeps the returned handle to close it on shutdown.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect_with(config.connect_options()?)
            .await
            .context("connect to database")?;

        let state = Self::from_parts(Arc::new(PgUserStore::new(db.clone())), Arc::new(config));
        Ok((state, db))
    }

    pub fn from_parts(users: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self { users, config }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::users::memory::MemoryUserStore;

        Self::from_parts(
            Arc::new(MemoryUserStore::new()),
            Arc::new(crate::config::test_config()),
        )
    }
}
