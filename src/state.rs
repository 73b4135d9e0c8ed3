use crate::cache::AppCache;
use crate::config::Config;
use crate::matcher::MatcherPool;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: SqlitePool,
    pub cache: AppCache,
    pub matcher: Arc<MatcherPool>,
}
