pub mod auth;
pub mod blogs;
pub mod cache;
pub mod comments;
pub mod error;
pub mod extract;
pub mod media;
pub mod middleware;
pub mod profile;
pub mod routes;
pub mod votes;

use std::sync::Arc;

use inkpost_db::Database;

use crate::auth::AuthConfig;
use crate::cache::BlogListCache;
use crate::error::ApiError;
use crate::media::MediaStorage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub auth: AuthConfig,
    pub cache: BlogListCache,
    pub media: MediaStorage,
}

/// Runs a database closure on the blocking pool.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
        .map_err(ApiError::from)
}
