use std::any::Any;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::INTERNAL_ERROR_BODY;
use crate::middleware::authenticate;
use crate::{AppState, auth, blogs, comments, profile, votes};

/// Room for base64 profile pictures
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the full HTTP application.
pub fn app(state: AppState) -> Router {
    let media = ServeDir::new(state.media.root());

    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/token/refresh", post(auth::refresh_token))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .route("/blogs/add", post(blogs::create_blog))
        .route("/blogs/user", get(blogs::user_blogs))
        .route("/blogs/user/draft", get(blogs::user_drafts))
        .route("/blogs/all", get(blogs::list_blogs))
        .route(
            "/blogs/{blog_id}",
            get(blogs::get_blog)
                .put(blogs::update_blog)
                .delete(blogs::delete_blog),
        )
        .route("/blogs/{blog_id}/delete", delete(blogs::delete_blog))
        .route("/blogs/{blog_id}/vote", post(votes::vote_blog))
        .route("/blogs/{blog_id}/comments", post(comments::create_comment))
        .route("/comments/{comment_id}", delete(comments::delete_comment))
        .route("/comments/{comment_id}/delete", delete(comments::delete_comment))
        .route("/comments/{comment_id}/vote", post(votes::vote_comment))
        .nest_service("/media", media)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
}
