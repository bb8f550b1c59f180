use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use inkpost_types::models::TokenType;

use crate::AppState;
use crate::auth::decode_token;
use crate::error::ApiError;

pub const INVALID_TOKEN: &str = "Given token not valid for any token type";

/// Validates a Bearer access token when one is sent and stores its claims in
/// the request extensions. Requests without one pass through anonymously;
/// handlers that need a user reject them through [`crate::extract::AuthUser`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.into()))
        })
        .transpose()?;

    if let Some(token) = token {
        let claims = decode_token(&state.auth, &token, TokenType::Access)
            .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN.into()))?;
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}
