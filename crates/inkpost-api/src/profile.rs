use axum::{Json, extract::State};
use tracing::info;

use inkpost_db::models::{ProfileChanges, UserRow};
use inkpost_types::api::{ProfileResponse, UpdateProfileRequest};

use crate::auth::{check_email, check_username, taken_error};
use crate::error::{ApiError, Validator};
use crate::extract::{ApiJson, AuthUser};
use crate::media::{MediaStorage, decode_image};
use crate::{AppState, with_db};

fn profile_response(user: UserRow, media: &MediaStorage) -> ProfileResponse {
    ProfileResponse {
        username: user.username,
        email: user.email,
        bio: user.bio,
        phone_number: user.phone_number,
        profile_picture: user.profile_picture.map(|p| media.url(&p)),
    }
}

async fn load_user(state: &AppState, user_id: i64) -> Result<UserRow, ApiError> {
    with_db(state, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = load_user(&state, claims.user_id).await?;
    Ok(Json(profile_response(user, &state.media)))
}

/// Partial update of the caller's own profile.
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = claims.user_id;
    let mut v = Validator::new();

    if let Some(username) = &req.username {
        if v.required("username", Some(username.as_str())).is_some() {
            check_username(&mut v, username);
        }
    }
    if let Some(email) = &req.email {
        if v.required("email", Some(email.as_str())).is_some() {
            check_email(&mut v, email);
        }
    }
    if let Some(Some(phone)) = &req.phone_number {
        v.max_chars("phone_number", phone, 15);
    }
    let picture = match req.profile_picture.clone() {
        Some(Some(data)) => {
            // Image decoding is CPU-bound
            let decoded = tokio::task::spawn_blocking(move || decode_image(&data))
                .await
                .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
            if decoded.is_none() {
                v.add("profile_picture", "Invalid Base64 image data.");
            }
            decoded
        }
        _ => None,
    };
    v.finish()?;

    let mut changes = ProfileChanges {
        username: req.username,
        email: req.email,
        bio: req.bio,
        phone_number: req.phone_number,
        profile_picture: None,
    };
    let mut stored = None;
    match (picture, req.profile_picture) {
        (Some(bytes), _) => {
            let path = state.media.save_profile_picture(&bytes).await?;
            changes.profile_picture = Some(Some(path.clone()));
            stored = Some(path);
        }
        // Explicit null clears the picture
        (None, Some(None)) => changes.profile_picture = Some(None),
        _ => {}
    }

    let updated = with_db(&state, move |db| {
        Ok(match db.update_profile(user_id, &changes)? {
            Ok(()) => Ok(db.get_user_by_id(user_id)?),
            Err(clash) => Err(taken_error(
                clash,
                "A user with that username already exists.",
                "A user with that email already exists.",
            )),
        })
    })
    .await;

    // The new picture is only referenced once the update committed
    let user = match updated {
        Ok(Ok(user)) => user,
        Ok(Err(e)) | Err(e) => {
            if let Some(path) = &stored {
                state.media.remove(path).await;
            }
            return Err(e);
        }
    }
    .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    info!("User {} updated their profile", user_id);
    Ok(Json(profile_response(user, &state.media)))
}
