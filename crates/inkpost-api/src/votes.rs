use axum::{
    Json,
    extract::State,
};
use tracing::debug;

use inkpost_db::models::{VoteChange, VoteOutcome, VoteTarget};
use inkpost_types::api::{MessageResponse, VoteRequest, VoteTally};
use inkpost_types::models::VoteType;

use crate::blogs::find_visible_blog;
use crate::error::{ApiError, Validator};
use crate::extract::{ApiJson, ApiPath, AuthUser};
use crate::{AppState, with_db};

const ALREADY_VOTED: &str = "You have already cast this vote.";

/// Casts the vote and maps a repeated identical vote to a conflict.
async fn cast(
    state: &AppState,
    target: VoteTarget,
    target_id: i64,
    user_id: i64,
    vote_type: VoteType,
) -> Result<VoteOutcome, ApiError> {
    let outcome = with_db(state, move |db| {
        db.cast_vote(target, target_id, user_id, vote_type)
    })
    .await?
    .ok_or_else(ApiError::not_found)?;

    if outcome.change == VoteChange::Unchanged {
        return Err(ApiError::Conflict(ALREADY_VOTED.into()));
    }
    debug!(
        "User {} {:?} on {:?} {}: {:?}",
        user_id, vote_type, target, target_id, outcome.change
    );
    Ok(outcome)
}

/// Upvote or downvote a blog, or switch an earlier vote. Responds with the
/// new tallies.
pub async fn vote_blog(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(blog_id): ApiPath<i64>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> Result<Json<VoteTally>, ApiError> {
    let user_id = claims.user_id;
    with_db(&state, move |db| find_visible_blog(db, blog_id, Some(user_id)))
        .await?
        .ok_or_else(ApiError::not_found)?;

    let vote_type = req
        .vote_type
        .as_deref()
        .and_then(|v| v.parse::<VoteType>().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid vote type.".into()))?;

    let outcome = cast(&state, VoteTarget::Blog, blog_id, user_id, vote_type).await?;
    Ok(Json(VoteTally {
        upvotes: outcome.upvotes,
        downvotes: outcome.downvotes,
    }))
}

pub async fn vote_comment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(comment_id): ApiPath<i64>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = claims.user_id;
    let visible = with_db(&state, move |db| {
        Ok(match db.get_comment(comment_id)? {
            Some(comment) => find_visible_blog(db, comment.blog_id, Some(user_id))?.is_some(),
            None => false,
        })
    })
    .await?;
    if !visible {
        return Err(ApiError::not_found());
    }

    let mut v = Validator::new();
    let raw = v.required("vote_type", req.vote_type.as_deref()).map(str::to_owned);
    v.finish()?;
    let vote_type = raw
        .unwrap_or_default()
        .parse::<VoteType>()
        .map_err(|msg| ApiError::field("vote_type", msg))?;

    let outcome = cast(&state, VoteTarget::Comment, comment_id, user_id, vote_type).await?;
    Ok(Json(MessageResponse::new(comment_vote_message(
        outcome.change,
        vote_type,
    ))))
}

fn comment_vote_message(change: VoteChange, vote_type: VoteType) -> String {
    match change {
        VoteChange::Switched { .. } => format!("Your vote has been updated to {}.", vote_type),
        _ => format!("You have successfully {}d the comment.", vote_type),
    }
}
