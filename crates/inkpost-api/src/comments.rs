use std::collections::HashMap;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use inkpost_db::models::CommentRow;
use inkpost_db::parse_timestamp;
use inkpost_types::api::{CommentResponse, CreateCommentRequest};

use crate::blogs::{find_visible_blog, is_superuser};
use crate::error::{ApiError, Validator};
use crate::extract::{ApiJson, ApiPath, AuthUser};
use crate::{AppState, with_db};

fn comment_response(row: CommentRow, replies: Vec<CommentResponse>) -> CommentResponse {
    CommentResponse {
        id: row.id,
        content: row.content,
        blog: row.blog_id,
        parent: row.parent_id,
        created_at: parse_timestamp(&row.created_at).unwrap_or_default(),
        author: row.author_id,
        upvotes: row.upvotes,
        downvotes: row.downvotes,
        replies,
    }
}

/// Builds the nested reply tree from one blog's flat comment rows, given in
/// display order (created_at, then id). Returns the top-level comments.
///
/// A reply always has a larger id than its parent, so walking the rows by
/// descending id finishes every reply before the comment that holds it.
pub fn build_comment_tree(rows: Vec<CommentRow>) -> Vec<CommentResponse> {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in &rows {
        match row.parent_id {
            Some(parent) => children.entry(parent).or_default().push(row.id),
            None => roots.push(row.id),
        }
    }

    let mut by_id_desc = rows;
    by_id_desc.sort_by(|a, b| b.id.cmp(&a.id));

    let mut built: HashMap<i64, CommentResponse> = HashMap::with_capacity(by_id_desc.len());
    for row in by_id_desc {
        let replies = children
            .remove(&row.id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| built.remove(&id))
            .collect();
        built.insert(row.id, comment_response(row, replies));
    }

    roots.into_iter().filter_map(|id| built.remove(&id)).collect()
}

pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(blog_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.user_id;
    let row = with_db(&state, move |db| {
        if find_visible_blog(db, blog_id, Some(user_id))?.is_none() {
            return Ok(Err(ApiError::Missing("Blog not found.".into())));
        }

        if let Some(parent_id) = req.parent {
            match db.get_comment(parent_id)? {
                None => return Ok(Err(ApiError::BadRequest("Parent comment not found.".into()))),
                Some(parent) if parent.blog_id != blog_id => {
                    return Ok(Err(ApiError::BadRequest(
                        "Parent comment must belong to the same blog.".into(),
                    )));
                }
                Some(_) => {}
            }
        }

        let mut v = Validator::new();
        let content = v.required("content", req.content.as_deref()).map(str::to_owned);
        if let Err(e) = v.finish() {
            return Ok(Err(e));
        }
        let content = content.unwrap_or_default();

        let id = db.create_comment(blog_id, user_id, &content, req.parent)?;
        Ok(db.get_comment(id)?.ok_or_else(ApiError::not_found))
    })
    .await??;

    info!("User {} commented on blog {}", user_id, blog_id);
    Ok((StatusCode::CREATED, Json(comment_response(row, Vec::new()))))
}

/// Authors may delete their own comments, superusers any comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(comment_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.user_id;
    with_db(&state, move |db| {
        let Some(comment) = db.get_comment(comment_id)? else {
            return Ok(Err(ApiError::not_found()));
        };
        if comment.author_id != user_id && !is_superuser(db, user_id)? {
            return Ok(Err(ApiError::Forbidden(
                "You do not have permission to delete this comment".into(),
            )));
        }
        db.delete_comment(comment_id)?;
        Ok(Ok(()))
    })
    .await??;

    info!("User {} deleted comment {}", user_id, comment_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>, created_at: &str) -> CommentRow {
        CommentRow {
            id,
            blog_id: 1,
            author_id: 1,
            content: format!("comment {}", id),
            created_at: created_at.to_string(),
            parent_id,
            upvotes: 0,
            downvotes: 0,
        }
    }

    fn ids(comments: &[CommentResponse]) -> Vec<i64> {
        comments.iter().map(|c| c.id).collect()
    }

    #[test]
    fn replies_nest_under_their_parent_in_order() {
        let rows = vec![
            row(1, None, "2026-01-01T00:00:01.000000Z"),
            row(2, Some(1), "2026-01-01T00:00:02.000000Z"),
            row(3, None, "2026-01-01T00:00:03.000000Z"),
            row(4, Some(2), "2026-01-01T00:00:04.000000Z"),
            row(5, Some(1), "2026-01-01T00:00:05.000000Z"),
        ];

        let tree = build_comment_tree(rows);
        assert_eq!(ids(&tree), vec![1, 3]);
        assert_eq!(ids(&tree[0].replies), vec![2, 5]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![4]);
        assert!(tree[1].replies.is_empty());
        assert_eq!(tree[0].replies[0].parent, Some(1));
    }

    #[test]
    fn long_reply_chains_build_fully() {
        let rows: Vec<CommentRow> = (1..=1_000)
            .map(|id| row(id, (id > 1).then(|| id - 1), "2026-01-01T00:00:00.000000Z"))
            .collect();

        let tree = build_comment_tree(rows);
        assert_eq!(tree.len(), 1);

        let mut depth = 0;
        let mut node = &tree[0];
        while let Some(next) = node.replies.first() {
            depth += 1;
            node = next;
        }
        assert_eq!(depth, 999);
    }
}
