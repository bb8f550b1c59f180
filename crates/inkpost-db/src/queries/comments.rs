use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};

use super::{OptionalExt, placeholders};
use crate::models::CommentRow;
use crate::{Database, timestamp_now};

const COMMENT_COLUMNS: &str =
    "id, blog_id, author_id, content, created_at, parent_id, upvotes, downvotes";

impl Database {
    // -- Comments --

    pub fn create_comment(
        &self,
        blog_id: i64,
        author_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (blog_id, author_id, content, created_at, parent_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![blog_id, author_id, content, timestamp_now(), parent_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS);
            conn.query_row(&sql, [id], map_comment).optional()
        })
    }

    /// Every comment of the given blogs, oldest first. Callers assemble the
    /// reply tree from `parent_id`.
    pub fn get_comments_for_blogs(&self, blog_ids: &[i64]) -> Result<Vec<CommentRow>> {
        if blog_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM comments WHERE blog_id IN ({}) ORDER BY created_at ASC, id ASC",
                COMMENT_COLUMNS,
                placeholders(blog_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(blog_ids.iter()), map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes the comment with all of its replies and their votes.
    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn map_comment(row: &Row) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        blog_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        parent_id: row.get(5)?,
        upvotes: row.get(6)?,
        downvotes: row.get(7)?,
    })
}
