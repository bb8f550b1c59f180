//! Database row types. These map directly to SQLite rows.
//! Distinct from inkpost-types API models to keep the DB layer independent.

use inkpost_types::models::VoteType;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
    pub is_superuser: bool,
    pub date_joined: String,
}

pub struct BlogRow {
    pub id: i64,
    pub title: String,
    pub publication_date: Option<String>,
    pub author_id: i64,
    pub content: String,
    pub category: String,
    pub is_published: bool,
    pub upvote_count: i64,
    pub downvote_count: i64,
}

pub struct BlogTagRow {
    pub blog_id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub blog_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: String,
    pub parent_id: Option<i64>,
    pub upvotes: i64,
    pub downvotes: i64,
}

// -- Write models --

/// Unique user columns already held by another account.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TakenFields {
    pub username: bool,
    pub email: bool,
}

impl TakenFields {
    pub fn any(&self) -> bool {
        self.username || self.email
    }
}

pub struct NewBlog {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_published: bool,
    pub tag_ids: Vec<i64>,
}

/// Only the `Some` fields are written.
#[derive(Default)]
pub struct BlogChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub is_published: Option<bool>,
    pub tag_ids: Option<Vec<i64>>,
}

/// Outer `None` leaves a column alone, `Some(None)` sets it to NULL.
#[derive(Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<Option<String>>,
    pub phone_number: Option<Option<String>>,
    pub profile_picture: Option<Option<String>>,
}

/// Published-listing filters. Empty `tags` means no tag filter.
#[derive(Debug, Default, Clone)]
pub struct BlogFilter {
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub search_title: Option<String>,
}

// -- Votes --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Blog,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    Created,
    Switched { from: VoteType },
    /// The user already holds this exact vote; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub change: VoteChange,
    pub upvotes: i64,
    pub downvotes: i64,
}
