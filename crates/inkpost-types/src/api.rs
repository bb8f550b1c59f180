use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TokenType;

// -- JWT Claims --

/// JWT claims for both access and refresh tokens. `token_type` keeps a
/// refresh token from being accepted where an access token is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub token_type: TokenType,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// -- Profile --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    /// Public URL of the stored picture, e.g. `/media/profile_pictures/x.png`.
    pub profile_picture: Option<String>,
}

/// Partial profile update. For the nullable fields an explicit `null`
/// clears the value while an absent key leaves it untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub profile_picture: Option<Option<String>>,
}

// -- Blogs --

#[derive(Debug, Default, Deserialize)]
pub struct CreateBlogRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Usernames of the users tagged in the post.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBlogRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    /// User id of the author.
    pub author: i64,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub publication_date: Option<DateTime<Utc>>,
    pub comments_count: usize,
    pub comments: Vec<CommentResponse>,
    pub upvotes: i64,
    pub downvotes: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlogPage {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<BlogResponse>,
}

// -- Votes --

#[derive(Debug, Default, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub vote_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

// -- Comments --

#[derive(Debug, Default, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parent: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub content: String,
    pub blog: i64,
    pub parent: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub author: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub replies: Vec<CommentResponse>,
}
