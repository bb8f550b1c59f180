use std::collections::HashMap;

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use inkpost_db::models::{BlogChanges, BlogFilter, BlogRow, CommentRow, NewBlog};
use inkpost_db::{Database, parse_timestamp};
use inkpost_types::api::{BlogPage, BlogResponse, CommentResponse, CreateBlogRequest, UpdateBlogRequest};

use crate::cache::BlogListCache;
use crate::comments::build_comment_tree;
use crate::error::{ApiError, Validator};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser, MaybeAuthUser};
use crate::{AppState, with_db};

const TITLE_MAX: usize = 255;
const CATEGORY_MAX: usize = 100;
const UPDATABLE_FIELDS: &[&str] = &["title", "content", "category", "tags", "is_published"];

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 50;
const LIST_PATH: &str = "/blogs/all";

// -- Shared helpers --

pub(crate) fn is_superuser(db: &Database, user_id: i64) -> anyhow::Result<bool> {
    Ok(db
        .get_user_by_id(user_id)?
        .map(|u| u.is_superuser)
        .unwrap_or(false))
}

/// The blog, if `viewer` may see it. Drafts are only visible to their author.
pub(crate) fn find_visible_blog(
    db: &Database,
    blog_id: i64,
    viewer: Option<i64>,
) -> anyhow::Result<Option<BlogRow>> {
    Ok(db
        .get_blog(blog_id)?
        .filter(|b| b.is_published || Some(b.author_id) == viewer))
}

fn blog_response(
    row: BlogRow,
    tags: Vec<String>,
    comments_count: usize,
    comments: Vec<CommentResponse>,
) -> BlogResponse {
    BlogResponse {
        id: row.id,
        title: row.title,
        content: row.content,
        category: row.category,
        author: row.author_id,
        tags,
        is_published: row.is_published,
        publication_date: row.publication_date.as_deref().and_then(parse_timestamp),
        comments_count,
        comments,
        upvotes: row.upvote_count,
        downvotes: row.downvote_count,
    }
}

/// Loads tags and comments for the rows in two batch queries and assembles
/// the responses, keeping the rows' order.
pub(crate) fn render_blogs(db: &Database, rows: Vec<BlogRow>) -> anyhow::Result<Vec<BlogResponse>> {
    let ids: Vec<i64> = rows.iter().map(|b| b.id).collect();

    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    for tag in db.get_tags_for_blogs(&ids)? {
        tags.entry(tag.blog_id).or_default().push(tag.username);
    }

    let mut comments: HashMap<i64, Vec<CommentRow>> = HashMap::new();
    for comment in db.get_comments_for_blogs(&ids)? {
        comments.entry(comment.blog_id).or_default().push(comment);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let blog_comments = comments.remove(&row.id).unwrap_or_default();
            let count = blog_comments.len();
            let blog_tags = tags.remove(&row.id).unwrap_or_default();
            blog_response(row, blog_tags, count, build_comment_tree(blog_comments))
        })
        .collect())
}

fn render_one(db: &Database, row: BlogRow) -> anyhow::Result<BlogResponse> {
    render_blogs(db, vec![row])?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("rendering a blog produced no output"))
}

/// Maps tag usernames to user ids, recording an error for the first unknown name.
fn resolve_tags(db: &Database, v: &mut Validator, usernames: &[String]) -> anyhow::Result<Vec<i64>> {
    let found: HashMap<String, i64> = db
        .find_users_by_usernames(usernames)?
        .into_iter()
        .map(|(id, name)| (name, id))
        .collect();

    let mut ids = Vec::with_capacity(usernames.len());
    for name in usernames {
        match found.get(name) {
            Some(id) => ids.push(*id),
            None => {
                v.add("tags", format!("User '{}' does not exist.", name));
                break;
            }
        }
    }
    Ok(ids)
}

fn check_title(v: &mut Validator, title: &str) {
    v.max_chars("title", title, TITLE_MAX);
}

fn check_category(v: &mut Validator, category: &str) {
    v.max_chars("category", category, CATEGORY_MAX);
}

// -- Handlers --

pub async fn create_blog(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiJson(req): ApiJson<CreateBlogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    let title = v.required("title", req.title.as_deref()).map(str::to_owned);
    let content = v.required("content", req.content.as_deref()).map(str::to_owned);
    let category = v.required("category", req.category.as_deref()).map(str::to_owned);
    if let Some(title) = &title {
        check_title(&mut v, title);
    }
    if let Some(category) = &category {
        check_category(&mut v, category);
    }

    let author_id = claims.user_id;
    let blog = with_db(&state, move |db| {
        let tag_ids = resolve_tags(db, &mut v, &req.tags)?;
        if let Err(e) = v.finish() {
            return Ok(Err(e));
        }
        let (Some(title), Some(content), Some(category)) = (title, content, category) else {
            anyhow::bail!("create_blog: validated fields missing");
        };

        let id = db.create_blog(&NewBlog {
            author_id,
            title,
            content,
            category,
            is_published: req.is_published,
            tag_ids,
        })?;
        match db.get_blog(id)? {
            Some(row) => Ok(Ok(render_one(db, row)?)),
            None => anyhow::bail!("blog {} vanished after insert", id),
        }
    })
    .await??;

    info!("User {} created blog {}", author_id, blog.id);
    Ok((StatusCode::CREATED, Json(blog)))
}

/// All of the caller's posts, drafts included.
pub async fn user_blogs(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<BlogResponse>>, ApiError> {
    author_blogs(&state, claims.user_id, false).await
}

pub async fn user_drafts(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<BlogResponse>>, ApiError> {
    author_blogs(&state, claims.user_id, true).await
}

async fn author_blogs(
    state: &AppState,
    author_id: i64,
    drafts_only: bool,
) -> Result<Json<Vec<BlogResponse>>, ApiError> {
    let blogs = with_db(state, move |db| {
        let rows = db.blogs_by_author(author_id, drafts_only)?;
        render_blogs(db, rows)
    })
    .await?;
    Ok(Json(blogs))
}

pub async fn get_blog(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    ApiPath(blog_id): ApiPath<i64>,
) -> Result<Json<BlogResponse>, ApiError> {
    let viewer = claims.map(|c| c.user_id);
    let blog = with_db(&state, move |db| match find_visible_blog(db, blog_id, viewer)? {
        Some(row) => Ok(Some(render_one(db, row)?)),
        None => Ok(None),
    })
    .await?
    .ok_or_else(ApiError::not_found)?;
    Ok(Json(blog))
}

/// Partial update by the author. Only the fields in `UPDATABLE_FIELDS` may
/// be sent.
pub async fn update_blog(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(blog_id): ApiPath<i64>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<BlogResponse>, ApiError> {
    let Value::Object(fields) = body else {
        return Err(ApiError::field(
            "non_field_errors",
            "Invalid data. Expected a dictionary.",
        ));
    };

    let mut v = Validator::new();
    for name in fields.keys() {
        if !UPDATABLE_FIELDS.contains(&name.as_str()) {
            v.add(name, "This field is not allowed for update.");
        }
    }
    v.finish()?;

    let req: UpdateBlogRequest = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::Malformed(format!("JSON parse error - {}", e)))?;

    let mut v = Validator::new();
    if let Some(title) = &req.title {
        if v.required("title", Some(title.as_str())).is_some() {
            check_title(&mut v, title);
        }
    }
    if let Some(content) = &req.content {
        v.required("content", Some(content.as_str()));
    }
    if let Some(category) = &req.category {
        if v.required("category", Some(category.as_str())).is_some() {
            check_category(&mut v, category);
        }
    }

    let user_id = claims.user_id;
    let blog = with_db(&state, move |db| {
        let Some(blog) = find_visible_blog(db, blog_id, Some(user_id))? else {
            return Ok(Err(ApiError::not_found()));
        };
        if blog.author_id != user_id {
            return Ok(Err(ApiError::Forbidden(
                "You are not the author of this blog.".into(),
            )));
        }

        let tag_ids = match &req.tags {
            Some(tags) => Some(resolve_tags(db, &mut v, tags)?),
            None => None,
        };
        if let Err(e) = v.finish() {
            return Ok(Err(e));
        }

        db.update_blog(
            blog_id,
            &BlogChanges {
                title: req.title,
                content: req.content,
                category: req.category,
                is_published: req.is_published,
                tag_ids,
            },
        )?;
        match db.get_blog(blog_id)? {
            Some(row) => Ok(Ok(render_one(db, row)?)),
            None => Ok(Err(ApiError::not_found())),
        }
    })
    .await??;

    info!("User {} updated blog {}", user_id, blog_id);
    Ok(Json(blog))
}

/// Authors may delete their own posts, superusers any post.
pub async fn delete_blog(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ApiPath(blog_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.user_id;
    with_db(&state, move |db| {
        let Some(blog) = db.get_blog(blog_id)? else {
            return Ok(Err(ApiError::not_found()));
        };
        if blog.author_id != user_id && !is_superuser(db, user_id)? {
            // Someone else's draft stays hidden
            if !blog.is_published {
                return Ok(Err(ApiError::not_found()));
            }
            return Ok(Err(ApiError::Forbidden(
                "You do not have permission to delete this blog.".into(),
            )));
        }
        db.delete_blog(blog_id)?;
        Ok(Ok(()))
    })
    .await??;

    info!("User {} deleted blog {}", user_id, blog_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Listing --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub search_title: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRequest {
    Number(u64),
    Last,
}

impl PageRequest {
    /// Missing means the first page; anything but a positive integer or
    /// `last` is rejected.
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") => Some(PageRequest::Number(1)),
            Some("last") => Some(PageRequest::Last),
            Some(value) => match value.parse::<u64>() {
                Ok(n) if n >= 1 => Some(PageRequest::Number(n)),
                _ => None,
            },
        }
    }

    fn token(self) -> String {
        match self {
            PageRequest::Number(n) => n.to_string(),
            PageRequest::Last => "last".to_string(),
        }
    }

    /// Concrete page number, if it exists.
    fn resolve(self, num_pages: u64) -> Option<u64> {
        match self {
            PageRequest::Number(n) if n <= num_pages => Some(n),
            PageRequest::Number(_) => None,
            PageRequest::Last => Some(num_pages),
        }
    }
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Invalid page.".into())
}

/// Normalized listing parameters.
#[derive(Debug, Clone)]
struct Listing {
    filter: BlogFilter,
    page: PageRequest,
    page_size: u64,
    /// Whether the caller chose a page size; it is then carried into links.
    explicit_page_size: bool,
}

impl Listing {
    fn from_query(query: ListQuery) -> Result<Self, ApiError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        let mut tags: Vec<String> = query.tags.into_iter().filter(|t| !t.is_empty()).collect();
        tags.sort();
        tags.dedup();

        let page_size = match query.page_size.as_deref().map(str::trim).map(str::parse::<u64>) {
            Some(Ok(n)) if n >= 1 => n.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            filter: BlogFilter {
                author: non_empty(query.author),
                category: non_empty(query.category),
                tags,
                search_title: non_empty(query.search_title),
            },
            page: PageRequest::parse(query.page.as_deref()).ok_or_else(invalid_page)?,
            page_size,
            explicit_page_size: query.page_size.is_some(),
        })
    }

    /// Filter pairs in a fixed order, shared by links and the cache key.
    fn filter_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(author) = &self.filter.author {
            pairs.push(("author", author.clone()));
        }
        if let Some(category) = &self.filter.category {
            pairs.push(("category", category.clone()));
        }
        for tag in &self.filter.tags {
            pairs.push(("tags", tag.clone()));
        }
        if let Some(title) = &self.filter.search_title {
            pairs.push(("search_title", title.clone()));
        }
        pairs
    }

    fn cache_key(&self) -> String {
        let mut pairs = self.filter_pairs();
        pairs.push(("page_size", self.page_size.to_string()));
        // Links echo an explicit page_size, so it changes the body
        pairs.push(("page_size_given", self.explicit_page_size.to_string()));
        pairs.push(("page", self.page.token()));
        BlogListCache::key(&pairs)
    }

    /// Relative URL of another page with the same filters. Page 1 is written
    /// without a `page` parameter.
    fn page_url(&self, page: u64) -> anyhow::Result<String> {
        let mut pairs = self.filter_pairs();
        if self.explicit_page_size {
            pairs.push(("page_size", self.page_size.to_string()));
        }
        if page > 1 {
            pairs.push(("page", page.to_string()));
        }
        if pairs.is_empty() {
            return Ok(LIST_PATH.to_string());
        }
        Ok(format!("{}?{}", LIST_PATH, serde_urlencoded::to_string(&pairs)?))
    }
}

fn json_bytes(body: Bytes) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

/// Published posts, filtered and paginated. Rendered pages are cached for a
/// short while keyed by the normalized parameters.
pub async fn list_blogs(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Response, ApiError> {
    let listing = Listing::from_query(query)?;
    let key = listing.cache_key();

    if let Some(body) = state.cache.get(&key).await {
        debug!("Blog listing served from cache");
        return Ok(json_bytes(body));
    }

    let filter = listing.filter.clone();
    let (page_size, requested) = (listing.page_size, listing.page);
    let (count, page, num_pages, results) = with_db(&state, move |db| {
        let count = db.count_published_blogs(&filter)?;
        let num_pages = count.div_ceil(page_size).max(1);
        let Some(page) = requested.resolve(num_pages) else {
            return Ok(Err(invalid_page()));
        };
        let rows = db.list_published_blogs(&filter, page_size, (page - 1) * page_size)?;
        Ok(Ok((count, page, num_pages, render_blogs(db, rows)?)))
    })
    .await??;

    let body = BlogPage {
        count,
        next: (page < num_pages)
            .then(|| listing.page_url(page + 1))
            .transpose()?,
        previous: (page > 1).then(|| listing.page_url(page - 1)).transpose()?,
        results,
    };
    let bytes = Bytes::from(serde_json::to_vec(&body).map_err(anyhow::Error::from)?);
    state.cache.insert(key, bytes.clone()).await;

    Ok(json_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(pairs: &[(&str, &str)]) -> Result<Listing, ApiError> {
        let mut query = ListQuery::default();
        for (name, value) in pairs {
            let value = value.to_string();
            match *name {
                "author" => query.author = Some(value),
                "category" => query.category = Some(value),
                "tags" => query.tags.push(value),
                "search_title" => query.search_title = Some(value),
                "page" => query.page = Some(value),
                "page_size" => query.page_size = Some(value),
                other => panic!("unknown parameter {}", other),
            }
        }
        Listing::from_query(query)
    }

    #[test]
    fn page_size_is_clamped_and_defaulted() {
        assert_eq!(listing(&[]).unwrap().page_size, 10);
        assert_eq!(listing(&[("page_size", "25")]).unwrap().page_size, 25);
        assert_eq!(listing(&[("page_size", "500")]).unwrap().page_size, 50);
        assert_eq!(listing(&[("page_size", "0")]).unwrap().page_size, 10);
        assert_eq!(listing(&[("page_size", "many")]).unwrap().page_size, 10);
    }

    #[test]
    fn bad_page_numbers_are_rejected() {
        for bad in ["0", "-1", "two"] {
            assert!(matches!(
                listing(&[("page", bad)]),
                Err(ApiError::NotFound(ref detail)) if detail == "Invalid page."
            ));
        }
        assert_eq!(listing(&[("page", "last")]).unwrap().page, PageRequest::Last);
        assert_eq!(PageRequest::Number(3).resolve(2), None);
        assert_eq!(PageRequest::Last.resolve(4), Some(4));
    }

    #[test]
    fn tag_order_does_not_change_the_cache_key() {
        let a = listing(&[("tags", "bob"), ("tags", "alice"), ("tags", "bob")]).unwrap();
        let b = listing(&[("tags", "alice"), ("tags", "bob")]).unwrap();
        let c = listing(&[("tags", "alice")]).unwrap();

        assert_eq!(a.filter.tags, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn an_explicit_default_page_size_gets_its_own_cache_entry() {
        let bare = listing(&[]).unwrap();
        let explicit = listing(&[("page_size", "10")]).unwrap();

        assert_eq!(bare.page_size, explicit.page_size);
        assert_ne!(bare.cache_key(), explicit.cache_key());
        assert_eq!(bare.page_url(2).unwrap(), "/blogs/all?page=2");
        assert_eq!(explicit.page_url(2).unwrap(), "/blogs/all?page_size=10&page=2");
    }

    #[test]
    fn page_links_keep_the_filters() {
        let l = listing(&[("category", "Tech & Life"), ("tags", "bob"), ("page_size", "5")]).unwrap();
        assert_eq!(
            l.page_url(2).unwrap(),
            "/blogs/all?category=Tech+%26+Life&tags=bob&page_size=5&page=2"
        );
        assert_eq!(
            l.page_url(1).unwrap(),
            "/blogs/all?category=Tech+%26+Life&tags=bob&page_size=5"
        );
        assert_eq!(listing(&[]).unwrap().page_url(1).unwrap(), "/blogs/all");
    }

    #[test]
    fn empty_filters_are_ignored() {
        let l = listing(&[("author", ""), ("category", ""), ("tags", "")]).unwrap();
        assert!(l.filter.author.is_none());
        assert!(l.filter.category.is_none());
        assert!(l.filter.tags.is_empty());
    }
}
