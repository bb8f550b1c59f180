use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, TransactionBehavior, params, params_from_iter};

use super::{OptionalExt, placeholders};
use crate::models::{BlogChanges, BlogFilter, BlogRow, BlogTagRow, NewBlog};
use crate::{Database, timestamp_now};

const BLOG_COLUMNS: &str = "b.id, b.title, b.publication_date, b.author_id, b.content, b.category, \
     b.is_published, b.upvote_count, b.downvote_count";

impl Database {
    // -- Blogs --

    /// Inserts the blog and its tag links in one transaction. A blog created
    /// as published gets its publication date stamped immediately.
    pub fn create_blog(&self, blog: &NewBlog) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let publication_date = blog.is_published.then(timestamp_now);
            tx.execute(
                "INSERT INTO blogs (title, publication_date, author_id, content, category, is_published)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    blog.title,
                    publication_date,
                    blog.author_id,
                    blog.content,
                    blog.category,
                    blog.is_published
                ],
            )?;
            let id = tx.last_insert_rowid();
            replace_tags(&tx, id, &blog.tag_ids)?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_blog(&self, id: i64) -> Result<Option<BlogRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM blogs b WHERE b.id = ?1", BLOG_COLUMNS);
            conn.query_row(&sql, [id], map_blog).optional()
        })
    }

    /// Applies the given changes. Publishing for the first time stamps the
    /// publication date; unpublishing keeps it.
    pub fn update_blog(&self, id: i64, changes: &BlogChanges) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            for (column, value) in [
                ("title", &changes.title),
                ("content", &changes.content),
                ("category", &changes.category),
            ] {
                if let Some(value) = value {
                    values.push(Value::Text(value.clone()));
                    sets.push(format!("{} = ?{}", column, values.len()));
                }
            }
            if let Some(is_published) = changes.is_published {
                values.push(Value::Integer(is_published as i64));
                sets.push(format!("is_published = ?{}", values.len()));
                if is_published {
                    values.push(Value::Text(timestamp_now()));
                    sets.push(format!(
                        "publication_date = COALESCE(publication_date, ?{})",
                        values.len()
                    ));
                }
            }

            if !sets.is_empty() {
                values.push(Value::Integer(id));
                let sql = format!(
                    "UPDATE blogs SET {} WHERE id = ?{}",
                    sets.join(", "),
                    values.len()
                );
                tx.execute(&sql, params_from_iter(values.iter()))?;
            }

            if let Some(tag_ids) = &changes.tag_ids {
                replace_tags(&tx, id, tag_ids)?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Deletes the blog; comments, votes and tag links go with it through
    /// the schema's cascades. Returns false if it did not exist.
    pub fn delete_blog(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM blogs WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn blogs_by_author(&self, author_id: i64, drafts_only: bool) -> Result<Vec<BlogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM blogs b WHERE b.author_id = ?1 {} ORDER BY b.id ASC",
                BLOG_COLUMNS,
                if drafts_only { "AND b.is_published = 0" } else { "" }
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], map_blog)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_published_blogs(&self, filter: &BlogFilter) -> Result<u64> {
        let (where_sql, values) = published_where(filter);
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM blogs b {}", where_sql);
            let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// One page of published blogs matching `filter`, id ascending.
    pub fn list_published_blogs(
        &self,
        filter: &BlogFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<BlogRow>> {
        let (where_sql, mut values) = published_where(filter);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));
        let sql = format!(
            "SELECT {} FROM blogs b {} ORDER BY b.id ASC LIMIT ?{} OFFSET ?{}",
            BLOG_COLUMNS,
            where_sql,
            values.len() - 1,
            values.len()
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), map_blog)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch tag usernames for a set of blog IDs.
    pub fn get_tags_for_blogs(&self, blog_ids: &[i64]) -> Result<Vec<BlogTagRow>> {
        if blog_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT bt.blog_id, u.username FROM blog_tags bt
                 JOIN users u ON u.id = bt.user_id
                 WHERE bt.blog_id IN ({})
                 ORDER BY bt.blog_id, u.username",
                placeholders(blog_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(blog_ids.iter()), |row| {
                    Ok(BlogTagRow {
                        blog_id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn replace_tags(conn: &Connection, blog_id: i64, tag_ids: &[i64]) -> Result<()> {
    conn.execute("DELETE FROM blog_tags WHERE blog_id = ?1", [blog_id])?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO blog_tags (blog_id, user_id) VALUES (?1, ?2)")?;
    for tag_id in tag_ids {
        stmt.execute([blog_id, *tag_id])?;
    }
    Ok(())
}

/// WHERE clause plus bound values for the published listing.
fn published_where(filter: &BlogFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["b.is_published = 1".to_string()];
    let mut values: Vec<Value> = Vec::new();

    if let Some(author) = &filter.author {
        values.push(Value::Text(author.clone()));
        clauses.push(format!(
            "b.author_id IN (SELECT id FROM users WHERE username = ?{})",
            values.len()
        ));
    }
    if let Some(category) = &filter.category {
        values.push(Value::Text(category.to_lowercase()));
        clauses.push(format!("instr(casefold(b.category), ?{}) > 0", values.len()));
    }
    if !filter.tags.is_empty() {
        let first = values.len() + 1;
        let slots: Vec<String> = (first..first + filter.tags.len())
            .map(|i| format!("?{}", i))
            .collect();
        values.extend(filter.tags.iter().cloned().map(Value::Text));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM blog_tags bt JOIN users tu ON tu.id = bt.user_id
                     WHERE bt.blog_id = b.id AND tu.username IN ({}))",
            slots.join(", ")
        ));
    }
    if let Some(title) = &filter.search_title {
        values.push(Value::Text(title.to_lowercase()));
        clauses.push(format!("instr(casefold(b.title), ?{}) > 0", values.len()));
    }

    (format!("WHERE {}", clauses.join(" AND ")), values)
}

fn map_blog(row: &Row) -> rusqlite::Result<BlogRow> {
    Ok(BlogRow {
        id: row.get(0)?,
        title: row.get(1)?,
        publication_date: row.get(2)?,
        author_id: row.get(3)?,
        content: row.get(4)?,
        category: row.get(5)?,
        is_published: row.get(6)?,
        upvote_count: row.get(7)?,
        downvote_count: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    fn ids(rows: &[BlogRow]) -> Vec<i64> {
        rows.iter().map(|b| b.id).collect()
    }

    #[test]
    fn drafts_are_left_out_of_the_listing() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let draft = fixtures::blog(&db, alice, "Draft", "Tech", false);
        let live = fixtures::blog(&db, alice, "Live", "Tech", true);

        let filter = BlogFilter::default();
        assert_eq!(db.count_published_blogs(&filter).unwrap(), 1);
        assert_eq!(ids(&db.list_published_blogs(&filter, 10, 0).unwrap()), vec![live]);

        db.update_blog(
            draft,
            &BlogChanges {
                is_published: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ids(&db.list_published_blogs(&filter, 10, 0).unwrap()), vec![draft, live]);
    }

    #[test]
    fn category_filter_is_case_insensitive_substring() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let tech = fixtures::blog(&db, alice, "A", "Technology", true);
        let fintech = fixtures::blog(&db, alice, "B", "fintech", true);
        fixtures::blog(&db, alice, "C", "Cooking", true);
        fixtures::blog(&db, alice, "D", "Tech", false);

        let filter = BlogFilter {
            category: Some("Tech".into()),
            ..Default::default()
        };
        assert_eq!(ids(&db.list_published_blogs(&filter, 10, 0).unwrap()), vec![tech, fintech]);
    }

    #[test]
    fn text_filters_fold_non_ascii_case() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let umlaut = fixtures::blog(&db, alice, "Über uns", "Ärger", true);
        fixtures::blog(&db, alice, "Other", "Arger", true);

        let by_category = BlogFilter {
            category: Some("ärger".into()),
            ..Default::default()
        };
        let by_title = BlogFilter {
            search_title: Some("ÜBER".into()),
            ..Default::default()
        };
        assert_eq!(ids(&db.list_published_blogs(&by_category, 10, 0).unwrap()), vec![umlaut]);
        assert_eq!(db.count_published_blogs(&by_title).unwrap(), 1);

        // Wildcard characters are matched literally
        let wildcard = BlogFilter {
            search_title: Some("%".into()),
            ..Default::default()
        };
        assert_eq!(db.count_published_blogs(&wildcard).unwrap(), 0);
    }

    #[test]
    fn author_tag_and_title_filters_combine() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let carol = fixtures::user(&db, "carol");

        let tagged = db
            .create_blog(&NewBlog {
                author_id: alice,
                title: "Rust tips".into(),
                content: "..".into(),
                category: "Tech".into(),
                is_published: true,
                tag_ids: vec![bob, carol],
            })
            .unwrap();
        fixtures::blog(&db, alice, "Rust news", "Tech", true);
        fixtures::blog(&db, bob, "Rust tips too", "Tech", true);

        let by_tag = BlogFilter {
            tags: vec!["carol".into(), "nobody".into()],
            ..Default::default()
        };
        // A blog matching several tags is still listed once
        let by_both_tags = BlogFilter {
            tags: vec!["bob".into(), "carol".into()],
            ..Default::default()
        };
        let by_author_and_title = BlogFilter {
            author: Some("alice".into()),
            search_title: Some("TIPS".into()),
            ..Default::default()
        };

        assert_eq!(ids(&db.list_published_blogs(&by_tag, 10, 0).unwrap()), vec![tagged]);
        assert_eq!(db.count_published_blogs(&by_both_tags).unwrap(), 1);
        assert_eq!(
            ids(&db.list_published_blogs(&by_author_and_title, 10, 0).unwrap()),
            vec![tagged]
        );
    }

    #[test]
    fn listing_pages_by_id() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let all: Vec<i64> = (0..5)
            .map(|i| fixtures::blog(&db, alice, &format!("post {}", i), "Tech", true))
            .collect();

        let filter = BlogFilter::default();
        assert_eq!(ids(&db.list_published_blogs(&filter, 2, 0).unwrap()), all[0..2].to_vec());
        assert_eq!(ids(&db.list_published_blogs(&filter, 2, 4).unwrap()), all[4..].to_vec());
    }

    #[test]
    fn publication_date_is_stamped_once() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let id = fixtures::blog(&db, alice, "Draft", "Tech", false);
        assert!(db.get_blog(id).unwrap().unwrap().publication_date.is_none());

        let publish = |flag| BlogChanges {
            is_published: Some(flag),
            ..Default::default()
        };
        db.update_blog(id, &publish(true)).unwrap();
        let first = db.get_blog(id).unwrap().unwrap().publication_date;
        assert!(first.is_some());

        db.update_blog(id, &publish(false)).unwrap();
        db.update_blog(id, &publish(true)).unwrap();
        assert_eq!(db.get_blog(id).unwrap().unwrap().publication_date, first);
    }

    #[test]
    fn updating_tags_replaces_the_set() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let carol = fixtures::user(&db, "carol");
        let id = fixtures::blog(&db, alice, "Post", "Tech", true);

        db.update_blog(
            id,
            &BlogChanges {
                tag_ids: Some(vec![bob, carol]),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_blog(
            id,
            &BlogChanges {
                tag_ids: Some(vec![carol]),
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let tags: Vec<String> = db
            .get_tags_for_blogs(&[id])
            .unwrap()
            .into_iter()
            .map(|t| t.username)
            .collect();
        assert_eq!(tags, vec!["carol".to_string()]);
        assert_eq!(db.get_blog(id).unwrap().unwrap().title, "Renamed");
    }

    #[test]
    fn drafts_by_author() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let draft = fixtures::blog(&db, alice, "Draft", "Tech", false);
        let live = fixtures::blog(&db, alice, "Live", "Tech", true);
        fixtures::blog(&db, bob, "Other", "Tech", false);

        assert_eq!(ids(&db.blogs_by_author(alice, false).unwrap()), vec![draft, live]);
        assert_eq!(ids(&db.blogs_by_author(alice, true).unwrap()), vec![draft]);
    }
}
