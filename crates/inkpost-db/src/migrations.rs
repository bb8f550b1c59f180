use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                bio             TEXT,
                phone_number    TEXT,
                profile_picture TEXT,
                is_superuser    INTEGER NOT NULL DEFAULT 0,
                date_joined     TEXT NOT NULL
            );

            -- Kept for schema parity; blog tags reference users instead.
            CREATE TABLE tags (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL
            );

            CREATE TABLE blogs (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                title               TEXT NOT NULL,
                publication_date    TEXT,
                author_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content             TEXT NOT NULL,
                category            TEXT NOT NULL,
                is_published        INTEGER NOT NULL DEFAULT 0,
                upvote_count        INTEGER NOT NULL DEFAULT 0 CHECK (upvote_count >= 0),
                downvote_count      INTEGER NOT NULL DEFAULT 0 CHECK (downvote_count >= 0)
            );

            CREATE INDEX idx_blogs_author ON blogs(author_id);

            CREATE TABLE blog_tags (
                blog_id     INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (blog_id, user_id)
            );

            CREATE TABLE blog_votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blog_id     INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                vote_type   TEXT NOT NULL CHECK (vote_type IN ('upvote', 'downvote')),
                UNIQUE(user_id, blog_id)
            );

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                blog_id     INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                parent_id   INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                upvotes     INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
                downvotes   INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0)
            );

            CREATE INDEX idx_comments_blog ON comments(blog_id, created_at);
            CREATE INDEX idx_comments_parent ON comments(parent_id);

            CREATE TABLE comment_votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                comment_id  INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                vote_type   TEXT NOT NULL CHECK (vote_type IN ('upvote', 'downvote')),
                UNIQUE(user_id, comment_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
