use rusqlite::Connection;
use tracing::info;

use crate::Result;

/// Applies the schema. Runs once at startup; a failure here is fatal.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            r#"
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid        TEXT UNIQUE,
                uuid_exp    INTEGER NOT NULL DEFAULT 0,
                nickname    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                firstname   TEXT NOT NULL,
                lastname    TEXT NOT NULL,
                age         INTEGER NOT NULL,
                gender      TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                last_seen   INTEGER NOT NULL DEFAULT 0,
                image       TEXT NOT NULL
            );

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                post_id     INTEGER NOT NULL REFERENCES posts(id),
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id   INTEGER NOT NULL REFERENCES users(id),
                receiver_id INTEGER NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                is_read     BOOLEAN NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender_id, receiver_id, created_at);

            CREATE TABLE likes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                p_id        INTEGER REFERENCES posts(id),
                c_id        INTEGER REFERENCES comments(id),
                "like"      INTEGER NOT NULL CHECK ("like" IN (1, -1)),
                like_type   TEXT NOT NULL,
                name_id     TEXT NOT NULL CHECK (name_id IN ('post_id', 'comment_id')),
                CHECK ((p_id IS NULL) <> (c_id IS NULL))
            );

            -- One vote per (user, target)
            CREATE UNIQUE INDEX idx_likes_user_post
                ON likes(user_id, p_id) WHERE p_id IS NOT NULL;
            CREATE UNIQUE INDEX idx_likes_user_comment
                ON likes(user_id, c_id) WHERE c_id IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (aggregate and timestamp indexes)");
        conn.execute_batch(
            r#"
            -- Per-target counts without walking the whole ledger
            CREATE INDEX idx_likes_post ON likes(p_id, "like") WHERE p_id IS NOT NULL;
            CREATE INDEX idx_likes_comment ON likes(c_id, "like") WHERE c_id IS NOT NULL;

            -- Newest timestamp lookup on every message insert
            CREATE INDEX idx_messages_created ON messages(created_at);

            INSERT INTO schema_version (version) VALUES (2);
            "#,
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
