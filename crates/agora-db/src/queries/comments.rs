use agora_types::models::{
    Comment, CommentWithUser, Post, ReactionSummary, ReactionTarget, TargetKind, UserSummary,
};
use rusqlite::ffi;
use tracing::debug;

use super::check_content;
use super::likes::stored_vote;
use crate::error::constraint_violation;
use crate::{Database, ForumError, Result};

impl Database {
    // -- Posts --

    pub fn create_post(&self, user_id: i64, title: &str, content: &str, at: i64) -> Result<Post> {
        check_content("title", title, Post::MAX_TITLE_CHARS)?;
        check_content("content", content, Post::MAX_CHARS)?;

        self.with_conn(|conn| {
            let id = conn.query_row(
                "INSERT INTO posts (user_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                rusqlite::params![user_id, title, content, at],
                |row| row.get::<_, i64>(0),
            )?;
            debug!("User {} created post {}", user_id, id);
            Ok(Post {
                id,
                user_id,
                title: title.to_string(),
                content: content.to_string(),
                created_at: at,
            })
        })
    }

    pub fn post_exists(&self, post_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
                [post_id],
                |row| row.get::<_, bool>(0),
            )?;
            Ok(exists)
        })
    }

    // -- Comments --

    pub fn create_comment(&self, user_id: i64, post_id: i64, content: &str, at: i64) -> Result<Comment> {
        check_content("content", content, Comment::MAX_CHARS)?;

        self.with_conn(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO comments (user_id, post_id, content, created_at) VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                rusqlite::params![user_id, post_id, content, at],
                |row| row.get::<_, i64>(0),
            );

            let id = match inserted {
                Ok(id) => id,
                Err(e) if constraint_violation(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    return Err(ForumError::NotFound(format!("post {post_id}")));
                }
                Err(e) => return Err(e.into()),
            };

            debug!("User {} commented {} on post {}", user_id, id, post_id);
            Ok(Comment {
                id,
                user_id,
                post_id,
                content: content.to_string(),
                created_at: at,
            })
        })
    }

    /// Comments on a post, newest first, each composed with its reaction
    /// aggregate (from the viewer's perspective) and its author.
    pub fn list_comments(&self, post_id: i64, viewer_id: Option<i64>) -> Result<Vec<CommentWithUser>> {
        let label = TargetKind::Comment.label();

        self.with_conn(|conn| {
            // JOIN users and aggregate likes in one pass (no N+1)
            let mut stmt = conn.prepare(
                r#"SELECT c.id, c.user_id, c.post_id, c.content, c.created_at,
                      u.nickname, u.firstname, u.lastname, u.image, u.last_seen,
                      (SELECT COUNT(*) FROM likes l
                        WHERE l.like_type = ?3 AND l.c_id = c.id AND l."like" = 1),
                      (SELECT COUNT(*) FROM likes l
                        WHERE l.like_type = ?3 AND l.c_id = c.id AND l."like" = -1),
                      (SELECT l."like" FROM likes l
                        WHERE l.like_type = ?3 AND l.c_id = c.id AND l.user_id = ?2)
                   FROM comments c
                   JOIN users u ON u.id = c.user_id
                   WHERE c.post_id = ?1
                   ORDER BY c.created_at DESC, c.id DESC"#,
            )?;

            let rows = stmt
                .query_map(rusqlite::params![post_id, viewer_id, label], |row| {
                    let comment = Comment {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        post_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    };
                    let user = UserSummary {
                        id: comment.user_id,
                        nickname: row.get(5)?,
                        firstname: row.get(6)?,
                        lastname: row.get(7)?,
                        image: row.get(8)?,
                        last_seen: row.get(9)?,
                        last_message_at: None,
                        unread: 0,
                    };
                    let own: Option<i64> = row.get(12)?;
                    let reactions = ReactionSummary {
                        likes: row.get(10)?,
                        dislikes: row.get(11)?,
                        like: own.and_then(|v| stored_vote(v, ReactionTarget::Comment(comment.id))),
                    };
                    Ok(CommentWithUser { comment, reactions, user })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
