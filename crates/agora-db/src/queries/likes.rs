use agora_types::models::{ReactionSummary, ReactionTarget, TargetKind, Vote};
use rusqlite::ffi;
use tracing::{debug, warn};

use crate::error::constraint_violation;
use crate::{Database, ForumError, Result};

/// Validates caller-supplied reaction input: the discriminator must name a
/// post or a comment and the vote must be +1 or -1.
pub fn parse_reaction(name_id: &str, target_id: i64, like: i64) -> Result<(ReactionTarget, Vote)> {
    let kind = parse_target_kind(name_id)?;
    let vote = Vote::try_from(like).map_err(ForumError::InvalidReaction)?;
    Ok((ReactionTarget::new(kind, target_id), vote))
}

pub fn parse_target_kind(name_id: &str) -> Result<TargetKind> {
    TargetKind::from_discriminator(name_id).ok_or_else(|| {
        ForumError::InvalidReaction(format!("name_id must be post_id or comment_id, got {name_id:?}"))
    })
}

impl Database {
    /// Records `vote` as the user's only vote on `target`. A repeat vote
    /// replaces the earlier one in the same statement.
    pub fn cast_vote(&self, user_id: i64, target: ReactionTarget, vote: Vote) -> Result<()> {
        let kind = target.kind();
        let column = kind.column();
        let sql = format!(
            r#"INSERT INTO likes (user_id, {column}, "like", like_type, name_id)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT (user_id, {column}) WHERE {column} IS NOT NULL
               DO UPDATE SET "like" = excluded."like""#
        );

        self.with_conn(|conn| {
            let result = conn.execute(
                &sql,
                rusqlite::params![user_id, target.id(), vote.value(), kind.label(), kind.discriminator()],
            );
            match result {
                Ok(_) => {
                    debug!("User {} voted {} on {}", user_id, vote.value(), target);
                    Ok(())
                }
                Err(e) if constraint_violation(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    Err(ForumError::NotFound(target.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Live like/dislike counts for `target`, plus the requesting user's own
    /// vote when one is given.
    pub fn reaction_summary(
        &self,
        target: ReactionTarget,
        requesting_user: Option<i64>,
    ) -> Result<ReactionSummary> {
        let kind = target.kind();
        let column = kind.column();
        let sql = format!(
            r#"SELECT
                 COUNT(CASE WHEN "like" = 1 THEN 1 END),
                 COUNT(CASE WHEN "like" = -1 THEN 1 END),
                 (SELECT "like" FROM likes WHERE like_type = ?1 AND {column} = ?2 AND user_id = ?3)
               FROM likes
               WHERE like_type = ?1 AND {column} = ?2"#
        );

        self.with_conn(|conn| {
            let (likes, dislikes, own) = conn.query_row(
                &sql,
                rusqlite::params![kind.label(), target.id(), requesting_user],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )?;

            Ok(ReactionSummary {
                likes,
                dislikes,
                like: own.and_then(|v| stored_vote(v, target)),
            })
        })
    }
}

pub(crate) fn stored_vote(value: i64, target: ReactionTarget) -> Option<Vote> {
    Vote::try_from(value)
        .inspect_err(|e| warn!("Corrupt vote on {}: {}", target, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::seed_user;

    fn setup() -> (Database, i64, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let post = db.create_post(alice, "Hello", "First post", 1).unwrap();
        let comment = db.create_comment(bob, post.id, "Nice", 2).unwrap();
        (db, alice, post.id, comment.id)
    }

    #[test]
    fn parse_accepts_only_known_kinds_and_unit_votes() {
        assert_eq!(
            parse_reaction("comment_id", 5, -1).unwrap(),
            (ReactionTarget::Comment(5), Vote::Dislike)
        );
        assert_eq!(parse_reaction("post_id", 1, 1).unwrap(), (ReactionTarget::Post(1), Vote::Like));
        assert!(matches!(parse_reaction("user_id", 1, 1), Err(ForumError::InvalidReaction(_))));
        assert!(matches!(parse_reaction("post_id", 1, 0), Err(ForumError::InvalidReaction(_))));
        assert!(matches!(parse_reaction("post_id", 1, 2), Err(ForumError::InvalidReaction(_))));
    }

    #[test]
    fn revote_replaces_instead_of_duplicating() {
        let (db, alice, _, comment) = setup();
        let target = ReactionTarget::Comment(comment);

        db.cast_vote(alice, target, Vote::Like).unwrap();
        db.cast_vote(alice, target, Vote::Dislike).unwrap();

        let summary = db.reaction_summary(target, Some(alice)).unwrap();
        assert_eq!(
            summary,
            ReactionSummary { likes: 0, dislikes: 1, like: Some(Vote::Dislike) }
        );
    }

    #[test]
    fn votes_from_different_users_are_independent() {
        let (db, alice, post, _) = setup();
        let bob = db.get_user_by_identifier("bob").unwrap().unwrap().id;
        let target = ReactionTarget::Post(post);

        db.cast_vote(alice, target, Vote::Like).unwrap();
        db.cast_vote(bob, target, Vote::Like).unwrap();

        let summary = db.reaction_summary(target, Some(bob)).unwrap();
        assert_eq!(summary.likes, 2);
        assert_eq!(summary.dislikes, 0);
        assert_eq!(summary.like, Some(Vote::Like));
    }

    #[test]
    fn post_and_comment_with_same_id_do_not_mix() {
        let (db, alice, post, comment) = setup();
        assert_eq!(post, comment);

        db.cast_vote(alice, ReactionTarget::Post(post), Vote::Like).unwrap();
        db.cast_vote(alice, ReactionTarget::Comment(comment), Vote::Dislike).unwrap();

        let on_post = db.reaction_summary(ReactionTarget::Post(post), Some(alice)).unwrap();
        let on_comment = db.reaction_summary(ReactionTarget::Comment(comment), Some(alice)).unwrap();
        assert_eq!((on_post.likes, on_post.dislikes), (1, 0));
        assert_eq!((on_comment.likes, on_comment.dislikes), (0, 1));
    }

    #[test]
    fn summary_without_votes_or_viewer() {
        let (db, _, post, _) = setup();
        let summary = db.reaction_summary(ReactionTarget::Post(post), None).unwrap();
        assert_eq!(summary, ReactionSummary::default());
    }

    #[test]
    fn vote_on_missing_target_is_not_found() {
        let (db, alice, _, _) = setup();
        let result = db.cast_vote(alice, ReactionTarget::Comment(404), Vote::Like);
        assert!(matches!(result, Err(ForumError::NotFound(_))));
    }

    #[test]
    fn concurrent_revotes_leave_one_row() {
        let (db, alice, _, comment) = setup();
        let db = std::sync::Arc::new(db);
        let target = ReactionTarget::Comment(comment);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                let vote = if i % 2 == 0 { Vote::Like } else { Vote::Dislike };
                std::thread::spawn(move || db.cast_vote(alice, target, vote))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let summary = db.reaction_summary(target, Some(alice)).unwrap();
        assert_eq!(summary.likes + summary.dislikes, 1);
        let expected = if summary.likes == 1 { Vote::Like } else { Vote::Dislike };
        assert_eq!(summary.like, Some(expected));
    }
}
