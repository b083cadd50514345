use std::fmt;

use serde::{Deserialize, Serialize};

/// Public profile of a registered user. The password digest and session
/// columns never leave the db layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub gender: String,
    pub created_at: i64,
    pub last_seen: i64,
    pub image: String,
}

/// A user that passed the identity gate but has not been persisted yet.
/// `password` holds the digest, never the plaintext.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub gender: String,
    pub created_at: i64,
    pub image: String,
}

/// Contact-list entry as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub nickname: String,
    pub firstname: String,
    pub lastname: String,
    pub image: String,
    pub last_seen: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unread: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            nickname: user.nickname.clone(),
            firstname: user.firstname.clone(),
            lastname: user.lastname.clone(),
            image: user.image.clone(),
            last_seen: user.last_seen,
            last_message_at: None,
            unread: 0,
        }
    }
}

/// Opaque credential bound to one user. Expiry is milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub token: String,
    pub expires_at: i64,
}

/// Direct message between two users. `created_at` is epoch milliseconds,
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub created_at: i64,
    pub is_read: bool,
}

impl Message {
    pub const MAX_CHARS: usize = 2000;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
}

impl Post {
    pub const MAX_TITLE_CHARS: usize = 200;
    pub const MAX_CHARS: usize = 5000;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub content: String,
    pub created_at: i64,
}

impl Comment {
    pub const MAX_CHARS: usize = 2000;
}

/// A comment composed with its live reaction aggregate and its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentWithUser {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(flatten)]
    pub reactions: ReactionSummary,
    pub user: UserSummary,
}

// -- Reactions --

/// What a reaction attaches to. Serialized under the `name_id`
/// discriminator used on the wire and in the `likes` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "post_id")]
    Post,
    #[serde(rename = "comment_id")]
    Comment,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Post, TargetKind::Comment];

    pub fn from_discriminator(name_id: &str) -> Option<Self> {
        match name_id {
            "post_id" => Some(Self::Post),
            "comment_id" => Some(Self::Comment),
            _ => None,
        }
    }

    pub fn discriminator(self) -> &'static str {
        match self {
            Self::Post => "post_id",
            Self::Comment => "comment_id",
        }
    }

    /// Storage label: the discriminator without its `_id` suffix, pluralized.
    /// Both the write and the read path go through here.
    pub fn label(self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }

    /// Nullable foreign-key column in `likes` that holds the target id.
    pub fn column(self) -> &'static str {
        match self {
            Self::Post => "p_id",
            Self::Comment => "c_id",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name_id", content = "id")]
pub enum ReactionTarget {
    #[serde(rename = "post_id")]
    Post(i64),
    #[serde(rename = "comment_id")]
    Comment(i64),
}

impl ReactionTarget {
    pub fn new(kind: TargetKind, id: i64) -> Self {
        match kind {
            TargetKind::Post => Self::Post(id),
            TargetKind::Comment => Self::Comment(id),
        }
    }

    pub fn kind(self) -> TargetKind {
        match self {
            Self::Post(_) => TargetKind::Post,
            Self::Comment(_) => TargetKind::Comment,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Post(id) | Self::Comment(id) => id,
        }
    }
}

impl fmt::Display for ReactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.id())
    }
}

/// A single like (+1) or dislike (-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Vote {
    Like,
    Dislike,
}

impl Vote {
    pub fn value(self) -> i64 {
        match self {
            Self::Like => 1,
            Self::Dislike => -1,
        }
    }
}

impl TryFrom<i64> for Vote {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Like),
            -1 => Ok(Self::Dislike),
            other => Err(format!("vote must be 1 or -1, got {other}")),
        }
    }
}

impl From<Vote> for i64 {
    fn from(vote: Vote) -> Self {
        vote.value()
    }
}

/// Live aggregate over the ledger for one target. `like` is the
/// requesting user's own vote, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub likes: i64,
    pub dislikes: i64,
    pub like: Option<Vote>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_discriminator_without_id_suffix_pluralized() {
        for kind in TargetKind::ALL {
            let stem = kind.discriminator().strip_suffix("_id").unwrap();
            assert_eq!(kind.label(), format!("{stem}s"));
            assert_eq!(TargetKind::from_discriminator(kind.discriminator()), Some(kind));
        }
    }

    #[test]
    fn unknown_discriminator_rejected() {
        assert_eq!(TargetKind::from_discriminator("user_id"), None);
        assert_eq!(TargetKind::from_discriminator("posts"), None);
        assert_eq!(TargetKind::from_discriminator(""), None);
    }

    #[test]
    fn vote_accepts_only_unit_values() {
        assert_eq!(Vote::try_from(1), Ok(Vote::Like));
        assert_eq!(Vote::try_from(-1), Ok(Vote::Dislike));
        assert!(Vote::try_from(0).is_err());
        assert!(Vote::try_from(2).is_err());
        assert!(serde_json::from_str::<Vote>("5").is_err());
    }

    #[test]
    fn reaction_target_wire_shape() {
        let json = serde_json::to_value(ReactionTarget::Comment(5)).unwrap();
        assert_eq!(json, serde_json::json!({ "name_id": "comment_id", "id": 5 }));
    }

    #[test]
    fn comment_with_user_flattens_summary() {
        let author = User {
            id: 2,
            nickname: "bob".into(),
            email: "bob@example.com".into(),
            firstname: "Bob".into(),
            lastname: "Builder".into(),
            age: 30,
            gender: "male".into(),
            created_at: 0,
            last_seen: 0,
            image: "B.png".into(),
        };
        let composed = CommentWithUser {
            comment: Comment {
                id: 1,
                user_id: 2,
                post_id: 3,
                content: "hi".into(),
                created_at: 10,
            },
            reactions: ReactionSummary { likes: 4, dislikes: 1, like: Some(Vote::Dislike) },
            user: UserSummary::from(&author),
        };
        let json = serde_json::to_value(&composed).unwrap();
        assert_eq!(json["likes"], 4);
        assert_eq!(json["like"], -1);
        assert_eq!(json["post_id"], 3);
        assert_eq!(json["user"]["nickname"], "bob");
        assert!(json["user"].get("unread").is_none());
    }
}
