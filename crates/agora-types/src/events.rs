use serde::{Deserialize, Serialize};

use crate::models::{Message, ReactionTarget, UserSummary};

/// Frames pushed FROM server TO client over the live connection.
///
/// Tagged on `type`; fields a variant does not use are absent from the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A stored direct message, delivered to both participants
    Chat { message: Message },

    /// The sender started or stopped typing to the receiver
    Typing { message: Participants, is_typing: bool },

    /// Reply to a roster request: the viewer's contacts plus online ids
    Roster {
        members: Vec<UserSummary>,
        data: Vec<i64>,
    },

    /// Someone connected or disconnected; same shape as `Roster`
    Presence {
        members: Vec<UserSummary>,
        data: Vec<i64>,
    },

    /// `receiver_id` has read everything `sender_id` sent them
    Read { message: Participants },

    /// Fresh aggregate counts after a vote
    Reaction { data: ReactionCounts },

    /// A client frame could not be processed
    Error { data: String },
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Typing { .. } => "typing",
            Self::Roster { .. } => "roster",
            Self::Presence { .. } => "presence",
            Self::Read { .. } => "read",
            Self::Reaction { .. } => "reaction",
            Self::Error { .. } => "error",
        }
    }
}

/// Frames sent FROM client TO server. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a direct message
    Chat { message: OutgoingMessage },

    /// Typing indicator toward one peer
    Typing {
        message: PeerRef,
        #[serde(default)]
        is_typing: bool,
    },

    /// The client opened its conversation with `receiver_id`
    Read { message: PeerRef },

    /// Ask for the contact list
    Roster {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub sender_id: i64,
    pub receiver_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub receiver_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRef {
    pub receiver_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub target: ReactionTarget,
    pub likes: i64,
    pub dislikes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_envelope_omits_unused_fields() {
        let env = Envelope::Chat {
            message: Message {
                id: 7,
                sender_id: 1,
                receiver_id: 2,
                content: "hello".into(),
                created_at: 1_000,
                is_read: false,
            },
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["message"]["content"], "hello");
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("members"));
        assert!(!obj.contains_key("is_typing"));
        assert!(!obj.contains_key("data"));
    }

    #[test]
    fn typing_envelope_shape() {
        let env = Envelope::Typing {
            message: Participants { sender_id: 3, receiver_id: 4 },
            is_typing: true,
        };
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "type": "typing",
                "message": { "sender_id": 3, "receiver_id": 4 },
                "is_typing": true,
            })
        );
    }

    #[test]
    fn roster_carries_members_and_online_ids() {
        let env = Envelope::Roster {
            members: vec![UserSummary {
                id: 9,
                nickname: "carol".into(),
                firstname: "Carol".into(),
                lastname: "Danvers".into(),
                image: "C.png".into(),
                last_seen: 0,
                last_message_at: Some(55),
                unread: 2,
            }],
            data: vec![9],
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "roster");
        assert_eq!(value["members"][0]["unread"], 2);
        assert_eq!(value["data"], json!([9]));
    }

    #[test]
    fn reaction_envelope_shape() {
        let env = Envelope::Reaction {
            data: ReactionCounts { target: ReactionTarget::Post(3), likes: 2, dislikes: 0 },
        };
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "type": "reaction",
                "data": { "target": { "name_id": "post_id", "id": 3 }, "likes": 2, "dislikes": 0 },
            })
        );
    }

    #[test]
    fn client_frames_ignore_unknown_fields() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "chat",
            "message": { "receiver_id": 2, "content": "yo", "sender_id": 99 },
            "data": null,
            "client_version": "1.2",
        }))
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Chat {
                message: OutgoingMessage { receiver_id: 2, content: "yo".into() }
            }
        );

        let frame: ClientFrame =
            serde_json::from_value(json!({ "type": "roster", "members": [] })).unwrap();
        assert_eq!(frame, ClientFrame::Roster {});
    }

    #[test]
    fn typing_flag_defaults_to_false() {
        let frame: ClientFrame =
            serde_json::from_value(json!({ "type": "typing", "message": { "receiver_id": 5 } }))
                .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Typing { message: PeerRef { receiver_id: 5 }, is_typing: false }
        );
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(serde_json::from_value::<ClientFrame>(json!({ "type": "teleport" })).is_err());
    }
}
