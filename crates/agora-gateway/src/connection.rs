use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agora_auth::session::is_valid;
use agora_db::{ForumError, now_millis};
use agora_types::events::{ClientFrame, Envelope, Participants};
use agora_types::models::User;

use crate::dispatcher::Broadcast;
use crate::{GatewayContext, run_blocking};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket for a user whose session was checked at upgrade time.
/// `token` is that session; the connection ends once it is revoked, replaced
/// or expired.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext, user: User, token: String) {
    let (mut sender, receiver) = socket.split();
    let (conn_id, direct_rx) = ctx.dispatcher.register(user.id).await;

    info!("{} ({}) connected to gateway", user.nickname, user.id);

    // Initial contact list, then tell everyone the online set changed
    match roster(&ctx, user.id, false).await {
        Ok(envelope) => {
            if !send_envelope(&mut sender, &envelope).await {
                disconnect(&ctx, &user, conn_id).await;
                return;
            }
        }
        Err(e) => warn!("{} ({}) initial roster failed: {}", user.nickname, user.id, e),
    }
    ctx.dispatcher.notify_presence();

    run_connection_loop(sender, receiver, direct_rx, &ctx, &user, conn_id, token).await;

    disconnect(&ctx, &user, conn_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut direct_rx: tokio::sync::mpsc::UnboundedReceiver<Envelope>,
    ctx: &GatewayContext,
    user: &User,
    conn_id: Uuid,
    token: String,
) {
    let mut broadcast_rx = ctx.dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward broadcasts + targeted envelopes -> client, with heartbeat
    let send_ctx = ctx.clone();
    let viewer_id = user.id;
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(Broadcast::Envelope(envelope)) => envelope,
                        Ok(Broadcast::PresenceChanged) => match roster(&send_ctx, viewer_id, true).await {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                warn!("Presence refresh for {} failed: {}", viewer_id, e);
                                continue;
                            }
                        },
                        Err(RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !send_envelope(&mut sender, &envelope).await {
                        break;
                    }
                }
                result = direct_rx.recv() => {
                    let Some(envelope) = result else { break };
                    if !send_envelope(&mut sender, &envelope).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    match session_alive(&send_ctx, viewer_id, &token, now_millis()).await {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("Session of {} ended, closing connection", viewer_id);
                            let ended = Envelope::Error { data: "session ended".into() };
                            send_envelope(&mut sender, &ended).await;
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        Err(e) => warn!("Session check for {} failed: {}", viewer_id, e),
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from client
    let recv_ctx = ctx.clone();
    let recv_user = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => handle_frame(&recv_ctx, &recv_user, conn_id, frame).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad frame: {} -- raw: {}",
                            recv_user.nickname,
                            recv_user.id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        recv_ctx
                            .dispatcher
                            .send_to_connection(
                                recv_user.id,
                                conn_id,
                                Envelope::Error { data: "unrecognized frame".into() },
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn disconnect(ctx: &GatewayContext, user: &User, conn_id: Uuid) {
    let went_offline = ctx.dispatcher.unregister(user.id, conn_id).await;
    if went_offline {
        let db = ctx.db.clone();
        let user_id = user.id;
        if let Err(e) = run_blocking(move || db.touch_last_seen(user_id, now_millis())).await {
            warn!("Failed to record last_seen for {}: {}", user_id, e);
        }
        ctx.dispatcher.notify_presence();
    }
    info!("{} ({}) disconnected from gateway", user.nickname, user.id);
}

/// Apply one client frame. Failures are reported to the originating
/// connection only; they never touch other peers.
pub async fn handle_frame(ctx: &GatewayContext, user: &User, conn_id: Uuid, frame: ClientFrame) {
    // Evicted by logout or a newer login; the socket is on its way down
    if !ctx.dispatcher.is_connected(user.id, conn_id).await {
        debug!("Dropped frame from evicted connection of {}", user.id);
        return;
    }

    match frame {
        ClientFrame::Chat { message } => {
            let db = ctx.db.clone();
            let sender_id = user.id;
            let stored = run_blocking(move || {
                db.store_message(sender_id, message.receiver_id, &message.content)
            })
            .await;

            match stored {
                Ok(stored) => {
                    debug!("{} -> {} message {}", stored.sender_id, stored.receiver_id, stored.id);
                    let receiver_id = stored.receiver_id;
                    let envelope = Envelope::Chat { message: stored };
                    if receiver_id != sender_id {
                        ctx.dispatcher.send_to_user(receiver_id, envelope.clone()).await;
                    }
                    ctx.dispatcher.send_to_user(sender_id, envelope).await;
                }
                Err(e) => report(ctx, user, conn_id, "message was not sent", &e).await,
            }
        }

        ClientFrame::Typing { message, is_typing } => {
            ctx.dispatcher
                .send_to_user(
                    message.receiver_id,
                    Envelope::Typing {
                        message: Participants {
                            sender_id: user.id,
                            receiver_id: message.receiver_id,
                        },
                        is_typing,
                    },
                )
                .await;
        }

        ClientFrame::Read { message } => {
            // The client opened its conversation with `receiver_id`: everything
            // that peer sent to this user is now read.
            let peer_id = message.receiver_id;
            let reader_id = user.id;
            let db = ctx.db.clone();
            match run_blocking(move || db.mark_read(peer_id, reader_id)).await {
                Ok(updated) => {
                    debug!("{} read {} messages from {}", reader_id, updated, peer_id);
                    let envelope = Envelope::Read {
                        message: Participants { sender_id: peer_id, receiver_id: reader_id },
                    };
                    if peer_id != reader_id {
                        ctx.dispatcher.send_to_user(peer_id, envelope.clone()).await;
                    }
                    ctx.dispatcher.send_to_user(reader_id, envelope).await;
                }
                Err(e) => report(ctx, user, conn_id, "could not mark messages read", &e).await,
            }
        }

        ClientFrame::Roster {} => match roster(ctx, user.id, false).await {
            Ok(envelope) => {
                ctx.dispatcher.send_to_connection(user.id, conn_id, envelope).await;
            }
            Err(e) => report(ctx, user, conn_id, "could not load contacts", &e).await,
        },
    }
}

/// True while `token` is still the user's current, unexpired session.
pub async fn session_alive(
    ctx: &GatewayContext,
    user_id: i64,
    token: &str,
    now: i64,
) -> Result<bool, ForumError> {
    let db = ctx.db.clone();
    let token = token.to_string();
    let row = run_blocking(move || db.get_user_by_token(&token)).await?;
    Ok(row.is_some_and(|row| row.id == user_id && is_valid(row.uuid.as_deref(), row.uuid_exp, now)))
}

async fn report(ctx: &GatewayContext, user: &User, conn_id: Uuid, fallback: &str, e: &ForumError) {
    let reason = if e.is_internal() {
        error!("{} ({}) frame failed: {}", user.nickname, user.id, e);
        fallback.to_string()
    } else {
        warn!("{} ({}) frame rejected: {}", user.nickname, user.id, e);
        e.to_string()
    };
    ctx.dispatcher
        .send_to_connection(user.id, conn_id, Envelope::Error { data: reason })
        .await;
}

/// Contact list for `viewer_id` plus the ids currently online.
/// `pushed` selects the unsolicited presence variant.
async fn roster(ctx: &GatewayContext, viewer_id: i64, pushed: bool) -> Result<Envelope, ForumError> {
    let db = ctx.db.clone();
    let members = run_blocking(move || db.list_members(viewer_id)).await?;
    let data = ctx.dispatcher.online_user_ids().await;
    Ok(if pushed {
        Envelope::Presence { members, data }
    } else {
        Envelope::Roster { members, data }
    })
}

async fn send_envelope(sender: &mut SplitSink<WebSocket, Message>, envelope: &Envelope) -> bool {
    let text = match serde_json::to_string(envelope) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode {} envelope: {}", envelope.kind(), e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use agora_db::Database;
    use agora_types::events::{OutgoingMessage, PeerRef};
    use agora_types::models::NewUser;

    fn context() -> (GatewayContext, User, User) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let make = |nickname: &str| {
            db.create_user(&NewUser {
                nickname: nickname.into(),
                email: format!("{nickname}@example.com"),
                password: "digest".into(),
                firstname: "Test".into(),
                lastname: "User".into(),
                age: 30,
                gender: "male".into(),
                created_at: 0,
                image: "T.png".into(),
            })
            .unwrap()
        };
        let alice = make("alice");
        let bob = make("bob");
        (GatewayContext { db, dispatcher: Dispatcher::new() }, alice, bob)
    }

    #[tokio::test]
    async fn chat_is_stored_then_delivered_to_both_sides() {
        let (ctx, alice, bob) = context();
        let (alice_conn, mut alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut bob_rx) = ctx.dispatcher.register(bob.id).await;

        let frame = ClientFrame::Chat {
            message: OutgoingMessage { receiver_id: bob.id, content: "hi bob".into() },
        };
        handle_frame(&ctx, &alice, alice_conn, frame).await;

        let Some(Envelope::Chat { message }) = bob_rx.recv().await else {
            panic!("bob should receive the chat");
        };
        assert_eq!(message.content, "hi bob");
        assert_eq!(message.sender_id, alice.id);
        assert!(matches!(alice_rx.recv().await, Some(Envelope::Chat { .. })));

        let history = ctx.db.message_history(alice.id, bob.id, i64::MAX).unwrap();
        assert_eq!(history, vec![message]);
    }

    #[tokio::test]
    async fn rejected_chat_reports_to_sender_only() {
        let (ctx, alice, bob) = context();
        let (alice_conn, mut alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut bob_rx) = ctx.dispatcher.register(bob.id).await;

        let frame = ClientFrame::Chat {
            message: OutgoingMessage { receiver_id: bob.id, content: "   ".into() },
        };
        handle_frame(&ctx, &alice, alice_conn, frame).await;

        assert!(matches!(alice_rx.recv().await, Some(Envelope::Error { .. })));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_goes_to_receiver_with_sender_attached() {
        let (ctx, alice, bob) = context();
        let (alice_conn, _alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut bob_rx) = ctx.dispatcher.register(bob.id).await;

        let frame = ClientFrame::Typing { message: PeerRef { receiver_id: bob.id }, is_typing: true };
        handle_frame(&ctx, &alice, alice_conn, frame).await;

        assert_eq!(
            bob_rx.recv().await,
            Some(Envelope::Typing {
                message: Participants { sender_id: alice.id, receiver_id: bob.id },
                is_typing: true,
            })
        );
    }

    #[tokio::test]
    async fn read_marks_peer_messages_and_notifies() {
        let (ctx, alice, bob) = context();
        ctx.db.store_message(bob.id, alice.id, "ping").unwrap();
        ctx.db.store_message(alice.id, bob.id, "pong").unwrap();
        let (alice_conn, mut alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut bob_rx) = ctx.dispatcher.register(bob.id).await;

        let frame = ClientFrame::Read { message: PeerRef { receiver_id: bob.id } };
        handle_frame(&ctx, &alice, alice_conn, frame).await;

        let expected = Envelope::Read {
            message: Participants { sender_id: bob.id, receiver_id: alice.id },
        };
        assert_eq!(alice_rx.recv().await, Some(expected.clone()));
        assert_eq!(bob_rx.recv().await, Some(expected));

        let history = ctx.db.message_history(alice.id, bob.id, i64::MAX).unwrap();
        for m in history {
            assert_eq!(m.is_read, m.sender_id == bob.id);
        }
    }

    #[tokio::test]
    async fn roster_reply_goes_to_requesting_connection() {
        let (ctx, alice, bob) = context();
        let (alice_conn, mut alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut other_tab) = ctx.dispatcher.register(alice.id).await;

        handle_frame(&ctx, &alice, alice_conn, ClientFrame::Roster {}).await;

        let Some(Envelope::Roster { members, data }) = alice_rx.recv().await else {
            panic!("expected roster");
        };
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, bob.id);
        assert_eq!(data, vec![alice.id]);
        assert!(other_tab.try_recv().is_err());
    }

    #[tokio::test]
    async fn evicted_connection_can_no_longer_chat() {
        let (ctx, alice, bob) = context();
        ctx.db.set_session(alice.id, "alice-token", i64::MAX).unwrap();
        let (alice_conn, mut alice_rx) = ctx.dispatcher.register(alice.id).await;
        let (_, mut bob_rx) = ctx.dispatcher.register(bob.id).await;

        ctx.db.clear_session(alice.id).unwrap();
        ctx.dispatcher.disconnect_user(alice.id).await;

        let frame = ClientFrame::Chat {
            message: OutgoingMessage { receiver_id: bob.id, content: "still here?".into() },
        };
        handle_frame(&ctx, &alice, alice_conn, frame).await;

        assert_eq!(alice_rx.recv().await, None);
        assert!(bob_rx.try_recv().is_err());
        assert!(ctx.db.message_history(alice.id, bob.id, i64::MAX).unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_alive_tracks_revocation_replacement_and_expiry() {
        let (ctx, alice, bob) = context();
        ctx.db.set_session(alice.id, "first", 1_000).unwrap();

        assert!(session_alive(&ctx, alice.id, "first", 999).await.unwrap());
        assert!(!session_alive(&ctx, alice.id, "first", 1_000).await.unwrap());
        assert!(!session_alive(&ctx, bob.id, "first", 999).await.unwrap());

        ctx.db.set_session(alice.id, "second", 5_000).unwrap();
        assert!(!session_alive(&ctx, alice.id, "first", 999).await.unwrap());
        assert!(session_alive(&ctx, alice.id, "second", 999).await.unwrap());

        ctx.db.clear_session(alice.id).unwrap();
        assert!(!session_alive(&ctx, alice.id, "second", 999).await.unwrap());
    }
}
