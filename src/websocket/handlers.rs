use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::{
        presence::{PresenceRecord, HEARTBEAT_INTERVAL},
        sessions::UserSession,
        websocket::{IncomingMessage, WebSocketMessage},
    },
    queries::{chats, messages, presence, users},
    store::ConnectionId,
};

use super::manager::SubscriptionSet;

const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    let user_session = session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Cannot find user session")))?;

    let user_id = match user_session {
        Some(user_data) => user_data.user_id,
        None => {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "User session not found"
            )));
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, state, user_id)))
}

async fn handle_websocket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WebSocketMessage>();

    // Outgoing pump: everything the connection is told goes through here.
    let outgoing_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let conn_id = ConnectionId::new_v4();

    // Mark online now, and arm the offline write that fires if this
    // connection dies without saying goodbye.
    if let Err(e) = presence::set_presence(state.tree.as_ref(), user_id, true).await {
        tracing::warn!("initial presence write failed for {}: {}", user_id, e);
    }
    let _ = presence::arm_disconnect_write(state.tree.as_ref(), conn_id, user_id).await;

    let mut subs = SubscriptionSet::new();

    // Heartbeat keeps last_seen inside the staleness window and re-arms the
    // disconnect write so its timestamp stays fresh too.
    {
        let tree = state.tree.clone();
        subs.replace(
            "heartbeat",
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = presence::set_presence(tree.as_ref(), user_id, true).await {
                        tracing::warn!("heartbeat write failed for {}: {}", user_id, e);
                    }
                    let _ = presence::arm_disconnect_write(tree.as_ref(), conn_id, user_id).await;
                }
            }),
        );
    }

    // Chat-list listener: any change under `chats` re-derives this user's
    // list (every membership mutation touches the chat record in the same
    // batch, so the index never changes without this firing).
    {
        let tree = state.tree.clone();
        let list_tx = tx.clone();
        subs.replace(
            "chat_list",
            tokio::spawn(async move {
                let mut sub = tree.subscribe("chats").await;
                while sub.next().await.is_some() {
                    match chats::list_user_chats(tree.as_ref(), user_id).await {
                        Ok(list) => {
                            if list_tx
                                .send(WebSocketMessage::ChatList { chats: list })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("chat list refresh failed for {}: {}", user_id, e)
                        }
                    }
                }
            }),
        );
    }

    // Join this user's chat rooms and announce them.
    match chats::list_user_chats(state.tree.as_ref(), user_id).await {
        Ok(user_chat_list) => {
            let display_name = match users::get_user(state.documents.as_ref(), user_id).await {
                Ok(Some(user)) => user.display_name,
                _ => user_id.to_string(),
            };
            for chat in &user_chat_list {
                state
                    .websocket_manager
                    .join_chat(&chat.id, user_id, tx.clone());
                let join_message = WebSocketMessage::UserJoined {
                    chat_id: chat.id.clone(),
                    user_id,
                    username: display_name.clone(),
                };
                state
                    .websocket_manager
                    .broadcast_to_chat(&chat.id, join_message, Some(user_id))
                    .await;
            }
        }
        Err(e) => {
            tracing::error!("failed to load chats for user {}: {}", user_id, e);
        }
    }

    // Incoming frames
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) =
                    handle_text_message(&state, user_id, &tx, &mut subs, text.to_string()).await
                {
                    tracing::warn!("error handling frame from user {}: {}", user_id, e);
                    let _ = tx.send(WebSocketMessage::Error {
                        message: e.to_string(),
                    });
                }
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                tracing::warn!("error receiving from user {}: {}", user_id, e);
                break;
            }
            _ => {}
        }
    }

    // Teardown runs on every exit path: listeners and timers die with the
    // subscription set, rooms are vacated, presence flips offline.
    drop(subs);
    state.websocket_manager.leave_all_chats(user_id);
    match presence::set_presence(state.tree.as_ref(), user_id, false).await {
        Ok(()) => state.tree.cancel_on_disconnect(conn_id).await,
        // Couldn't say goodbye; let the armed write do it.
        Err(_) => state.tree.connection_lost(conn_id).await,
    }
    outgoing_task.abort();

    tracing::debug!("websocket handler finished for user {}", user_id);
}

async fn handle_text_message(
    state: &AppState,
    user_id: Uuid,
    tx: &tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
    subs: &mut SubscriptionSet,
    text: String,
) -> AppResult<()> {
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid JSON")))?;

    let message_type = parsed["type"].as_str().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Missing or invalid 'type' field in message"
        ))
    })?;

    match message_type {
        "send_message" => {
            let incoming: IncomingMessage = serde_json::from_value(parsed)
                .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid message format")))?;
            handle_send_message(state, user_id, tx, incoming).await?;
        }
        "typing" => {
            handle_typing_indicator(state, user_id, parsed).await?;
        }
        "mark_read" => {
            handle_mark_read(state, user_id, parsed).await?;
        }
        "subscribe_chat" => {
            let chat_id = string_field(&parsed, "chat_id")?;
            handle_subscribe_chat(state, user_id, tx, subs, chat_id).await?;
        }
        "unsubscribe_chat" => {
            subs.cancel("active_chat");
        }
        "subscribe_presence" => {
            handle_subscribe_presence(state, tx, subs, parsed)?;
        }
        "search_users" => {
            let query = string_field(&parsed, "query")?;
            let documents = state.documents.clone();
            let results_tx = tx.clone();
            // Debounce: each keystroke replaces the pending search.
            subs.replace(
                "search_debounce",
                tokio::spawn(async move {
                    tokio::time::sleep(SEARCH_DEBOUNCE).await;
                    match users::search_users(documents.as_ref(), &query, user_id).await {
                        Ok(results) => {
                            let _ = results_tx.send(WebSocketMessage::SearchResults { results });
                        }
                        Err(e) => tracing::warn!("live search failed: {}", e),
                    }
                }),
            );
        }
        "ping" => {
            let _ = tx.send(WebSocketMessage::Pong);
        }
        _ => {
            let _ = tx.send(WebSocketMessage::Error {
                message: format!("Unknown message type: {}", message_type),
            });
        }
    }

    Ok(())
}

fn string_field(parsed: &serde_json::Value, field: &str) -> AppResult<String> {
    Ok(parsed[field]
        .as_str()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing {}", field)))?
        .to_string())
}

async fn handle_send_message(
    state: &AppState,
    user_id: Uuid,
    tx: &tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
    incoming: IncomingMessage,
) -> AppResult<()> {
    let sender = users::require_user(state.documents.as_ref(), user_id).await?;
    let message = messages::send_message(
        state.tree.as_ref(),
        &incoming.chat_id,
        &sender,
        &incoming.content,
        incoming.message_type,
    )
    .await?;

    // A chat created after this connection opened has no room entry yet.
    if !state
        .websocket_manager
        .is_user_in_chat(&incoming.chat_id, user_id)
    {
        state
            .websocket_manager
            .join_chat(&incoming.chat_id, user_id, tx.clone());
    }

    let ws_message = WebSocketMessage::Message { message };
    state
        .websocket_manager
        .broadcast_to_chat(&incoming.chat_id, ws_message, None)
        .await;

    Ok(())
}

async fn handle_typing_indicator(
    state: &AppState,
    user_id: Uuid,
    parsed: serde_json::Value,
) -> AppResult<()> {
    let chat_id = string_field(&parsed, "chat_id")?;
    let is_typing = parsed["is_typing"]
        .as_bool()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing is_typing")))?;

    let typing_message = WebSocketMessage::Typing {
        chat_id: chat_id.clone(),
        user_id,
        is_typing,
    };
    state
        .websocket_manager
        .broadcast_to_chat(&chat_id, typing_message, Some(user_id))
        .await;

    Ok(())
}

async fn handle_mark_read(
    state: &AppState,
    user_id: Uuid,
    parsed: serde_json::Value,
) -> AppResult<()> {
    let chat_id = string_field(&parsed, "chat_id")?;
    let message_id = string_field(&parsed, "message_id")?;

    messages::mark_message_read(state.tree.as_ref(), &chat_id, &message_id, user_id).await?;

    let read_message = WebSocketMessage::MessageRead {
        chat_id: chat_id.clone(),
        message_id,
        user_id,
    };
    state
        .websocket_manager
        .broadcast_to_chat(&chat_id, read_message, Some(user_id))
        .await;

    Ok(())
}

/// Stream ordered message-list snapshots for the active chat. Selecting a
/// different chat replaces the slot, which aborts this listener first.
async fn handle_subscribe_chat(
    state: &AppState,
    user_id: Uuid,
    tx: &tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
    subs: &mut SubscriptionSet,
    chat_id: String,
) -> AppResult<()> {
    let chat = chats::require_chat(state.tree.as_ref(), &chat_id).await?;
    if !chat.is_participant(user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Not a member of this chat"
        )));
    }

    let tree = state.tree.clone();
    let messages_tx = tx.clone();
    subs.replace(
        "active_chat",
        tokio::spawn(async move {
            let mut sub = tree
                .subscribe(&crate::queries::message_log_path(&chat_id))
                .await;
            while let Some(snapshot) = sub.next().await {
                let ordered = messages::collect_messages(snapshot);
                if messages_tx
                    .send(WebSocketMessage::Messages {
                        chat_id: chat_id.clone(),
                        messages: ordered,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }),
    );
    Ok(())
}

/// Watch a set of users' presence records and push effective statuses on
/// every change under `presence`.
fn handle_subscribe_presence(
    state: &AppState,
    tx: &tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
    subs: &mut SubscriptionSet,
    parsed: serde_json::Value,
) -> AppResult<()> {
    let watched: Vec<Uuid> = parsed["user_ids"]
        .as_array()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing user_ids")))?
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect();
    if watched.is_empty() {
        subs.cancel("presence");
        return Ok(());
    }

    let tree = state.tree.clone();
    let presence_tx = tx.clone();
    subs.replace(
        "presence",
        tokio::spawn(async move {
            let mut sub = tree.subscribe("presence").await;
            while let Some(snapshot) = sub.next().await {
                let now = chrono::Utc::now();
                for &watched_id in &watched {
                    let record = snapshot
                        .as_ref()
                        .and_then(|root| root.get(watched_id.to_string()))
                        .and_then(|value| {
                            serde_json::from_value::<PresenceRecord>(value.clone()).ok()
                        });
                    let status = match record {
                        Some(record) => record.status_at(now),
                        None => crate::models::presence::PresenceStatus {
                            is_online: false,
                            last_seen_label: "Offline".to_string(),
                        },
                    };
                    if presence_tx
                        .send(WebSocketMessage::Presence {
                            user_id: watched_id,
                            is_online: status.is_online,
                            last_seen_label: status.last_seen_label,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }),
    );
    Ok(())
}
