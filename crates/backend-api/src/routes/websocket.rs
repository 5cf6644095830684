use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use flock_auth::User;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use utoipa::IntoParams;

use crate::{
    services::{chat::ensure_participant, tenancy::resolve_scope, ServiceError},
    state::{AppState, Channel, ClientEvent, ServerEvent, Topic},
    ApiError,
};

const OUTBOUND_CAPACITY: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WebSocketQuery {
    /// Session token; browsers cannot set headers on websocket requests.
    pub token: Option<String>,
}

/// Upgrade after the `token` query parameter authenticates.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "WebSocket",
    params(WebSocketQuery),
    responses(
        (status = 101, description = "Switching to the realtime event stream"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    )
)]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing token"))?;
    let (user, _session) = state.authenticate(&token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, mut user: User) {
    let (mut ws_sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    tracing::error!(%error, "failed to encode websocket event");
                    continue;
                }
            };
            if let Err(error) = ws_sender.send(Message::Text(json)).await {
                tracing::debug!(%error, "websocket send failed");
                break;
            }
        }
    });

    // The user topic is read here rather than forwarded, so access changes can
    // prune church subscriptions before anything else is delivered.
    let mut personal = state.events().subscribe(Topic::User(user.id)).await;
    let mut subscriptions: HashMap<Channel, JoinHandle<()>> = HashMap::new();

    let _ = out_tx
        .send(ServerEvent::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
            user_id: user.public_id.clone(),
        })
        .await;
    tracing::info!(user = user.id, "websocket connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            handle_client_event(event, &out_tx, &state, &user, &mut subscriptions)
                                .await;
                        }
                        Err(error) => {
                            tracing::debug!(user = user.id, %error, "unparseable websocket event");
                            let _ = out_tx
                                .send(ServerEvent::Error {
                                    message: "Invalid event format".to_string(),
                                })
                                .await;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Err(error) => {
                        tracing::warn!(user = user.id, %error, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
            event = personal.recv() => match event {
                Ok(event) => {
                    let access_changed = matches!(event, ServerEvent::AccessChanged);
                    if access_changed {
                        recheck_church_subscriptions(&state, &mut user, &mut subscriptions, &out_tx)
                            .await;
                    }
                    if out_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // A dropped event may have been an access change.
                    tracing::warn!(user = user.id, skipped, "websocket user topic lagged");
                    recheck_church_subscriptions(&state, &mut user, &mut subscriptions, &out_tx)
                        .await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    drop(out_tx);
    let _ = sender_task.await;
    tracing::info!(user = user.id, "websocket disconnected");
}

/// Reload the user and drop church subscriptions their access no longer covers.
async fn recheck_church_subscriptions(
    state: &AppState,
    user: &mut User,
    subscriptions: &mut HashMap<Channel, JoinHandle<()>>,
    out_tx: &mpsc::Sender<ServerEvent>,
) {
    match state.authenticator().user_profile(user.id).await {
        Ok(fresh) => *user = fresh,
        Err(error) => {
            tracing::warn!(user = user.id, %error, "failed to reload user after access change");
            return;
        }
    }

    let churches: Vec<Channel> = subscriptions
        .keys()
        .filter(|channel| matches!(channel, Channel::Church(_)))
        .cloned()
        .collect();
    for channel in churches {
        if let Err(error) = authorize(state, user, &channel).await {
            if let Some(task) = subscriptions.remove(&channel) {
                task.abort();
            }
            tracing::info!(user = user.id, ?channel, %error, "church subscription dropped");
            let _ = out_tx.send(ServerEvent::Unsubscribed { channel }).await;
        }
    }
}

async fn handle_client_event(
    event: ClientEvent,
    out_tx: &mpsc::Sender<ServerEvent>,
    state: &AppState,
    user: &User,
    subscriptions: &mut HashMap<Channel, JoinHandle<()>>,
) {
    let reply = match event {
        ClientEvent::Ping => ServerEvent::Pong,
        ClientEvent::Subscribe { channel } => {
            match authorize(state, user, &channel).await {
                Ok(()) => {
                    if !subscriptions.contains_key(&channel) {
                        let receiver = state.events().subscribe(channel.clone().into()).await;
                        subscriptions.insert(channel.clone(), forward(receiver, out_tx.clone()));
                    }
                    ServerEvent::Subscribed { channel }
                }
                Err(error) => ServerEvent::Error {
                    message: ApiError::from(error).message,
                },
            }
        }
        ClientEvent::Unsubscribe { channel } => {
            if let Some(task) = subscriptions.remove(&channel) {
                task.abort();
            }
            ServerEvent::Unsubscribed { channel }
        }
    };

    let _ = out_tx.send(reply).await;
}

/// Church channels need read access to the church; thread channels need participation.
async fn authorize(state: &AppState, user: &User, channel: &Channel) -> Result<(), ServiceError> {
    match channel {
        Channel::Church(church_id) => {
            resolve_scope(state.db_pool(), user, church_id).await?;
        }
        Channel::Thread(thread_id) => {
            let mut conn = state.db_pool().acquire().await?;
            ensure_participant(&mut conn, user.id, thread_id).await?;
        }
    }
    Ok(())
}

fn forward(
    mut receiver: broadcast::Receiver<ServerEvent>,
    out_tx: mpsc::Sender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if out_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
