use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration, time::Instant};

use flock_auth::{AuthSession, Authenticator, User};
use flock_config::InviteConfig;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};

use crate::routes::models::{
    AdminInvite, AttendanceStatus, AttendanceSubject, ChatMessage, HeadCount, Notification,
};
use crate::services::notifications::Delivery;
use crate::ApiError;

const DEFAULT_OAUTH_STATE_TTL: StdDuration = StdDuration::from_secs(600);
const CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    authenticator: Authenticator,
    oauth_state: OAuthStateStore,
    invites: InviteConfig,
    events: EventHub,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, authenticator: Authenticator, invites: InviteConfig) -> Self {
        Self::with_oauth_store(db_pool, authenticator, invites, OAuthStateStore::default())
    }

    pub fn with_oauth_store(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        invites: InviteConfig,
        oauth_state: OAuthStateStore,
    ) -> Self {
        Self {
            db_pool,
            authenticator,
            oauth_state,
            invites,
            events: EventHub::default(),
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn oauth_state(&self) -> &OAuthStateStore {
        &self.oauth_state
    }

    pub fn invites(&self) -> &InviteConfig {
        &self.invites
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }
}

/// A channel a websocket client can ask to follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Channel {
    Church(String),
    Thread(String),
}

/// Broadcast key. User topics are joined automatically on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Church(String),
    Thread(String),
    User(i64),
}

impl From<Channel> for Topic {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Church(id) => Topic::Church(id),
            Channel::Thread(id) => Topic::Thread(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        version: String,
        user_id: String,
    },
    Subscribed {
        channel: Channel,
    },
    Unsubscribed {
        channel: Channel,
    },
    Pong,
    Error {
        message: String,
    },
    MemberChanged {
        church_id: String,
        member_id: String,
        action: ChangeAction,
    },
    MembersImported {
        church_id: String,
        created: usize,
    },
    BacentaChanged {
        church_id: String,
        bacenta_id: String,
        action: ChangeAction,
    },
    AttendanceChanged {
        church_id: String,
        date: String,
        subject: AttendanceSubject,
        subject_id: String,
        /// `None` once a mark is cleared.
        status: Option<AttendanceStatus>,
    },
    HeadCountChanged {
        church_id: String,
        head_count: HeadCount,
    },
    ChatMessage {
        thread_id: String,
        message: ChatMessage,
    },
    InviteUpdated {
        invite: AdminInvite,
    },
    Notification {
        notification: Notification,
    },
    /// The user's church, role or viewable churches changed; clients refetch.
    AccessChanged,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Subscribe { channel: Channel },
    Unsubscribe { channel: Channel },
    Ping,
}

/// Broadcast senders keyed by topic, created on first subscribe.
#[derive(Clone, Default)]
pub struct EventHub {
    senders: Arc<Mutex<HashMap<Topic, broadcast::Sender<ServerEvent>>>>,
}

impl EventHub {
    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ServerEvent> {
        let mut senders = self.senders.lock().await;
        senders
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send to everyone following `topic`. Topics nobody listens to are dropped.
    pub async fn publish(&self, topic: Topic, event: ServerEvent) {
        let mut senders = self.senders.lock().await;
        senders.retain(|_, sender| sender.receiver_count() > 0);
        if let Some(sender) = senders.get(&topic) {
            let _ = sender.send(event);
        }
    }

    pub async fn to_church(&self, church_public_id: &str, event: ServerEvent) {
        self.publish(Topic::Church(church_public_id.to_string()), event)
            .await;
    }

    pub async fn to_user(&self, user_id: i64, event: ServerEvent) {
        self.publish(Topic::User(user_id), event).await;
    }

    pub async fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.to_user(
                delivery.user_id,
                ServerEvent::Notification {
                    notification: delivery.notification,
                },
            )
            .await;
        }
    }

    pub async fn topic_count(&self) -> usize {
        self.senders.lock().await.len()
    }
}

#[derive(Clone)]
pub struct OAuthStateStore {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: StdDuration,
}

impl OAuthStateStore {
    pub fn new(ttl: StdDuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn issue(&self) -> String {
        let state = Self::random_state();
        self.store(state.clone()).await;
        state
    }

    pub async fn store(&self, state: String) {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.ttl);
        guard.insert(state, Instant::now());
    }

    pub async fn consume(&self, state: &str) -> bool {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.ttl);
        guard.remove(state).is_some()
    }

    fn random_state() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    fn prune(map: &mut HashMap<String, Instant>, ttl: StdDuration) {
        let now = Instant::now();
        map.retain(|_, created| now.duration_since(*created) <= ttl);
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_OAUTH_STATE_TTL)
    }
}
