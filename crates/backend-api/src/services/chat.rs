use std::collections::BTreeSet;

use flock_auth::{new_public_id, User};
use sqlx::{SqliteConnection, SqlitePool};

use super::tenancy::own_scope;
use super::{now, ServiceError};
use crate::routes::models::{
    ChatMessage, ChatThread, CreateThreadRequest, MessagesQuery, UserSummary,
};
use crate::util::clean_required;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;
const MAX_MESSAGE_LEN: usize = 4000;

#[derive(sqlx::FromRow)]
struct ThreadRow {
    id: i64,
    public_id: String,
    church_public_id: String,
    title: String,
    created_at: String,
    updated_at: String,
    unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    public_id: String,
    thread_public_id: String,
    sender_public_id: Option<String>,
    sender_name: Option<String>,
    sender_email: Option<String>,
    content: String,
    created_at: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        let sender = row.sender_public_id.map(|id| UserSummary {
            id,
            display_name: row.sender_name,
            email: row.sender_email,
        });
        ChatMessage {
            id: row.public_id,
            thread_id: row.thread_public_id,
            sender,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

const SELECT_THREAD: &str = r#"
    SELECT t.id, t.public_id, c.public_id AS church_public_id, t.title, t.created_at, t.updated_at,
           (SELECT COUNT(*) FROM chat_messages m
            WHERE m.thread_id = t.id
              AND (m.sender_user_id IS NULL OR m.sender_user_id != p.user_id)
              AND m.created_at > COALESCE(p.last_read_at, '')) AS unread_count
    FROM chat_threads t
    JOIN churches c ON c.id = t.church_id
    JOIN chat_participants p ON p.thread_id = t.id
"#;

const SELECT_MESSAGE: &str = r#"
    SELECT m.public_id, t.public_id AS thread_public_id, u.public_id AS sender_public_id,
           u.display_name AS sender_name, u.email AS sender_email, m.content, m.created_at
    FROM chat_messages m
    JOIN chat_threads t ON t.id = m.thread_id
    LEFT JOIN users u ON u.id = m.sender_user_id
"#;

/// Start a thread among users of the caller's own church. The caller is
/// always a participant.
pub async fn create_thread(
    pool: &SqlitePool,
    creator: &User,
    request: CreateThreadRequest,
) -> Result<ChatThread, ServiceError> {
    let scope = own_scope(pool, creator).await?;
    let title = clean_required(&request.title, "title")?;

    let mut tx = pool.begin().await?;
    let mut participants = BTreeSet::from([creator.id]);
    for public_id in request
        .participant_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
    {
        let user_id: i64 =
            sqlx::query_scalar("SELECT id FROM users WHERE public_id = ? AND church_id = ?")
                .bind(public_id)
                .bind(scope.church_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    ServiceError::bad_request(format!("User {public_id} is not in your church"))
                })?;
        participants.insert(user_id);
    }

    let now = now();
    let public_id = new_public_id();
    let thread_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO chat_threads (public_id, church_id, title, created_by_user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(&title)
    .bind(creator.id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    for user_id in &participants {
        sqlx::query(
            "INSERT INTO chat_participants (thread_id, user_id, joined_at, last_read_at) VALUES (?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(user_id)
        .bind(&now)
        .bind((*user_id == creator.id).then_some(&now))
        .execute(&mut *tx)
        .await?;
    }

    let thread = load_thread(&mut tx, &public_id, creator.id).await?;
    tx.commit().await?;

    tracing::info!(thread = %thread.id, participants = participants.len(), "chat thread created");
    Ok(thread)
}

/// Threads the user takes part in, most recently active first.
pub async fn list_my_threads(
    pool: &SqlitePool,
    user: &User,
) -> Result<Vec<ChatThread>, ServiceError> {
    let mut conn = pool.acquire().await?;
    let rows = sqlx::query_as::<_, ThreadRow>(&format!(
        "{SELECT_THREAD} WHERE p.user_id = ? ORDER BY t.updated_at DESC, t.id DESC"
    ))
    .bind(user.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut threads = Vec::with_capacity(rows.len());
    for row in rows {
        threads.push(hydrate(&mut conn, row).await?);
    }
    Ok(threads)
}

pub async fn get_thread(
    pool: &SqlitePool,
    user: &User,
    thread_public_id: &str,
) -> Result<ChatThread, ServiceError> {
    let mut conn = pool.acquire().await?;
    ensure_participant(&mut conn, user.id, thread_public_id).await?;
    load_thread(&mut conn, thread_public_id, user.id).await
}

/// Append a message. Posting also marks the thread read for the sender.
pub async fn post_message(
    pool: &SqlitePool,
    sender: &User,
    thread_public_id: &str,
    content: &str,
) -> Result<ChatMessage, ServiceError> {
    let content = clean_required(content, "content")?;
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(ServiceError::bad_request(format!(
            "content must be at most {MAX_MESSAGE_LEN} characters"
        )));
    }

    let mut tx = pool.begin().await?;
    let thread_id = ensure_participant(&mut tx, sender.id, thread_public_id).await?;
    let now = now();
    let public_id = new_public_id();

    sqlx::query(
        r#"
        INSERT INTO chat_messages (public_id, thread_id, sender_user_id, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(thread_id)
    .bind(sender.id)
    .bind(&content)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE chat_threads SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(thread_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE chat_participants SET last_read_at = ? WHERE thread_id = ? AND user_id = ?")
        .bind(&now)
        .bind(thread_id)
        .bind(sender.id)
        .execute(&mut *tx)
        .await?;

    let message = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE m.public_id = ?"))
        .bind(&public_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(message.into())
}

/// A page of messages in chronological order. `before` pages backwards from
/// a message id. The second value says whether older messages remain.
pub async fn list_messages(
    pool: &SqlitePool,
    user: &User,
    thread_public_id: &str,
    query: MessagesQuery,
) -> Result<(Vec<ChatMessage>, bool), ServiceError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

    let mut conn = pool.acquire().await?;
    let thread_id = ensure_participant(&mut conn, user.id, thread_public_id).await?;

    let before_id = match query.before.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(cursor) => Some(
            sqlx::query_scalar::<_, i64>(
                "SELECT id FROM chat_messages WHERE public_id = ? AND thread_id = ?",
            )
            .bind(cursor)
            .bind(thread_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ServiceError::bad_request("Unknown message cursor"))?,
        ),
        None => None,
    };

    let mut rows = sqlx::query_as::<_, MessageRow>(&format!(
        r#"{SELECT_MESSAGE}
        WHERE m.thread_id = ? AND (? IS NULL OR m.id < ?)
        ORDER BY m.id DESC
        LIMIT ?
        "#
    ))
    .bind(thread_id)
    .bind(before_id)
    .bind(before_id)
    .bind(limit + 1)
    .fetch_all(&mut *conn)
    .await?;

    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    rows.reverse();
    Ok((rows.into_iter().map(ChatMessage::from).collect(), has_more))
}

pub async fn mark_read(
    pool: &SqlitePool,
    user: &User,
    thread_public_id: &str,
) -> Result<(), ServiceError> {
    let mut conn = pool.acquire().await?;
    let thread_id = ensure_participant(&mut conn, user.id, thread_public_id).await?;

    sqlx::query("UPDATE chat_participants SET last_read_at = ? WHERE thread_id = ? AND user_id = ?")
        .bind(now())
        .bind(thread_id)
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Resolve a thread the user takes part in, returning its internal id.
pub async fn ensure_participant(
    conn: &mut SqliteConnection,
    user_id: i64,
    thread_public_id: &str,
) -> Result<i64, ServiceError> {
    let row: Option<(i64, bool)> = sqlx::query_as(
        r#"
        SELECT t.id,
               EXISTS (SELECT 1 FROM chat_participants p WHERE p.thread_id = t.id AND p.user_id = ?)
        FROM chat_threads t
        WHERE t.public_id = ?
        "#,
    )
    .bind(user_id)
    .bind(thread_public_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some((id, true)) => Ok(id),
        Some((_, false)) => Err(ServiceError::forbidden("You are not part of this conversation")),
        None => Err(ServiceError::not_found("Thread not found")),
    }
}

async fn load_thread(
    conn: &mut SqliteConnection,
    thread_public_id: &str,
    user_id: i64,
) -> Result<ChatThread, ServiceError> {
    let row = sqlx::query_as::<_, ThreadRow>(&format!(
        "{SELECT_THREAD} WHERE t.public_id = ? AND p.user_id = ?"
    ))
    .bind(thread_public_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Thread not found"))?;

    hydrate(conn, row).await
}

async fn hydrate(conn: &mut SqliteConnection, row: ThreadRow) -> Result<ChatThread, ServiceError> {
    let participants = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
        r#"
        SELECT u.public_id, u.display_name, u.email
        FROM chat_participants p
        JOIN users u ON u.id = p.user_id
        WHERE p.thread_id = ?
        ORDER BY p.joined_at, u.id
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(id, display_name, email)| UserSummary {
        id,
        display_name,
        email,
    })
    .collect();

    let last_message = sqlx::query_as::<_, MessageRow>(&format!(
        "{SELECT_MESSAGE} WHERE m.thread_id = ? ORDER BY m.id DESC LIMIT 1"
    ))
    .bind(row.id)
    .fetch_optional(&mut *conn)
    .await?
    .map(ChatMessage::from);

    Ok(ChatThread {
        id: row.public_id,
        church_id: row.church_public_id,
        title: row.title,
        participants,
        last_message,
        unread_count: row.unread_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
