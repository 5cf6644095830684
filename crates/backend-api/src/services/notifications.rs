use flock_auth::new_public_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::{now, ServiceError};
use crate::routes::models::{Notification, NotificationKind, NotificationsQuery};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// A notification that was just stored and still has to be pushed to its
/// recipient's realtime channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub user_id: i64,
    pub notification: Notification,
}

pub async fn create_notification(
    conn: &mut SqliteConnection,
    user_id: i64,
    kind: NotificationKind,
    title: &str,
    body: Option<&str>,
    link: Option<&str>,
) -> Result<Delivery, ServiceError> {
    let public_id = new_public_id();
    let created_at = now();

    sqlx::query(
        r#"
        INSERT INTO notifications (public_id, user_id, kind, title, body, link, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&public_id)
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(body)
    .bind(link)
    .bind(&created_at)
    .execute(&mut *conn)
    .await?;

    Ok(Delivery {
        user_id,
        notification: Notification {
            public_id,
            kind,
            title: title.to_string(),
            body: body.map(str::to_string),
            link: link.map(str::to_string),
            read: false,
            created_at,
        },
    })
}

pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: i64,
    query: NotificationsQuery,
) -> Result<Vec<Notification>, ServiceError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let unread_only = query.unread_only.unwrap_or(false);

    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT public_id, kind, title, body, link, read, created_at
        FROM notifications
        WHERE user_id = ? AND (? = 0 OR read = 0)
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(notifications)
}

pub async fn unread_count(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn mark_read(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
    read: bool,
) -> Result<Notification, ServiceError> {
    let result = sqlx::query("UPDATE notifications SET read = ? WHERE public_id = ? AND user_id = ?")
        .bind(read)
        .bind(public_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Notification not found"));
    }

    let notification = sqlx::query_as::<_, Notification>(
        "SELECT public_id, kind, title, body, link, read, created_at FROM notifications WHERE public_id = ?",
    )
    .bind(public_id)
    .fetch_one(pool)
    .await?;
    Ok(notification)
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64, ServiceError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_notification(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM notifications WHERE public_id = ? AND user_id = ?")
        .bind(public_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Notification not found"));
    }
    Ok(())
}
