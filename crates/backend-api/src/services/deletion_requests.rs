use flock_auth::{new_public_id, User};
use sqlx::{SqliteConnection, SqlitePool};

use super::members::member_id_by_public;
use super::notifications::{create_notification, Delivery};
use super::{now, ServiceError};
use crate::permissions::{can_request_member_deletion, can_review_deletions, ensure, TenantScope};
use crate::routes::models::{DeletionRequest, DeletionRequestStatus, NotificationKind};
use crate::util::clean_optional;

const SELECT_REQUEST: &str = r#"
    SELECT r.public_id, m.public_id AS member_public_id, r.member_name,
           u.public_id AS requested_by_public_id, u.display_name AS requested_by_name,
           r.reason, r.status, r.reviewed_at, r.created_at
    FROM member_deletion_requests r
    LEFT JOIN members m ON m.id = r.member_id
    JOIN users u ON u.id = r.requested_by_user_id
"#;

/// Outcome of reviewing a request.
#[derive(Debug)]
pub struct Review {
    pub request: DeletionRequest,
    /// Public id of the member removed by an approval.
    pub deleted_member_id: Option<String>,
    pub deliveries: Vec<Delivery>,
}

/// File a request to delete a member. Church admins are notified.
pub async fn create_request(
    pool: &SqlitePool,
    scope: &TenantScope,
    requester: &User,
    member_public_id: &str,
    reason: Option<String>,
) -> Result<(DeletionRequest, Vec<Delivery>), ServiceError> {
    ensure(
        can_request_member_deletion(scope),
        "You cannot request deletions in this church",
    )?;

    let mut tx = pool.begin().await?;
    let member_id = member_id_by_public(&mut tx, scope.church_id, member_public_id).await?;

    let pending: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM member_deletion_requests WHERE member_id = ? AND status = 'pending'",
    )
    .bind(member_id)
    .fetch_optional(&mut *tx)
    .await?;
    if pending.is_some() {
        return Err(ServiceError::conflict(
            "A deletion request for this member is already pending",
        ));
    }

    let member_name: String = sqlx::query_scalar(
        "SELECT trim(first_name || ' ' || COALESCE(last_name, '')) FROM members WHERE id = ?",
    )
    .bind(member_id)
    .fetch_one(&mut *tx)
    .await?;

    let public_id = new_public_id();
    sqlx::query(
        r#"
        INSERT INTO member_deletion_requests (
            public_id, church_id, member_id, member_name, requested_by_user_id, reason, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(member_id)
    .bind(&member_name)
    .bind(requester.id)
    .bind(clean_optional(reason))
    .bind(now())
    .execute(&mut *tx)
    .await?;

    let admins: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM users WHERE church_id = ? AND role = 'admin' AND id != ?",
    )
    .bind(scope.church_id)
    .bind(requester.id)
    .fetch_all(&mut *tx)
    .await?;

    let title = format!("Deletion requested for {member_name}");
    let mut deliveries = Vec::with_capacity(admins.len());
    for admin_id in admins {
        deliveries.push(
            create_notification(
                &mut tx,
                admin_id,
                NotificationKind::DeletionRequested,
                &title,
                None,
                Some(&public_id),
            )
            .await?,
        );
    }

    let request = load_request(&mut tx, scope.church_id, &public_id).await?;
    tx.commit().await?;

    tracing::info!(church_id = scope.church_id, request = %public_id, "member deletion requested");
    Ok((request, deliveries))
}

/// Admins see every request in the church; everyone else sees their own.
pub async fn list_requests(
    pool: &SqlitePool,
    scope: &TenantScope,
    user: &User,
) -> Result<Vec<DeletionRequest>, ServiceError> {
    let requester = if can_review_deletions(scope) {
        None
    } else {
        Some(user.id)
    };

    let requests = sqlx::query_as::<_, DeletionRequest>(&format!(
        r#"{SELECT_REQUEST}
        WHERE r.church_id = ? AND (? IS NULL OR r.requested_by_user_id = ?)
        ORDER BY r.status = 'pending' DESC, r.created_at DESC
        "#
    ))
    .bind(scope.church_id)
    .bind(requester)
    .bind(requester)
    .fetch_all(pool)
    .await?;

    Ok(requests)
}

/// Approve a pending request and delete the member in the same transaction.
pub async fn approve_request(
    pool: &SqlitePool,
    scope: &TenantScope,
    reviewer: &User,
    public_id: &str,
) -> Result<Review, ServiceError> {
    review(pool, scope, reviewer, public_id, DeletionRequestStatus::Approved).await
}

pub async fn reject_request(
    pool: &SqlitePool,
    scope: &TenantScope,
    reviewer: &User,
    public_id: &str,
) -> Result<Review, ServiceError> {
    review(pool, scope, reviewer, public_id, DeletionRequestStatus::Rejected).await
}

async fn review(
    pool: &SqlitePool,
    scope: &TenantScope,
    reviewer: &User,
    public_id: &str,
    outcome: DeletionRequestStatus,
) -> Result<Review, ServiceError> {
    ensure(can_review_deletions(scope), "Only admins can review deletion requests")?;

    let mut tx = pool.begin().await?;
    let (request_id, member_id, requested_by, status, member_name): (
        i64,
        Option<i64>,
        i64,
        DeletionRequestStatus,
        String,
    ) = sqlx::query_as(
        r#"
        SELECT id, member_id, requested_by_user_id, status, member_name
        FROM member_deletion_requests
        WHERE church_id = ? AND public_id = ?
        "#,
    )
    .bind(scope.church_id)
    .bind(public_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ServiceError::not_found("Deletion request not found"))?;

    if status != DeletionRequestStatus::Pending {
        return Err(ServiceError::conflict("Deletion request was already reviewed"));
    }

    sqlx::query(
        r#"
        UPDATE member_deletion_requests
        SET status = ?, reviewed_by_user_id = ?, reviewed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(outcome)
    .bind(reviewer.id)
    .bind(now())
    .bind(request_id)
    .execute(&mut *tx)
    .await?;

    let mut deleted_member_id = None;
    if outcome == DeletionRequestStatus::Approved {
        if let Some(member_id) = member_id {
            let member_public_id: String =
                sqlx::query_scalar("SELECT public_id FROM members WHERE id = ?")
                    .bind(member_id)
                    .fetch_one(&mut *tx)
                    .await?;
            sqlx::query("DELETE FROM members WHERE id = ?")
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
            deleted_member_id = Some(member_public_id);
        }
    }

    let verdict = match outcome {
        DeletionRequestStatus::Approved => "approved",
        _ => "rejected",
    };
    let mut deliveries = Vec::new();
    if requested_by != reviewer.id {
        deliveries.push(
            create_notification(
                &mut tx,
                requested_by,
                NotificationKind::DeletionReviewed,
                &format!("Deletion of {member_name} was {verdict}"),
                None,
                Some(public_id),
            )
            .await?,
        );
    }

    let request = load_request(&mut tx, scope.church_id, public_id).await?;
    tx.commit().await?;

    tracing::info!(church_id = scope.church_id, request = %public_id, verdict, "deletion request reviewed");
    Ok(Review {
        request,
        deleted_member_id,
        deliveries,
    })
}

async fn load_request(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<DeletionRequest, ServiceError> {
    sqlx::query_as::<_, DeletionRequest>(&format!(
        "{SELECT_REQUEST} WHERE r.church_id = ? AND r.public_id = ?"
    ))
    .bind(church_id)
    .bind(public_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Deletion request not found"))
}
