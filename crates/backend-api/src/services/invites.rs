//! Admin invites and the role and access transitions they drive.
//!
//! An invite moves `pending -> accepted | rejected | revoked | expired`, and an
//! accepted invite can later move to `revoked` when the inviter removes the
//! access it granted. Every transition runs in one transaction together with
//! the user, access-link and notification writes it implies.
//!
//! Accepting takes one of two branches:
//!
//! * **access link**: the invitee already owns a church with data in it. Their
//!   role is left alone, and the inviter gets read-only access to the
//!   invitee's church.
//! * **role change**: otherwise the invitee joins the inviter's church as a
//!   leader. Their previous church and role are kept so that removing access
//!   can put them back.

use chrono::{Duration, Utc};
use flock_auth::{new_public_id, User, UserRole};
use flock_config::InviteConfig;
use sqlx::{SqliteConnection, SqlitePool};

use super::notifications::{create_notification, Delivery};
use super::tenancy::own_scope;
use super::users::user_id_by_public;
use super::{now, timestamp, ServiceError};
use crate::permissions::{can_invite, ensure};
use crate::routes::models::{AccessKind, AdminInvite, InviteStatus, NotificationKind, UserSummary};

pub const MIN_TTL_HOURS: u32 = 1;
pub const MAX_TTL_HOURS: u32 = 720;

/// Result of an invite transition.
#[derive(Debug)]
pub struct InviteOutcome {
    pub invite: AdminInvite,
    pub deliveries: Vec<Delivery>,
    /// Users whose own church or viewable churches changed.
    pub access_changed: Vec<i64>,
    /// Inviter and invitee user ids.
    pub parties: [i64; 2],
}

#[derive(sqlx::FromRow)]
struct InviteRow {
    id: i64,
    church_id: i64,
    inviter_user_id: i64,
    invitee_user_id: i64,
    status: InviteStatus,
    access_kind: Option<AccessKind>,
    access_link_id: Option<i64>,
    expires_at: String,
}

#[derive(sqlx::FromRow)]
struct InviteView {
    public_id: String,
    church_public_id: String,
    church_name: String,
    inviter_public_id: String,
    inviter_name: Option<String>,
    inviter_email: Option<String>,
    invitee_public_id: String,
    invitee_name: Option<String>,
    invitee_email: Option<String>,
    status: InviteStatus,
    access_kind: Option<AccessKind>,
    created_at: String,
    expires_at: String,
    responded_at: Option<String>,
}

impl From<InviteView> for AdminInvite {
    fn from(view: InviteView) -> Self {
        AdminInvite {
            id: view.public_id,
            church_id: view.church_public_id,
            church_name: view.church_name,
            inviter: UserSummary {
                id: view.inviter_public_id,
                display_name: view.inviter_name,
                email: view.inviter_email,
            },
            invitee: UserSummary {
                id: view.invitee_public_id,
                display_name: view.invitee_name,
                email: view.invitee_email,
            },
            status: view.status,
            access_kind: view.access_kind,
            created_at: view.created_at,
            expires_at: view.expires_at,
            responded_at: view.responded_at,
        }
    }
}

const SELECT_INVITE_VIEW: &str = r#"
    SELECT i.public_id, c.public_id AS church_public_id, c.name AS church_name,
           inviter.public_id AS inviter_public_id, inviter.display_name AS inviter_name,
           inviter.email AS inviter_email,
           invitee.public_id AS invitee_public_id, invitee.display_name AS invitee_name,
           invitee.email AS invitee_email,
           i.status, i.access_kind, i.created_at, i.expires_at, i.responded_at
    FROM admin_invites i
    JOIN churches c ON c.id = i.church_id
    JOIN users inviter ON inviter.id = i.inviter_user_id
    JOIN users invitee ON invitee.id = i.invitee_user_id
"#;

/// Pick the invite lifetime: the request override when given, else the configured default.
pub fn resolve_ttl_hours(
    requested: Option<u32>,
    config: &InviteConfig,
) -> Result<u32, ServiceError> {
    match requested {
        Some(hours) if (MIN_TTL_HOURS..=MAX_TTL_HOURS).contains(&hours) => Ok(hours),
        Some(_) => Err(ServiceError::bad_request(format!(
            "expires_in_hours must be between {MIN_TTL_HOURS} and {MAX_TTL_HOURS}"
        ))),
        None => Ok(config.default_ttl_hours.max(MIN_TTL_HOURS)),
    }
}

pub async fn send_invite_to_user(
    pool: &SqlitePool,
    config: &InviteConfig,
    inviter: &User,
    invitee_public_id: &str,
    expires_in_hours: Option<u32>,
) -> Result<InviteOutcome, ServiceError> {
    let scope = own_scope(pool, inviter).await?;
    ensure(can_invite(&scope), "Only church admins can send invites")?;
    let ttl_hours = resolve_ttl_hours(expires_in_hours, config)?;

    let mut tx = pool.begin().await?;
    let now = now();
    expire_pending(&mut tx, &now).await?;

    let invitee_id = user_id_by_public(&mut tx, invitee_public_id).await?;
    if invitee_id == inviter.id {
        return Err(ServiceError::bad_request("You cannot invite yourself"));
    }

    let (invitee_church, invitee_email): (Option<i64>, Option<String>) =
        sqlx::query_as("SELECT church_id, email FROM users WHERE id = ?")
            .bind(invitee_id)
            .fetch_one(&mut *tx)
            .await?;
    if invitee_church == Some(scope.church_id) {
        return Err(ServiceError::conflict("This user already belongs to your church"));
    }

    let pending: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM admin_invites
        WHERE inviter_user_id = ? AND invitee_user_id = ? AND status = 'pending'
        "#,
    )
    .bind(inviter.id)
    .bind(invitee_id)
    .fetch_optional(&mut *tx)
    .await?;
    if pending.is_some() {
        return Err(ServiceError::conflict("An invite to this user is already pending"));
    }

    let expires_at = timestamp(Utc::now() + Duration::hours(i64::from(ttl_hours)));
    let public_id = new_public_id();
    let invite_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO admin_invites (
            public_id, church_id, inviter_user_id, invitee_user_id, invitee_email,
            status, created_at, expires_at
        )
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
        RETURNING id
        "#,
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(inviter.id)
    .bind(invitee_id)
    .bind(invitee_email)
    .bind(&now)
    .bind(&expires_at)
    .fetch_one(&mut *tx)
    .await?;

    let invite = load_invite(&mut tx, invite_id).await?;
    let title = format!(
        "{} invited you to help lead {}",
        display(&invite.inviter),
        invite.church_name
    );
    let delivery = create_notification(
        &mut tx,
        invitee_id,
        NotificationKind::InviteReceived,
        &title,
        Some("Open your invites to accept or decline."),
        Some(&invite.id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(invite = %invite.id, inviter = inviter.id, invitee = invitee_id, ttl_hours, "admin invite sent");
    Ok(InviteOutcome {
        invite,
        deliveries: vec![delivery],
        access_changed: Vec::new(),
        parties: [inviter.id, invitee_id],
    })
}

/// Invites addressed to `user`, pending first.
pub async fn list_incoming(pool: &SqlitePool, user: &User) -> Result<Vec<AdminInvite>, ServiceError> {
    expire_stale_invites(pool).await?;
    list_where(pool, "i.invitee_user_id = ?", user.id).await
}

/// Invites sent by `user`, pending first.
pub async fn list_outgoing(pool: &SqlitePool, user: &User) -> Result<Vec<AdminInvite>, ServiceError> {
    expire_stale_invites(pool).await?;
    list_where(pool, "i.inviter_user_id = ?", user.id).await
}

pub async fn accept_admin_invite(
    pool: &SqlitePool,
    invitee: &User,
    invite_public_id: &str,
) -> Result<InviteOutcome, ServiceError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, invite_public_id).await?;

    if row.invitee_user_id != invitee.id {
        return Err(ServiceError::forbidden("This invite is not addressed to you"));
    }
    ensure_pending(&row)?;

    let now = now();
    if row.expires_at <= now {
        mark_status(&mut tx, row.id, InviteStatus::Expired, None).await?;
        tx.commit().await?;
        return Err(ServiceError::gone("This invite has expired"));
    }

    let (current_church, current_role, placed_by_invite): (Option<i64>, UserRole, bool) =
        sqlx::query_as(
            "SELECT church_id, role, previous_role IS NOT NULL FROM users WHERE id = ?",
        )
        .bind(invitee.id)
        .fetch_one(&mut *tx)
        .await?;
    if current_church == Some(row.church_id) {
        return Err(ServiceError::conflict("You already belong to this church"));
    }

    let owns_data = match current_church {
        Some(church_id) => church_has_owned_data(&mut tx, church_id, invitee.id).await?,
        None => false,
    };

    let access_changed = match (owns_data, current_church) {
        (true, Some(invitee_church)) => {
            let link_id =
                grant_access_link(&mut tx, row.inviter_user_id, invitee_church, row.id, &now)
                    .await?;
            sqlx::query(
                r#"
                UPDATE admin_invites
                SET status = 'accepted', access_kind = 'access_link', access_link_id = ?, responded_at = ?
                WHERE id = ?
                "#,
            )
            .bind(link_id)
            .bind(&now)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
            vec![row.inviter_user_id]
        }
        // A second role change would overwrite the church to restore on removal.
        _ if placed_by_invite => {
            return Err(ServiceError::conflict(
                "You already joined a church through an invite; have that access removed first",
            ));
        }
        _ => {
            sqlx::query(
                r#"
                UPDATE users
                SET previous_church_id = ?, previous_role = ?, church_id = ?, role = 'leader',
                    invited_by_user_id = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(current_church)
            .bind(current_role)
            .bind(row.church_id)
            .bind(row.inviter_user_id)
            .bind(&now)
            .bind(invitee.id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                UPDATE admin_invites
                SET status = 'accepted', access_kind = 'role_change', responded_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&now)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
            vec![invitee.id]
        }
    };

    let invite = load_invite(&mut tx, row.id).await?;
    let body = match invite.access_kind {
        Some(AccessKind::AccessLink) => "You can now view their church.",
        _ => "They joined your church as a leader.",
    };
    let delivery = create_notification(
        &mut tx,
        row.inviter_user_id,
        NotificationKind::InviteAccepted,
        &format!("{} accepted your invite", display(&invite.invitee)),
        Some(body),
        Some(&invite.id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(invite = %invite.id, access_kind = ?invite.access_kind, "admin invite accepted");
    Ok(InviteOutcome {
        invite,
        deliveries: vec![delivery],
        access_changed,
        parties: [row.inviter_user_id, row.invitee_user_id],
    })
}

pub async fn reject_admin_invite(
    pool: &SqlitePool,
    invitee: &User,
    invite_public_id: &str,
) -> Result<InviteOutcome, ServiceError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, invite_public_id).await?;

    if row.invitee_user_id != invitee.id {
        return Err(ServiceError::forbidden("This invite is not addressed to you"));
    }
    ensure_pending(&row)?;

    let now = now();
    if row.expires_at <= now {
        mark_status(&mut tx, row.id, InviteStatus::Expired, None).await?;
        tx.commit().await?;
        return Err(ServiceError::gone("This invite has expired"));
    }

    mark_status(&mut tx, row.id, InviteStatus::Rejected, Some(&now)).await?;
    let invite = load_invite(&mut tx, row.id).await?;
    let delivery = create_notification(
        &mut tx,
        row.inviter_user_id,
        NotificationKind::InviteRejected,
        &format!("{} declined your invite", display(&invite.invitee)),
        None,
        Some(&invite.id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(invite = %invite.id, "admin invite rejected");
    Ok(InviteOutcome {
        invite,
        deliveries: vec![delivery],
        access_changed: Vec::new(),
        parties: [row.inviter_user_id, row.invitee_user_id],
    })
}

/// The inviter withdraws a pending invite.
pub async fn cancel_invite(
    pool: &SqlitePool,
    inviter: &User,
    invite_public_id: &str,
) -> Result<InviteOutcome, ServiceError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, invite_public_id).await?;

    if row.inviter_user_id != inviter.id {
        return Err(ServiceError::forbidden("Only the inviter can cancel this invite"));
    }
    ensure_pending(&row)?;

    mark_status(&mut tx, row.id, InviteStatus::Revoked, Some(&now())).await?;
    let invite = load_invite(&mut tx, row.id).await?;
    let delivery = create_notification(
        &mut tx,
        row.invitee_user_id,
        NotificationKind::InviteCancelled,
        &format!("{} withdrew their invite", display(&invite.inviter)),
        None,
        Some(&invite.id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(invite = %invite.id, "admin invite cancelled");
    Ok(InviteOutcome {
        invite,
        deliveries: vec![delivery],
        access_changed: Vec::new(),
        parties: [row.inviter_user_id, row.invitee_user_id],
    })
}

/// Undo what an accepted invite granted.
///
/// A link is revoked. A role change puts the invitee back in their previous
/// church with their previous role, unless they have since moved elsewhere.
pub async fn remove_leader_access(
    pool: &SqlitePool,
    admin: &User,
    invite_public_id: &str,
) -> Result<InviteOutcome, ServiceError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, invite_public_id).await?;

    if row.inviter_user_id != admin.id {
        return Err(ServiceError::forbidden("Only the inviter can remove this access"));
    }
    if row.status != InviteStatus::Accepted {
        return Err(ServiceError::conflict(format!(
            "Only accepted invites can be revoked (invite is {})",
            row.status.as_str()
        )));
    }

    let now = now();
    let access_changed = match row.access_kind {
        Some(AccessKind::AccessLink) => {
            if let Some(link_id) = row.access_link_id {
                sqlx::query(
                    "UPDATE access_links SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
                )
                .bind(&now)
                .bind(link_id)
                .execute(&mut *tx)
                .await?;
            }
            vec![row.inviter_user_id]
        }
        _ => {
            restore_previous_membership(&mut tx, row.invitee_user_id, row.church_id, &now).await?;
            vec![row.invitee_user_id]
        }
    };

    sqlx::query("UPDATE admin_invites SET status = 'revoked' WHERE id = ?")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

    let invite = load_invite(&mut tx, row.id).await?;
    let delivery = create_notification(
        &mut tx,
        row.invitee_user_id,
        NotificationKind::AccessRemoved,
        &format!("{} removed the access from your invite", display(&invite.inviter)),
        None,
        Some(&invite.id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(invite = %invite.id, access_kind = ?invite.access_kind, "invite access removed");
    Ok(InviteOutcome {
        invite,
        deliveries: vec![delivery],
        access_changed,
        parties: [row.inviter_user_id, row.invitee_user_id],
    })
}

/// Mark every pending invite past its expiry as expired. Returns how many changed.
pub async fn expire_stale_invites(pool: &SqlitePool) -> Result<u64, ServiceError> {
    let mut conn = pool.acquire().await?;
    let expired = expire_pending(&mut conn, &now()).await?;
    if expired > 0 {
        tracing::info!(expired, "expired stale admin invites");
    }
    Ok(expired)
}

async fn expire_pending(conn: &mut SqliteConnection, now: &str) -> Result<u64, ServiceError> {
    let result = sqlx::query(
        "UPDATE admin_invites SET status = 'expired' WHERE status = 'pending' AND expires_at <= ?",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn restore_previous_membership(
    conn: &mut SqliteConnection,
    invitee_id: i64,
    granted_church: i64,
    now: &str,
) -> Result<(), ServiceError> {
    let (church_id, previous_church, previous_role): (Option<i64>, Option<i64>, Option<UserRole>) =
        sqlx::query_as("SELECT church_id, previous_church_id, previous_role FROM users WHERE id = ?")
            .bind(invitee_id)
            .fetch_one(&mut *conn)
            .await?;

    if church_id != Some(granted_church) {
        tracing::info!(invitee_id, "invitee moved on since accepting; leaving membership as is");
        return Ok(());
    }

    let role = previous_role.unwrap_or(UserRole::Admin);
    sqlx::query(
        r#"
        UPDATE users
        SET church_id = ?, role = ?, previous_church_id = NULL, previous_role = NULL,
            invited_by_user_id = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(previous_church)
    .bind(role)
    .bind(now)
    .bind(invitee_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn grant_access_link(
    conn: &mut SqliteConnection,
    viewer_id: i64,
    church_id: i64,
    invite_id: i64,
    now: &str,
) -> Result<i64, ServiceError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM access_links WHERE viewer_user_id = ? AND church_id = ? AND revoked_at IS NULL",
    )
    .bind(viewer_id)
    .bind(church_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = sqlx::query_scalar(
        r#"
        INSERT INTO access_links (public_id, viewer_user_id, church_id, invite_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(new_public_id())
    .bind(viewer_id)
    .bind(church_id)
    .bind(invite_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// True when `user_id` owns `church_id` and it holds members, bacentas or new believers.
async fn church_has_owned_data(
    conn: &mut SqliteConnection,
    church_id: i64,
    user_id: i64,
) -> Result<bool, ServiceError> {
    let owns = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM churches c
            WHERE c.id = ? AND c.owner_user_id = ?
              AND (
                EXISTS (SELECT 1 FROM members WHERE church_id = c.id)
                OR EXISTS (SELECT 1 FROM bacentas WHERE church_id = c.id)
                OR EXISTS (SELECT 1 FROM new_believers WHERE church_id = c.id)
              )
        )
        "#,
    )
    .bind(church_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(owns)
}

fn ensure_pending(row: &InviteRow) -> Result<(), ServiceError> {
    if row.status == InviteStatus::Pending {
        Ok(())
    } else {
        Err(ServiceError::conflict(format!(
            "Invite is no longer pending (it is {})",
            row.status.as_str()
        )))
    }
}

async fn mark_status(
    conn: &mut SqliteConnection,
    invite_id: i64,
    status: InviteStatus,
    responded_at: Option<&str>,
) -> Result<(), ServiceError> {
    sqlx::query("UPDATE admin_invites SET status = ?, responded_at = COALESCE(?, responded_at) WHERE id = ?")
        .bind(status)
        .bind(responded_at)
        .bind(invite_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn load_row(conn: &mut SqliteConnection, public_id: &str) -> Result<InviteRow, ServiceError> {
    sqlx::query_as::<_, InviteRow>(
        r#"
        SELECT id, church_id, inviter_user_id, invitee_user_id, status, access_kind,
               access_link_id, expires_at
        FROM admin_invites
        WHERE public_id = ?
        "#,
    )
    .bind(public_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Invite not found"))
}

async fn load_invite(conn: &mut SqliteConnection, invite_id: i64) -> Result<AdminInvite, ServiceError> {
    let view = sqlx::query_as::<_, InviteView>(&format!("{SELECT_INVITE_VIEW} WHERE i.id = ?"))
        .bind(invite_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(view.into())
}

async fn list_where(
    pool: &SqlitePool,
    condition: &'static str,
    user_id: i64,
) -> Result<Vec<AdminInvite>, ServiceError> {
    let views = sqlx::query_as::<_, InviteView>(&format!(
        "{SELECT_INVITE_VIEW} WHERE {condition} ORDER BY i.status = 'pending' DESC, i.created_at DESC, i.id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(views.into_iter().map(AdminInvite::from).collect())
}

fn display(user: &UserSummary) -> &str {
    user.display_name
        .as_deref()
        .or(user.email.as_deref())
        .unwrap_or("Someone")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::AccessLevel;
    use crate::services::tenancy::resolve_scope;
    use crate::services::test_utils::*;

    fn config() -> InviteConfig {
        InviteConfig::default()
    }

    struct Pair {
        pool: SqlitePool,
        _dir: tempfile::TempDir,
        inviter: User,
        invitee: User,
    }

    /// An inviting admin plus an invitee who signed up but has no data yet.
    async fn pair() -> Pair {
        let (pool, dir) = create_test_db().await;
        let inviter = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let invitee = create_admin_with_church(&pool, "kofi@example.com", "Kofi's Church").await;
        Pair {
            pool,
            _dir: dir,
            inviter,
            invitee,
        }
    }

    async fn invite_status(pool: &SqlitePool, public_id: &str) -> String {
        sqlx::query_scalar("SELECT status FROM admin_invites WHERE public_id = ?")
            .bind(public_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn ttl_override_must_be_in_range() {
        let config = config();
        assert_eq!(resolve_ttl_hours(None, &config).unwrap(), 168);
        assert_eq!(resolve_ttl_hours(Some(1), &config).unwrap(), 1);
        assert_eq!(resolve_ttl_hours(Some(720), &config).unwrap(), 720);
        assert!(resolve_ttl_hours(Some(0), &config).is_err());
        assert!(resolve_ttl_hours(Some(721), &config).is_err());
    }

    #[tokio::test]
    async fn send_notifies_invitee_and_guards_duplicates() {
        let p = pair().await;

        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        assert_eq!(sent.invite.status, InviteStatus::Pending);
        assert_eq!(sent.invite.church_name, "Grace");
        assert_eq!(sent.deliveries.len(), 1);
        assert_eq!(sent.deliveries[0].user_id, p.invitee.id);
        assert_eq!(sent.deliveries[0].notification.kind, NotificationKind::InviteReceived);
        assert!(sent.invite.expires_at > sent.invite.created_at);

        let err = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, Some(24))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.inviter.public_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let incoming = list_incoming(&p.pool, &p.invitee).await.unwrap();
        assert_eq!(incoming.len(), 1);
        let outgoing = list_outgoing(&p.pool, &p.inviter).await.unwrap();
        assert_eq!(outgoing[0].id, sent.invite.id);
    }

    #[tokio::test]
    async fn leaders_cannot_invite() {
        let p = pair().await;
        let leader = create_leader_in(&p.pool, "esi@example.com", p.inviter.church_id.unwrap()).await;
        let err = send_invite_to_user(&p.pool, &config(), &leader, &p.invitee.public_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn accepting_without_owned_data_changes_role_and_church() {
        let p = pair().await;
        let own_church = p.invitee.church_id;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();

        let accepted = accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(accepted.invite.status, InviteStatus::Accepted);
        assert_eq!(accepted.invite.access_kind, Some(AccessKind::RoleChange));
        assert!(accepted.invite.responded_at.is_some());
        assert_eq!(accepted.deliveries[0].user_id, p.inviter.id);
        assert_eq!(accepted.access_changed, vec![p.invitee.id]);

        let invitee = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(invitee.role, UserRole::Leader);
        assert_eq!(invitee.church_id, p.inviter.church_id);

        let (previous_church, previous_role, invited_by): (Option<i64>, Option<String>, Option<i64>) =
            sqlx::query_as(
                "SELECT previous_church_id, previous_role, invited_by_user_id FROM users WHERE id = ?",
            )
            .bind(p.invitee.id)
            .fetch_one(&p.pool)
            .await
            .unwrap();
        assert_eq!(previous_church, own_church);
        assert_eq!(previous_role.as_deref(), Some("admin"));
        assert_eq!(invited_by, Some(p.inviter.id));
    }

    #[tokio::test]
    async fn accepting_with_owned_data_grants_read_only_link() {
        let p = pair().await;
        let invitee_church = p.invitee.church_id.unwrap();
        seed_member(&p.pool, invitee_church, "Yaw").await;

        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        let accepted = accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(accepted.invite.access_kind, Some(AccessKind::AccessLink));
        assert_eq!(accepted.access_changed, vec![p.inviter.id]);

        let invitee = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(invitee.role, UserRole::Admin);
        assert_eq!(invitee.church_id, Some(invitee_church));

        let church = church_public_id(&p.pool, invitee_church).await;
        let scope = resolve_scope(&p.pool, &p.inviter, &church).await.unwrap();
        assert_eq!(scope.access, AccessLevel::ReadOnly);
    }

    #[tokio::test]
    async fn removing_role_change_restores_previous_church_and_role() {
        let p = pair().await;
        let own_church = p.invitee.church_id;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();

        let err = remove_leader_access(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let removed = remove_leader_access(&p.pool, &p.inviter, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(removed.invite.status, InviteStatus::Revoked);
        assert_eq!(removed.deliveries[0].user_id, p.invitee.id);
        assert_eq!(removed.deliveries[0].notification.kind, NotificationKind::AccessRemoved);

        let invitee = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(invitee.church_id, own_church);
        assert_eq!(invitee.role, UserRole::Admin);
        assert_eq!(
            count_rows(&p.pool, "SELECT COUNT(*) FROM users WHERE previous_church_id IS NOT NULL OR previous_role IS NOT NULL").await,
            0
        );

        // Revoked is final.
        assert!(matches!(
            remove_leader_access(&p.pool, &p.inviter, &sent.invite.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn second_role_change_is_refused_until_the_first_is_removed() {
        let p = pair().await;
        let own_church = p.invitee.church_id;
        let other = create_admin_with_church(&p.pool, "esi@example.com", "Bethel").await;

        let first = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        accept_admin_invite(&p.pool, &p.invitee, &first.invite.id)
            .await
            .unwrap();

        let second = send_invite_to_user(&p.pool, &config(), &other, &p.invitee.public_id, None)
            .await
            .unwrap();
        let invitee = load_user(&p.pool, p.invitee.id).await;
        let err = accept_admin_invite(&p.pool, &invitee, &second.invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(invite_status(&p.pool, &second.invite.id).await, "pending");
        assert_eq!(load_user(&p.pool, p.invitee.id).await.church_id, p.inviter.church_id);

        remove_leader_access(&p.pool, &p.inviter, &first.invite.id)
            .await
            .unwrap();
        let restored = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(restored.church_id, own_church);
        assert_eq!(restored.role, UserRole::Admin);

        // Back home with nothing pending to restore, the second invite can go through.
        let accepted = accept_admin_invite(&p.pool, &restored, &second.invite.id)
            .await
            .unwrap();
        assert_eq!(accepted.invite.access_kind, Some(AccessKind::RoleChange));
        remove_leader_access(&p.pool, &other, &second.invite.id)
            .await
            .unwrap();
        let home = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(home.church_id, own_church);
        assert_eq!(home.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn removing_link_revokes_read_only_access() {
        let p = pair().await;
        let invitee_church = p.invitee.church_id.unwrap();
        seed_member(&p.pool, invitee_church, "Yaw").await;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();

        remove_leader_access(&p.pool, &p.inviter, &sent.invite.id)
            .await
            .unwrap();

        let church = church_public_id(&p.pool, invitee_church).await;
        assert!(matches!(
            resolve_scope(&p.pool, &p.inviter, &church).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(
            count_rows(&p.pool, "SELECT COUNT(*) FROM access_links WHERE revoked_at IS NULL").await,
            0
        );

        // A fresh invite to the same user is allowed again.
        send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn restoration_is_skipped_when_invitee_moved_on() {
        let p = pair().await;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();

        let elsewhere = create_church(&p.pool, "Elsewhere", None).await;
        sqlx::query("UPDATE users SET church_id = ? WHERE id = ?")
            .bind(elsewhere)
            .bind(p.invitee.id)
            .execute(&p.pool)
            .await
            .unwrap();

        let removed = remove_leader_access(&p.pool, &p.inviter, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(removed.invite.status, InviteStatus::Revoked);
        let invitee = load_user(&p.pool, p.invitee.id).await;
        assert_eq!(invitee.church_id, Some(elsewhere));
        assert_eq!(invitee.role, UserRole::Leader);
    }

    #[tokio::test]
    async fn expired_invites_cannot_be_accepted() {
        let p = pair().await;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        sqlx::query("UPDATE admin_invites SET expires_at = ? WHERE public_id = ?")
            .bind(timestamp(Utc::now() - Duration::hours(1)))
            .bind(&sent.invite.id)
            .execute(&p.pool)
            .await
            .unwrap();

        let err = accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Gone(_)));
        assert_eq!(invite_status(&p.pool, &sent.invite.id).await, "expired");
        assert_eq!(load_user(&p.pool, p.invitee.id).await.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn sweeper_expires_only_overdue_pending_invites() {
        let p = pair().await;
        let third = create_admin_with_church(&p.pool, "esi@example.com", "Faith").await;
        let overdue = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();
        let fresh = send_invite_to_user(&p.pool, &config(), &p.inviter, &third.public_id, None)
            .await
            .unwrap();
        sqlx::query("UPDATE admin_invites SET expires_at = ? WHERE public_id = ?")
            .bind(timestamp(Utc::now() - Duration::minutes(5)))
            .bind(&overdue.invite.id)
            .execute(&p.pool)
            .await
            .unwrap();

        assert_eq!(expire_stale_invites(&p.pool).await.unwrap(), 1);
        assert_eq!(invite_status(&p.pool, &overdue.invite.id).await, "expired");
        assert_eq!(invite_status(&p.pool, &fresh.invite.id).await, "pending");
        assert_eq!(expire_stale_invites(&p.pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn only_the_addressee_may_respond_and_only_once() {
        let p = pair().await;
        let stranger = create_admin_with_church(&p.pool, "esi@example.com", "Faith").await;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();

        assert!(matches!(
            accept_admin_invite(&p.pool, &stranger, &sent.invite.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let rejected = reject_admin_invite(&p.pool, &p.invitee, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(rejected.invite.status, InviteStatus::Rejected);
        assert_eq!(rejected.deliveries[0].notification.kind, NotificationKind::InviteRejected);

        assert!(matches!(
            accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            accept_admin_invite(&p.pool, &p.invitee, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inviter_cancels_pending_invite() {
        let p = pair().await;
        let sent = send_invite_to_user(&p.pool, &config(), &p.inviter, &p.invitee.public_id, None)
            .await
            .unwrap();

        assert!(matches!(
            cancel_invite(&p.pool, &p.invitee, &sent.invite.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let cancelled = cancel_invite(&p.pool, &p.inviter, &sent.invite.id)
            .await
            .unwrap();
        assert_eq!(cancelled.invite.status, InviteStatus::Revoked);
        assert_eq!(cancelled.deliveries[0].user_id, p.invitee.id);

        assert!(matches!(
            accept_admin_invite(&p.pool, &p.invitee, &sent.invite.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }
}
