use flock_auth::{User, UserRole};
use sqlx::{SqliteConnection, SqlitePool};

use super::{now, ServiceError};
use crate::routes::models::{ChurchRef, UpdateProfileRequest, UserProfile, UserSummary};
use crate::util::clean_optional;

const SEARCH_LIMIT: i64 = 20;

#[derive(sqlx::FromRow)]
struct ProfileRow {
    public_id: String,
    email: Option<String>,
    display_name: Option<String>,
    phone: Option<String>,
    role: UserRole,
    church_public_id: Option<String>,
    church_name: Option<String>,
    inviter_public_id: Option<String>,
    inviter_name: Option<String>,
    inviter_email: Option<String>,
}

pub async fn get_profile(pool: &SqlitePool, user_id: i64) -> Result<UserProfile, ServiceError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT u.public_id, u.email, u.display_name, u.phone, u.role,
               c.public_id AS church_public_id, c.name AS church_name,
               i.public_id AS inviter_public_id, i.display_name AS inviter_name,
               i.email AS inviter_email
        FROM users u
        LEFT JOIN churches c ON c.id = u.church_id
        LEFT JOIN users i ON i.id = u.invited_by_user_id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("User not found"))?;

    let church = match (row.church_public_id, row.church_name) {
        (Some(id), Some(name)) => Some(ChurchRef { id, name }),
        _ => None,
    };
    let invited_by = row.inviter_public_id.map(|id| UserSummary {
        id,
        display_name: row.inviter_name,
        email: row.inviter_email,
    });

    Ok(UserProfile {
        id: row.public_id,
        email: row.email,
        display_name: row.display_name,
        phone: row.phone,
        role: row.role,
        church,
        invited_by,
    })
}

/// Omitted fields stay as they are; blank strings clear them.
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    request: UpdateProfileRequest,
) -> Result<UserProfile, ServiceError> {
    if let Some(display_name) = request.display_name {
        sqlx::query("UPDATE users SET display_name = ?, updated_at = ? WHERE id = ?")
            .bind(clean_optional(Some(display_name)))
            .bind(now())
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    if let Some(phone) = request.phone {
        sqlx::query("UPDATE users SET phone = ?, updated_at = ? WHERE id = ?")
            .bind(clean_optional(Some(phone)))
            .bind(now())
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    get_profile(pool, user_id).await
}

/// Case-insensitive email prefix search used by admins picking an invitee.
pub async fn search_users(
    pool: &SqlitePool,
    caller: &User,
    email_prefix: &str,
) -> Result<Vec<UserSummary>, ServiceError> {
    if caller.role != UserRole::Admin {
        return Err(ServiceError::forbidden("Only admins can search for users"));
    }

    let prefix = email_prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(ServiceError::bad_request("email must not be empty"));
    }

    let pattern = format!("{}%", escape_like(&prefix));
    let users = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
        r#"
        SELECT public_id, display_name, email
        FROM users
        WHERE lower(email) LIKE ? ESCAPE '\' AND id != ?
        ORDER BY email
        LIMIT ?
        "#,
    )
    .bind(pattern)
    .bind(caller.id)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(users
        .into_iter()
        .map(|(id, display_name, email)| UserSummary {
            id,
            display_name,
            email,
        })
        .collect())
}

pub async fn user_summary(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<UserSummary, ServiceError> {
    let (id, display_name, email) = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
        "SELECT public_id, display_name, email FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("User not found"))?;

    Ok(UserSummary {
        id,
        display_name,
        email,
    })
}

/// Resolve a user's internal id from their public id.
pub async fn user_id_by_public(
    conn: &mut SqliteConnection,
    public_id: &str,
) -> Result<i64, ServiceError> {
    sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
        .bind(public_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("User not found"))
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
        assert_eq!(escape_like("ama"), "ama");
    }

    #[tokio::test]
    async fn profile_includes_church_and_inviter() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let leader = create_leader_in(&pool, "kofi@example.com", admin.church_id.unwrap()).await;
        sqlx::query("UPDATE users SET invited_by_user_id = ? WHERE id = ?")
            .bind(admin.id)
            .bind(leader.id)
            .execute(&pool)
            .await
            .unwrap();

        let profile = get_profile(&pool, leader.id).await.unwrap();
        assert_eq!(profile.role, UserRole::Leader);
        assert_eq!(profile.church.unwrap().name, "Grace");
        assert_eq!(profile.invited_by.unwrap().id, admin.public_id);
    }

    #[tokio::test]
    async fn update_profile_sets_and_clears_fields() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;

        let profile = update_profile(
            &pool,
            admin.id,
            UpdateProfileRequest {
                display_name: Some("  Ama Mensah ".into()),
                phone: Some("0244123456".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ama Mensah"));
        assert_eq!(profile.phone.as_deref(), Some("0244123456"));

        let profile = update_profile(
            &pool,
            admin.id,
            UpdateProfileRequest {
                display_name: None,
                phone: Some(" ".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ama Mensah"));
        assert_eq!(profile.phone, None);
    }

    #[tokio::test]
    async fn search_matches_email_prefix_and_skips_caller() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "kwame@example.com", "Grace").await;
        create_admin_with_church(&pool, "Kwabena@example.com", "Hope").await;
        create_admin_with_church(&pool, "esi@example.com", "Faith").await;

        let found = search_users(&pool, &admin, "KW").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email.as_deref(), Some("Kwabena@example.com"));

        assert!(search_users(&pool, &admin, "k_").await.unwrap().is_empty());
        assert!(matches!(
            search_users(&pool, &admin, "  ").await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn leaders_cannot_search() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let leader = create_leader_in(&pool, "kofi@example.com", admin.church_id.unwrap()).await;
        assert!(matches!(
            search_users(&pool, &leader, "ama").await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
