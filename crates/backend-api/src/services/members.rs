use std::collections::HashMap;

use flock_auth::new_public_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::bacentas::{bacenta_id_by_name, bacenta_id_by_public, bacenta_names};
use super::{now, ServiceError};
use crate::dates::parse_day;
use crate::import::{self, ParseIssue};
use crate::permissions::{can_delete_member_directly, can_edit_records, ensure, TenantScope};
use crate::routes::models::{
    CreateMemberRequest, ImportMembersResponse, Member, MemberFilter, MemberRole,
    UpdateMemberRequest,
};
use crate::util::{clean_optional, clean_required};

const EDIT_DENIED: &str = "You cannot edit records in this church";

const SELECT_MEMBER: &str = r#"
    SELECT m.id, m.public_id, m.first_name, m.last_name, m.phone, m.building_address,
           m.birthday, m.born_again, m.role, b.public_id AS bacenta_public_id,
           m.is_active, m.created_at, m.updated_at
    FROM members m
    LEFT JOIN bacentas b ON b.id = m.bacenta_id
"#;

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    public_id: String,
    first_name: String,
    last_name: Option<String>,
    phone: Option<String>,
    building_address: Option<String>,
    birthday: Option<String>,
    born_again: bool,
    role: MemberRole,
    bacenta_public_id: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl MemberRow {
    fn into_member(self, linked_bacenta_ids: Vec<String>) -> Member {
        Member {
            id: self.public_id,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            building_address: self.building_address,
            birthday: self.birthday,
            born_again: self.born_again,
            role: self.role,
            bacenta_id: self.bacenta_public_id,
            linked_bacenta_ids,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Column values for a member row about to be inserted.
#[derive(Debug, Clone, Default)]
pub(crate) struct NewMember {
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub building_address: Option<String>,
    pub birthday: Option<String>,
    pub born_again: bool,
    pub role: MemberRole,
    pub bacenta_id: Option<i64>,
}

pub async fn list_members(
    pool: &SqlitePool,
    scope: &TenantScope,
    filter: MemberFilter,
) -> Result<Vec<Member>, ServiceError> {
    let search = clean_optional(filter.search).map(|term| format!("%{}%", term.to_lowercase()));
    let bacenta = clean_optional(filter.bacenta_id);

    let rows = sqlx::query_as::<_, MemberRow>(&format!(
        r#"{SELECT_MEMBER}
        WHERE m.church_id = ?
          AND (? IS NULL OR b.public_id = ?)
          AND (? IS NULL OR m.role = ?)
          AND (? IS NULL OR m.is_active = ?)
          AND (? IS NULL OR lower(m.first_name || ' ' || COALESCE(m.last_name, '') || ' ' || COALESCE(m.phone, '')) LIKE ?)
        ORDER BY m.first_name COLLATE NOCASE, m.last_name COLLATE NOCASE
        "#
    ))
    .bind(scope.church_id)
    .bind(bacenta.as_deref())
    .bind(bacenta.as_deref())
    .bind(filter.role)
    .bind(filter.role)
    .bind(filter.active)
    .bind(filter.active)
    .bind(search.as_deref())
    .bind(search.as_deref())
    .fetch_all(pool)
    .await?;

    let mut conn = pool.acquire().await?;
    let mut linked = linked_bacentas_for_church(&mut conn, scope.church_id).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let ids = linked.remove(&row.id).unwrap_or_default();
            row.into_member(ids)
        })
        .collect())
}

pub async fn get_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<Member, ServiceError> {
    let mut conn = pool.acquire().await?;
    load_member(&mut conn, scope.church_id, public_id).await
}

pub async fn create_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    request: CreateMemberRequest,
) -> Result<Member, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let bacenta_id = match clean_optional(request.bacenta_id) {
        Some(public_id) => Some(bacenta_id_by_public(&mut tx, scope.church_id, &public_id).await?),
        None => None,
    };

    let fields = NewMember {
        first_name: clean_required(&request.first_name, "first_name")?,
        last_name: clean_optional(request.last_name),
        phone: clean_optional(request.phone),
        building_address: clean_optional(request.building_address),
        birthday: normalize_birthday(request.birthday)?,
        born_again: request.born_again.unwrap_or(false),
        role: request.role.unwrap_or_default(),
        bacenta_id,
    };
    let (member_id, public_id) = insert_member(&mut tx, scope.church_id, &fields).await?;

    if let Some(linked) = request.linked_bacenta_ids {
        let ids = resolve_bacentas(&mut tx, scope.church_id, &linked).await?;
        replace_linked(&mut tx, member_id, bacenta_id, ids).await?;
    }

    let member = load_member(&mut tx, scope.church_id, &public_id).await?;
    tx.commit().await?;

    tracing::info!(church_id = scope.church_id, member = %member.id, "member created");
    Ok(member)
}

pub async fn update_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    request: UpdateMemberRequest,
) -> Result<Member, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let member_id = member_id_by_public(&mut tx, scope.church_id, public_id).await?;
    let now = now();

    if let Some(first_name) = request.first_name {
        let first_name = clean_required(&first_name, "first_name")?;
        set_column(&mut tx, member_id, "first_name", Some(first_name), &now).await?;
    }
    if let Some(last_name) = request.last_name {
        set_column(&mut tx, member_id, "last_name", clean_optional(Some(last_name)), &now).await?;
    }
    if let Some(phone) = request.phone {
        set_column(&mut tx, member_id, "phone", clean_optional(Some(phone)), &now).await?;
    }
    if let Some(address) = request.building_address {
        set_column(&mut tx, member_id, "building_address", clean_optional(Some(address)), &now)
            .await?;
    }
    if let Some(birthday) = request.birthday {
        let birthday = normalize_birthday(Some(birthday))?;
        set_column(&mut tx, member_id, "birthday", birthday, &now).await?;
    }

    if request.born_again.is_some() || request.role.is_some() {
        sqlx::query(
            r#"
            UPDATE members
            SET born_again = COALESCE(?, born_again), role = COALESCE(?, role), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.born_again)
        .bind(request.role)
        .bind(&now)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(bacenta) = request.bacenta_id {
        let bacenta_id = match clean_optional(Some(bacenta)) {
            Some(public_id) => Some(bacenta_id_by_public(&mut tx, scope.church_id, &public_id).await?),
            None => None,
        };
        sqlx::query("UPDATE members SET bacenta_id = ?, updated_at = ? WHERE id = ?")
            .bind(bacenta_id)
            .bind(&now)
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        // A primary bacenta never doubles as a linked one.
        if let Some(bacenta_id) = bacenta_id {
            sqlx::query("DELETE FROM member_linked_bacentas WHERE member_id = ? AND bacenta_id = ?")
                .bind(member_id)
                .bind(bacenta_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    let member = load_member(&mut tx, scope.church_id, public_id).await?;
    tx.commit().await?;
    Ok(member)
}

/// Replace a member's secondary bacentas. Duplicates and the primary bacenta
/// are dropped from the requested set.
pub async fn set_linked_bacentas(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    bacenta_public_ids: &[String],
) -> Result<Member, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let member_id = member_id_by_public(&mut tx, scope.church_id, public_id).await?;
    let primary: Option<i64> = sqlx::query_scalar("SELECT bacenta_id FROM members WHERE id = ?")
        .bind(member_id)
        .fetch_one(&mut *tx)
        .await?;

    let ids = resolve_bacentas(&mut tx, scope.church_id, bacenta_public_ids).await?;
    replace_linked(&mut tx, member_id, primary, ids).await?;

    sqlx::query("UPDATE members SET updated_at = ? WHERE id = ?")
        .bind(now())
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    let member = load_member(&mut tx, scope.church_id, public_id).await?;
    tx.commit().await?;
    Ok(member)
}

pub async fn set_member_active(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    active: bool,
) -> Result<Member, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut conn = pool.acquire().await?;
    let member_id = member_id_by_public(&mut conn, scope.church_id, public_id).await?;
    sqlx::query("UPDATE members SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(now())
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    load_member(&mut conn, scope.church_id, public_id).await
}

pub async fn delete_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<(), ServiceError> {
    ensure(
        can_delete_member_directly(scope),
        "Only admins can delete members; file a deletion request instead",
    )?;

    let mut conn = pool.acquire().await?;
    let member_id = member_id_by_public(&mut conn, scope.church_id, public_id).await?;
    sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    tracing::info!(church_id = scope.church_id, member_id, "member deleted");
    Ok(())
}

/// Parse pasted text and, unless `dry_run`, create every parsed row in one
/// transaction. Rows whose phone already belongs to a church member are skipped.
pub async fn import_members(
    pool: &SqlitePool,
    scope: &TenantScope,
    text: &str,
    dry_run: bool,
) -> Result<ImportMembersResponse, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let known = bacenta_names(pool, scope.church_id).await?;
    let outcome = import::parse_members(text, &known);
    let mut issues = outcome.issues;
    let mut skipped = issues
        .iter()
        .filter(|issue| !outcome.rows.iter().any(|row| row.line == issue.line))
        .count();

    if dry_run {
        return Ok(ImportMembersResponse {
            rows: outcome.rows,
            issues,
            created: 0,
            skipped,
        });
    }

    let mut created = 0;
    let mut tx = pool.begin().await?;
    for row in &outcome.rows {
        if let Some(phone) = row.phone.as_deref() {
            let existing: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM members
                WHERE church_id = ?
                  AND replace(replace(replace(replace(replace(replace(
                        phone, ' ', ''), '-', ''), '(', ''), ')', ''), '+', ''), '.', '') = ?
                LIMIT 1
                "#,
            )
            .bind(scope.church_id)
            .bind(import::phone_digits(phone))
            .fetch_optional(&mut *tx)
            .await?;
            if existing.is_some() {
                issues.push(ParseIssue {
                    line: row.line,
                    message: format!("a member with phone {phone} already exists"),
                });
                skipped += 1;
                continue;
            }
        }

        let bacenta_id = match row.bacenta.as_deref() {
            Some(name) => {
                let found = bacenta_id_by_name(&mut tx, scope.church_id, name).await?;
                if found.is_none() {
                    issues.push(ParseIssue {
                        line: row.line,
                        message: format!("unknown bacenta '{name}'; member created without one"),
                    });
                }
                found
            }
            None => None,
        };

        let fields = NewMember {
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            phone: row.phone.clone(),
            building_address: row.building_address.clone(),
            birthday: row.birthday.clone(),
            born_again: row.born_again.unwrap_or(false),
            role: MemberRole::Member,
            bacenta_id,
        };
        insert_member(&mut tx, scope.church_id, &fields).await?;
        created += 1;
    }
    tx.commit().await?;

    issues.sort_by_key(|issue| issue.line);
    tracing::info!(church_id = scope.church_id, created, skipped, "members imported");

    Ok(ImportMembersResponse {
        rows: outcome.rows,
        issues,
        created,
        skipped,
    })
}

pub(crate) async fn insert_member(
    conn: &mut SqliteConnection,
    church_id: i64,
    fields: &NewMember,
) -> Result<(i64, String), ServiceError> {
    let public_id = new_public_id();
    let now = now();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO members (
            public_id, church_id, first_name, last_name, phone, building_address,
            birthday, born_again, role, bacenta_id, is_active, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&public_id)
    .bind(church_id)
    .bind(&fields.first_name)
    .bind(fields.last_name.as_deref())
    .bind(fields.phone.as_deref())
    .bind(fields.building_address.as_deref())
    .bind(fields.birthday.as_deref())
    .bind(fields.born_again)
    .bind(fields.role)
    .bind(fields.bacenta_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    Ok((id, public_id))
}

pub(crate) async fn load_member(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<Member, ServiceError> {
    let row = sqlx::query_as::<_, MemberRow>(&format!(
        "{SELECT_MEMBER} WHERE m.church_id = ? AND m.public_id = ?"
    ))
    .bind(church_id)
    .bind(public_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Member not found"))?;

    let linked = sqlx::query_scalar(
        r#"
        SELECT b.public_id
        FROM member_linked_bacentas l
        JOIN bacentas b ON b.id = l.bacenta_id
        WHERE l.member_id = ?
        ORDER BY b.name COLLATE NOCASE
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(row.into_member(linked))
}

pub async fn member_id_by_public(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<i64, ServiceError> {
    sqlx::query_scalar("SELECT id FROM members WHERE church_id = ? AND public_id = ?")
        .bind(church_id)
        .bind(public_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Member not found"))
}

/// Accepts `YYYY-MM-DD`, `--MM-DD` (no year), and the pasted forms the
/// import parser understands.
fn normalize_birthday(value: Option<String>) -> Result<Option<String>, ServiceError> {
    let Some(text) = clean_optional(value) else {
        return Ok(None);
    };

    if let Some(month_day) = text.strip_prefix("--") {
        let valid = parse_day(&format!("2000-{month_day}")).is_some();
        return if valid {
            Ok(Some(text))
        } else {
            Err(ServiceError::bad_request("birthday is not a valid date"))
        };
    }

    import::parse_birthday(&text)
        .map(Some)
        .ok_or_else(|| ServiceError::bad_request("birthday is not a valid date"))
}

/// Deduplicate `requested`, keeping first occurrences, and drop the primary.
fn normalize_linked(primary: Option<i64>, requested: Vec<i64>) -> Vec<i64> {
    let mut linked: Vec<i64> = Vec::with_capacity(requested.len());
    for id in requested {
        if Some(id) != primary && !linked.contains(&id) {
            linked.push(id);
        }
    }
    linked
}

async fn resolve_bacentas(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_ids: &[String],
) -> Result<Vec<i64>, ServiceError> {
    let mut ids = Vec::with_capacity(public_ids.len());
    for public_id in public_ids {
        ids.push(bacenta_id_by_public(conn, church_id, public_id).await?);
    }
    Ok(ids)
}

async fn replace_linked(
    conn: &mut SqliteConnection,
    member_id: i64,
    primary: Option<i64>,
    requested: Vec<i64>,
) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM member_linked_bacentas WHERE member_id = ?")
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    for bacenta_id in normalize_linked(primary, requested) {
        sqlx::query("INSERT INTO member_linked_bacentas (member_id, bacenta_id) VALUES (?, ?)")
            .bind(member_id)
            .bind(bacenta_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn linked_bacentas_for_church(
    conn: &mut SqliteConnection,
    church_id: i64,
) -> Result<HashMap<i64, Vec<String>>, ServiceError> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT l.member_id, b.public_id
        FROM member_linked_bacentas l
        JOIN bacentas b ON b.id = l.bacenta_id
        WHERE b.church_id = ?
        ORDER BY b.name COLLATE NOCASE
        "#,
    )
    .bind(church_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut linked: HashMap<i64, Vec<String>> = HashMap::new();
    for (member_id, bacenta) in rows {
        linked.entry(member_id).or_default().push(bacenta);
    }
    Ok(linked)
}

// Column names come from the fixed set in `update_member`, never from input.
async fn set_column(
    conn: &mut SqliteConnection,
    member_id: i64,
    column: &'static str,
    value: Option<String>,
    now: &str,
) -> Result<(), ServiceError> {
    sqlx::query(&format!(
        "UPDATE members SET {column} = ?, updated_at = ? WHERE id = ?"
    ))
    .bind(value)
    .bind(now)
    .bind(member_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::AccessLevel;
    use crate::services::bacentas::create_bacenta;
    use crate::services::tenancy::own_scope;
    use crate::services::test_utils::*;

    async fn admin_scope(pool: &SqlitePool) -> TenantScope {
        let admin = create_admin_with_church(pool, "ama@example.com", "Grace").await;
        own_scope(pool, &admin).await.unwrap()
    }

    fn request(first_name: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            first_name: first_name.into(),
            ..CreateMemberRequest::default()
        }
    }

    #[test]
    fn linked_set_drops_duplicates_and_primary() {
        assert_eq!(normalize_linked(Some(2), vec![1, 2, 3, 1, 3]), vec![1, 3]);
        assert_eq!(normalize_linked(None, vec![4, 4]), vec![4]);
    }

    #[test]
    fn birthdays_are_normalized() {
        assert_eq!(normalize_birthday(None).unwrap(), None);
        assert_eq!(normalize_birthday(Some(" ".into())).unwrap(), None);
        assert_eq!(
            normalize_birthday(Some("1990-05-12".into())).unwrap().as_deref(),
            Some("1990-05-12")
        );
        assert_eq!(
            normalize_birthday(Some("12/05/1990".into())).unwrap().as_deref(),
            Some("1990-05-12")
        );
        assert_eq!(
            normalize_birthday(Some("--02-29".into())).unwrap().as_deref(),
            Some("--02-29")
        );
        assert!(normalize_birthday(Some("--02-30".into())).is_err());
        assert!(normalize_birthday(Some("someday".into())).is_err());
    }

    #[tokio::test]
    async fn create_with_primary_and_linked_bacentas() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        let airport = create_bacenta(&pool, &scope, "Airport").await.unwrap();

        let member = create_member(
            &pool,
            &scope,
            CreateMemberRequest {
                first_name: " Ama ".into(),
                last_name: Some("Mensah".into()),
                bacenta_id: Some(legon.public_id.clone()),
                linked_bacenta_ids: Some(vec![
                    airport.public_id.clone(),
                    legon.public_id.clone(),
                    airport.public_id.clone(),
                ]),
                ..CreateMemberRequest::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(member.first_name, "Ama");
        assert_eq!(member.bacenta_id.as_deref(), Some(legon.public_id.as_str()));
        assert_eq!(member.linked_bacenta_ids, vec![airport.public_id.clone()]);
        assert!(member.is_active);
        assert_eq!(member.role, MemberRole::Member);
    }

    #[tokio::test]
    async fn moving_primary_into_linked_set_removes_the_link() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        let member = create_member(&pool, &scope, request("Kofi")).await.unwrap();

        let member = set_linked_bacentas(&pool, &scope, &member.id, &[legon.public_id.clone()])
            .await
            .unwrap();
        assert_eq!(member.linked_bacenta_ids, vec![legon.public_id.clone()]);

        let member = update_member(
            &pool,
            &scope,
            &member.id,
            UpdateMemberRequest {
                bacenta_id: Some(legon.public_id.clone()),
                ..UpdateMemberRequest::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(member.bacenta_id.as_deref(), Some(legon.public_id.as_str()));
        assert!(member.linked_bacenta_ids.is_empty());
    }

    #[tokio::test]
    async fn update_clears_blank_fields_and_keeps_omitted_ones() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;
        let member = create_member(
            &pool,
            &scope,
            CreateMemberRequest {
                first_name: "Esi".into(),
                phone: Some("0244123456".into()),
                building_address: Some("Hall 3".into()),
                ..CreateMemberRequest::default()
            },
        )
        .await
        .unwrap();

        let updated = update_member(
            &pool,
            &scope,
            &member.id,
            UpdateMemberRequest {
                phone: Some("".into()),
                born_again: Some(true),
                role: Some(MemberRole::BacentaLeader),
                ..UpdateMemberRequest::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.phone, None);
        assert_eq!(updated.building_address.as_deref(), Some("Hall 3"));
        assert!(updated.born_again);
        assert_eq!(updated.role, MemberRole::BacentaLeader);

        let err = update_member(
            &pool,
            &scope,
            &member.id,
            UpdateMemberRequest {
                first_name: Some("  ".into()),
                ..UpdateMemberRequest::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn filters_narrow_the_listing() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();

        let ama = create_member(
            &pool,
            &scope,
            CreateMemberRequest {
                first_name: "Ama".into(),
                last_name: Some("Mensah".into()),
                bacenta_id: Some(legon.public_id.clone()),
                ..CreateMemberRequest::default()
            },
        )
        .await
        .unwrap();
        let kofi = create_member(&pool, &scope, request("Kofi")).await.unwrap();
        set_member_active(&pool, &scope, &kofi.id, false).await.unwrap();

        let all = list_members(&pool, &scope, MemberFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let in_legon = list_members(
            &pool,
            &scope,
            MemberFilter {
                bacenta_id: Some(legon.public_id.clone()),
                ..MemberFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_legon.len(), 1);
        assert_eq!(in_legon[0].id, ama.id);

        let active = list_members(
            &pool,
            &scope,
            MemberFilter {
                active: Some(true),
                ..MemberFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(active.len(), 1);

        let searched = list_members(
            &pool,
            &scope,
            MemberFilter {
                search: Some("MENS".into()),
                ..MemberFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].last_name.as_deref(), Some("Mensah"));
    }

    #[tokio::test]
    async fn leaders_cannot_delete_directly_and_viewers_cannot_edit() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let leader = create_leader_in(&pool, "kofi@example.com", admin.church_id.unwrap()).await;
        let admin_scope = own_scope(&pool, &admin).await.unwrap();
        let leader_scope = own_scope(&pool, &leader).await.unwrap();

        let member = create_member(&pool, &leader_scope, request("Yaw")).await.unwrap();
        assert!(matches!(
            delete_member(&pool, &leader_scope, &member.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let mut viewer = admin_scope.clone();
        viewer.access = AccessLevel::ReadOnly;
        assert!(matches!(
            create_member(&pool, &viewer, request("Abena")).await,
            Err(ServiceError::Forbidden(_))
        ));

        delete_member(&pool, &admin_scope, &member.id).await.unwrap();
        assert!(matches!(
            get_member(&pool, &admin_scope, &member.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn import_creates_rows_and_reports_problems() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;
        create_bacenta(&pool, &scope, "Legon").await.unwrap();
        create_member(
            &pool,
            &scope,
            CreateMemberRequest {
                first_name: "Existing".into(),
                phone: Some("0200000000".into()),
                ..CreateMemberRequest::default()
            },
        )
        .await
        .unwrap();

        let text = "First Name,Last Name,Phone,Bacenta\n\
                    Ama,Mensah,0244123456,legon\n\
                    Kofi,Owusu,0501234567,Airport\n\
                    ,Nobody,0555555555,\n\
                    Esi,Dup,0200000000,";

        let preview = import_members(&pool, &scope, text, true).await.unwrap();
        assert_eq!(preview.created, 0);
        assert_eq!(preview.rows.len(), 3);
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 1);

        let result = import_members(&pool, &scope, text, false).await.unwrap();
        assert_eq!(result.created, 2);
        assert_eq!(result.skipped, 2);
        let lines: Vec<usize> = result.issues.iter().map(|issue| issue.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
        assert!(result.issues[0].message.contains("unknown bacenta 'Airport'"));

        let in_legon = count_rows(
            &pool,
            "SELECT COUNT(*) FROM members m JOIN bacentas b ON b.id = m.bacenta_id WHERE b.name = 'Legon'",
        )
        .await;
        assert_eq!(in_legon, 1);
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 3);
    }

    #[tokio::test]
    async fn import_matches_known_phones_on_digits_only() {
        let (pool, _dir) = create_test_db().await;
        let scope = admin_scope(&pool).await;

        let first = import_members(&pool, &scope, "Ama,0244123456", false).await.unwrap();
        assert_eq!(first.created, 1);

        let text = "Ama,024 412 3456\nYaw,(050) 123-4567\nEfua,050-123-4567";
        let second = import_members(&pool, &scope, text, false).await.unwrap();
        assert_eq!(second.created, 1);
        assert_eq!(second.skipped, 2);
        let lines: Vec<usize> = second.issues.iter().map(|issue| issue.line).collect();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 2);
    }
}
