//! Fixtures for service-level tests: a migrated temp database plus seeding helpers.

use flock_auth::{new_public_id, User, UserRole};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

use super::now;

pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let connect_options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Memory)
        .foreign_keys(true);

    // One connection, so every helper and service call sees the same writes.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .expect("Failed to create test database");

    flock_database::MIGRATOR
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

pub async fn load_user(pool: &SqlitePool, id: i64) -> User {
    sqlx::query_as::<_, User>(
        "SELECT id, public_id, email, display_name, phone, role, church_id FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("user should exist")
}

/// Insert an admin who owns a freshly created church, mirroring sign-up.
pub async fn create_admin_with_church(pool: &SqlitePool, email: &str, church: &str) -> User {
    let user = create_user_without_church(pool, email, UserRole::Admin).await;
    let church_id = create_church(pool, church, Some(user.id)).await;

    sqlx::query("UPDATE users SET church_id = ? WHERE id = ?")
        .bind(church_id)
        .bind(user.id)
        .execute(pool)
        .await
        .expect("assign church");

    load_user(pool, user.id).await
}

pub async fn create_user_without_church(pool: &SqlitePool, email: &str, role: UserRole) -> User {
    let now = now();
    let display_name = email.split('@').next().unwrap_or(email).to_string();
    let id = sqlx::query(
        "INSERT INTO users (public_id, email, display_name, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new_public_id())
    .bind(email)
    .bind(display_name)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert user")
    .last_insert_rowid();

    load_user(pool, id).await
}

/// Add a leader to an existing church.
pub async fn create_leader_in(pool: &SqlitePool, email: &str, church_id: i64) -> User {
    let user = create_user_without_church(pool, email, UserRole::Leader).await;
    sqlx::query("UPDATE users SET church_id = ? WHERE id = ?")
        .bind(church_id)
        .bind(user.id)
        .execute(pool)
        .await
        .expect("assign church");
    load_user(pool, user.id).await
}

pub async fn create_church(pool: &SqlitePool, name: &str, owner: Option<i64>) -> i64 {
    let now = now();
    sqlx::query(
        "INSERT INTO churches (public_id, name, owner_user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_public_id())
    .bind(name)
    .bind(owner)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert church")
    .last_insert_rowid()
}

pub async fn church_public_id(pool: &SqlitePool, church_id: i64) -> String {
    sqlx::query_scalar("SELECT public_id FROM churches WHERE id = ?")
        .bind(church_id)
        .fetch_one(pool)
        .await
        .expect("church exists")
}

/// Insert a bare member row and return its internal id.
pub async fn seed_member(pool: &SqlitePool, church_id: i64, first_name: &str) -> i64 {
    let now = now();
    sqlx::query(
        "INSERT INTO members (public_id, church_id, first_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_public_id())
    .bind(church_id)
    .bind(first_name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert member")
    .last_insert_rowid()
}

pub async fn count_rows(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql)
        .fetch_one(pool)
        .await
        .expect("count query")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_rows_are_visible_to_the_next_query() {
        let (pool, _dir) = create_test_db().await;

        for n in 0..20 {
            let admin =
                create_admin_with_church(&pool, &format!("admin{n}@example.com"), "Grace").await;
            let church_id = admin.church_id.expect("admin owns a church");
            let leader = create_leader_in(&pool, &format!("leader{n}@example.com"), church_id).await;
            assert_eq!(leader.church_id, Some(church_id));
            seed_member(&pool, church_id, "Kofi").await;
        }

        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM users").await, 40);
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 20);
    }
}
