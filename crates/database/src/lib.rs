//! Flock Database Crate
//!
//! Connection management and the embedded schema migrations for the Flock
//! backend. Query code lives next to the services that own each table.

use anyhow::Result;
use flock_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod migrations;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = prepare_database(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_database() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = initialize_database(&config).await.unwrap();
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_database_initialization_creates_tables() {
        let (pool, _temp_dir) = create_test_database().await;

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();

        for expected in [
            "users",
            "churches",
            "bacentas",
            "members",
            "attendance",
            "head_counts",
            "admin_invites",
            "access_links",
            "chat_threads",
            "notifications",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (pool, _temp_dir) = create_test_database().await;

        let result: (bool,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(result.0);
    }

    #[tokio::test]
    async fn test_head_count_rejects_negative_values() {
        let (pool, _temp_dir) = create_test_database().await;
        let now = "2024-01-07T10:00:00+00:00";

        sqlx::query(
            "INSERT INTO churches (public_id, name, created_at, updated_at) VALUES ('c1', 'Grace', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO bacentas (public_id, church_id, name, created_at, updated_at) VALUES ('b1', 1, 'North', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let result = sqlx::query(
            "INSERT INTO head_counts (church_id, bacenta_id, date, count, updated_at) VALUES (1, 1, '2024-01-07', -1, ?)",
        )
        .bind(now)
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }
}
