use crate::error::DbResult;
use sqlx::{any::AnyPoolOptions, Any, Pool};

/// Create a database pool from a connection string. Caller must have called
/// `sqlx::any::install_default_drivers()` once per process before this.
pub async fn create_pool(database_url: &str, max_connections: u32) -> DbResult<Pool<Any>> {
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Run the initial schema migration. The `Any` driver does not support
/// executing a batch of statements in a single `query()` call, so the file is
/// split on statement-terminating semicolons and each statement is executed
/// in turn. This is adequate for the single, append-only migration this
/// crate ships; a multi-migration deployment should graduate to `sqlx-cli`.
pub async fn run_migrations(pool: &Pool<Any>) -> DbResult<()> {
    let _ = sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await;

    for statement in split_statements(include_str!("../migrations/001_initial.sql")) {
        sqlx::query(&statement).execute(pool).await?;
    }

    Ok(())
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_sqlite() {
        sqlx::any::install_default_drivers();

        let pool = create_pool("sqlite::memory:", 5)
            .await
            .expect("failed to create pool");

        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn run_migrations_creates_all_tables() {
        sqlx::any::install_default_drivers();
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.expect("migrations failed");

        for table in [
            "user_settings",
            "connected_repositories",
            "reviews",
            "subscriptions",
            "queue_messages",
        ] {
            sqlx::query(&format!("SELECT * FROM {table} WHERE 1 = 0"))
                .execute(&pool)
                .await
                .unwrap_or_else(|e| panic!("table {table} missing or broken: {e}"));
        }
    }

    #[test]
    fn split_statements_ignores_blank_segments() {
        let stmts = split_statements("CREATE TABLE a (x int);\n\nCREATE TABLE b (y int);\n");
        assert_eq!(stmts.len(), 2);
    }
}
