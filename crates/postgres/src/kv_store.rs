use availability_snapshot::{SnapshotError, Store};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// `Store` backed by the `kv_store` table (`key TEXT PRIMARY KEY, value JSONB`)
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool. Call `database::ensure_schema` first.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(e: sqlx::Error) -> SnapshotError {
    log::error!("Database error: {}", e);
    SnapshotError::Store(e.to_string())
}

/// Escapes `LIKE` wildcards so the prefix matches literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SnapshotError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(|row| row.get::<Value, _>("value")))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SnapshotError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value) -> Result<bool, SnapshotError> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, SnapshotError> {
        let rows = sqlx::query(
            "SELECT key, value FROM kv_store WHERE key LIKE $1 ESCAPE '\\' ORDER BY key",
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<Value, _>("value")))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), SnapshotError> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("snapshot:2025-07-10:"), "snapshot:2025-07-10:%");
        assert_eq!(like_prefix("a_b%c"), "a\\_b\\%c%");
        assert_eq!(like_prefix("back\\slash"), "back\\\\slash%");
        assert_eq!(like_prefix(""), "%");
    }

    #[tokio::test]
    async fn test_unreachable_database_is_a_store_error() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:9/none")
            .unwrap();
        let store = PgStore::new(pool);

        let result = store.get("ledger:2025-07-10").await;
        assert!(matches!(result, Err(SnapshotError::Store(_))));
    }
}
