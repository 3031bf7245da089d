use billcal_core::{format_iso_date, parse_iso_date, Money};
use chrono::NaiveDate;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    prepare(&pool).await?;
    tracing::debug!(path = %path.display(), "opened database");
    Ok(pool)
}

/// Private database that lives as long as its single connection.
pub async fn create_memory_db() -> Result<DbPool, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    prepare(&pool).await?;
    Ok(pool)
}

async fn prepare(pool: &DbPool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    run_migrations(pool).await?;
    Ok(())
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS debt_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            balance TEXT NOT NULL,
            apr TEXT,
            min_payment TEXT,
            due_day INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            entry_type TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            amount TEXT NOT NULL,
            start_date TEXT NOT NULL,
            frequency TEXT NOT NULL,
            repeat_interval INTEGER NOT NULL DEFAULT 1,
            end_date TEXT,
            linked_debt_account_id INTEGER,
            notes TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (linked_debt_account_id) REFERENCES debt_accounts(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS occurrences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id INTEGER,
            date TEXT NOT NULL,
            planned_amount TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            paid_amount TEXT,
            paid_date TEXT,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_occurrences_date ON occurrences(date)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            match_type TEXT NOT NULL DEFAULT 'contains',
            category TEXT NOT NULL,
            profile TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS csv_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            headers_signature TEXT NOT NULL,
            mapping_json TEXT NOT NULL,
            UNIQUE (source, headers_signature)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_batches (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            file_name TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            row_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_batch_id TEXT NOT NULL,
            date TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL,
            signed_amount TEXT NOT NULL,
            direction TEXT NOT NULL,
            source TEXT NOT NULL,
            category TEXT NOT NULL,
            profile TEXT NOT NULL,
            confidence REAL NOT NULL,
            matched_rule TEXT,
            dedupe_key TEXT NOT NULL,
            FOREIGN KEY (import_batch_id) REFERENCES import_batches(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("DROP INDEX IF EXISTS idx_bank_transactions_dedupe")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_bank_transactions_dedupe_key ON bank_transactions(dedupe_key)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_setting(pool: &DbPool, key: &str) -> Result<Option<String>, StorageError> {
    let row = sqlx::query_as::<_, (String,)>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn set_setting(pool: &DbPool, key: &str, value: &str) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

// ── column codecs ─────────────────────────────────────────────────────────────

pub(crate) fn money_to_sql(money: Money) -> String {
    money.as_decimal().to_string()
}

pub(crate) fn money_from_sql(column: &'static str, value: &str) -> Result<Money, StorageError> {
    Money::from_str(value).map_err(|_| StorageError::decode(column, value))
}

pub(crate) fn opt_money_from_sql(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<Money>, StorageError> {
    value.map(|v| money_from_sql(column, &v)).transpose()
}

pub(crate) fn date_from_sql(column: &'static str, value: &str) -> Result<NaiveDate, StorageError> {
    parse_iso_date(value).ok_or_else(|| StorageError::decode(column, value))
}

pub(crate) fn opt_date_from_sql(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, StorageError> {
    value.map(|v| date_from_sql(column, &v)).transpose()
}

pub(crate) fn opt_date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(format_iso_date)
}

pub(crate) fn parse_column<T: FromStr>(column: &'static str, value: &str) -> Result<T, StorageError> {
    value.parse().map_err(|_| StorageError::decode(column, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_round_trip_and_overwrite() {
        let pool = create_memory_db().await.unwrap();
        assert_eq!(get_setting(&pool, "horizon").await.unwrap(), None);
        set_setting(&pool, "horizon", "12").await.unwrap();
        set_setting(&pool, "horizon", "6").await.unwrap();
        assert_eq!(get_setting(&pool, "horizon").await.unwrap().as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn on_disk_database_is_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billcal.db");
        {
            let pool = create_db(&path).await.unwrap();
            set_setting(&pool, "k", "v").await.unwrap();
            pool.close().await;
        }
        let pool = create_db(&path).await.unwrap();
        assert_eq!(get_setting(&pool, "k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn codecs_reject_garbage() {
        assert!(money_from_sql("amount", "12.5").is_ok());
        assert!(matches!(money_from_sql("amount", "x"), Err(StorageError::Decode { .. })));
        assert!(date_from_sql("date", "2024-13-01").is_err());
        assert_eq!(opt_date_from_sql("date", None).unwrap(), None);
    }
}
