use billcal_core::parse_iso_date;
use billcal_import::{BatchCommit, CategoryRule, Direction, ImportBatch, SavedMapping, SourceKind, Transaction};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{money_from_sql, money_to_sql, parse_column, DbPool};
use crate::error::StorageError;

// ── category rules ────────────────────────────────────────────────────────────

/// Inserts a new rule, or updates it in place when it already has an id.
pub async fn save_category_rule(pool: &DbPool, rule: &CategoryRule) -> Result<i64, StorageError> {
    match rule.id {
        Some(id) => {
            let result = sqlx::query(
                "UPDATE category_rules SET pattern = ?, match_type = ?, category = ?, profile = ?, priority = ?, enabled = ? WHERE id = ?",
            )
            .bind(&rule.pattern)
            .bind(rule.match_type.as_str())
            .bind(&rule.category)
            .bind(&rule.profile)
            .bind(rule.priority)
            .bind(rule.enabled)
            .bind(id)
            .execute(pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StorageError::not_found("category rule", id));
            }
            Ok(id)
        }
        None => {
            let result = sqlx::query(
                "INSERT INTO category_rules (pattern, match_type, category, profile, priority, enabled) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&rule.pattern)
            .bind(rule.match_type.as_str())
            .bind(&rule.category)
            .bind(&rule.profile)
            .bind(rule.priority)
            .bind(rule.enabled)
            .execute(pool)
            .await?;
            Ok(result.last_insert_rowid())
        }
    }
}

/// All rules, enabled or not, in insertion order.
pub async fn get_category_rules(pool: &DbPool) -> Result<Vec<CategoryRule>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, Option<String>, i32, bool)>(
        "SELECT id, pattern, match_type, category, profile, priority, enabled FROM category_rules ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(CategoryRule {
                id: Some(r.0),
                pattern: r.1,
                match_type: parse_column("match_type", &r.2)?,
                category: r.3,
                profile: r.4,
                priority: r.5,
                enabled: r.6,
            })
        })
        .collect()
}

pub async fn delete_category_rule(pool: &DbPool, id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM category_rules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── column mappings ───────────────────────────────────────────────────────────

/// One mapping per (source, header signature); saving again replaces it.
pub async fn save_csv_mapping(pool: &DbPool, mapping: &SavedMapping) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO csv_mappings (source, headers_signature, mapping_json) VALUES (?, ?, ?)
        ON CONFLICT(source, headers_signature) DO UPDATE SET mapping_json = excluded.mapping_json
        "#,
    )
    .bind(mapping.source.key())
    .bind(&mapping.headers_signature)
    .bind(&mapping.mapping_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_csv_mappings(pool: &DbPool) -> Result<Vec<SavedMapping>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, String, String, String)>(
        "SELECT id, source, headers_signature, mapping_json FROM csv_mappings ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(SavedMapping {
                id: Some(r.0),
                source: parse_column::<SourceKind>("source", &r.1)?,
                headers_signature: r.2,
                mapping_json: r.3,
            })
        })
        .collect()
}

// ── import batches ────────────────────────────────────────────────────────────

/// Writes the batch record and its transactions in one transaction.
/// Transactions whose dedupe key is already stored, from this or an earlier
/// batch, are skipped; the batch's row count records what was inserted.
/// Returns that count.
pub async fn commit_import_batch(pool: &DbPool, commit: &BatchCommit) -> Result<usize, StorageError> {
    let batch = &commit.batch;
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO import_batches (id, source, file_name, imported_at, row_count) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(batch.id.to_string())
    .bind(batch.source.key())
    .bind(&batch.file_name)
    .bind(batch.imported_at.to_rfc3339())
    .bind(batch.row_count as i64)
    .execute(&mut *tx)
    .await?;

    let mut inserted = 0usize;
    for t in &commit.transactions {
        let result = sqlx::query(
            r#"
            INSERT INTO bank_transactions (import_batch_id, date, description, signed_amount, direction,
                                           source, category, profile, confidence, matched_rule, dedupe_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dedupe_key) DO NOTHING
            "#,
        )
        .bind(batch.id.to_string())
        .bind(t.date_iso())
        .bind(&t.description)
        .bind(money_to_sql(t.signed_amount))
        .bind(t.direction.as_str())
        .bind(t.source.key())
        .bind(&t.category)
        .bind(&t.profile)
        .bind(t.confidence)
        .bind(&t.matched_rule)
        .bind(&t.dedupe_key)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected() as usize;
    }

    if inserted != batch.row_count {
        sqlx::query("UPDATE import_batches SET row_count = ? WHERE id = ?")
            .bind(inserted as i64)
            .bind(batch.id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(
        batch = %batch.id,
        source = %batch.source,
        rows = inserted,
        skipped = commit.transactions.len() - inserted,
        "import batch committed"
    );
    Ok(inserted)
}

fn batch_from_row(r: (String, String, String, String, i64)) -> Result<ImportBatch, StorageError> {
    Ok(ImportBatch {
        id: Uuid::parse_str(&r.0).map_err(|_| StorageError::decode("id", &r.0))?,
        source: parse_column("source", &r.1)?,
        file_name: r.2,
        imported_at: DateTime::parse_from_rfc3339(&r.3)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StorageError::decode("imported_at", &r.3))?,
        row_count: usize::try_from(r.4).map_err(|_| StorageError::decode("row_count", &r.4.to_string()))?,
    })
}

/// Newest first.
pub async fn get_import_batches(pool: &DbPool) -> Result<Vec<ImportBatch>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String, String, i64)>(
        "SELECT id, source, file_name, imported_at, row_count FROM import_batches ORDER BY imported_at DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(batch_from_row).collect()
}

type BankRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    f32,
    Option<String>,
    String,
);

pub async fn get_batch_transactions(pool: &DbPool, batch_id: Uuid) -> Result<Vec<Transaction>, StorageError> {
    let rows = sqlx::query_as::<_, BankRow>(
        r#"
        SELECT id, date, description, signed_amount, direction, source, category, profile,
               confidence, matched_rule, dedupe_key
        FROM bank_transactions WHERE import_batch_id = ? ORDER BY id
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let direction = match r.4.as_str() {
                "debit" => Direction::Debit,
                "credit" => Direction::Credit,
                other => return Err(StorageError::decode("direction", other)),
            };
            Ok(Transaction {
                id: Some(r.0),
                date: parse_iso_date(&r.1),
                description: r.2,
                signed_amount: money_from_sql("signed_amount", &r.3)?,
                direction,
                source: parse_column("source", &r.5)?,
                category: r.6,
                profile: r.7,
                confidence: r.8,
                matched_rule: r.9,
                dedupe_key: r.10,
                import_batch_id: Some(batch_id),
                issues: Vec::new(),
            })
        })
        .collect()
}
