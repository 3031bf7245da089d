use billcal_core::{
    format_iso_date, generate_occurrences, DebtAccountId, Occurrence, OccurrenceId, OccurrenceStatus,
    Schedule, ScheduleId,
};
use chrono::NaiveDate;
use sqlx::SqliteConnection;

use crate::db::{
    date_from_sql, money_from_sql, money_to_sql, opt_date_from_sql, opt_date_to_sql, opt_money_from_sql,
    parse_column, DbPool,
};
use crate::error::StorageError;

type ScheduleRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<i64>,
    String,
);

const SCHEDULE_COLUMNS: &str = "id, name, entry_type, category, amount, start_date, frequency, repeat_interval, end_date, linked_debt_account_id, notes";

fn schedule_from_row(r: ScheduleRow) -> Result<Schedule, StorageError> {
    Ok(Schedule {
        id: Some(ScheduleId(r.0)),
        name: r.1,
        entry_type: parse_column("entry_type", &r.2)?,
        category: r.3,
        amount: money_from_sql("amount", &r.4)?,
        start_date: date_from_sql("start_date", &r.5)?,
        frequency: parse_column("frequency", &r.6)?,
        interval: u32::try_from(r.7).map_err(|_| StorageError::decode("repeat_interval", &r.7.to_string()))?,
        end_date: opt_date_from_sql("end_date", r.8)?,
        linked_debt_account_id: r.9.map(DebtAccountId),
        notes: r.10,
    })
}

type OccurrenceRow = (i64, Option<i64>, String, String, String, Option<String>, Option<String>);

const OCCURRENCE_COLUMNS: &str = "id, schedule_id, date, planned_amount, status, paid_amount, paid_date";

fn occurrence_from_row(r: OccurrenceRow) -> Result<Occurrence, StorageError> {
    Ok(Occurrence {
        id: Some(OccurrenceId(r.0)),
        schedule_id: r.1.map(ScheduleId),
        date: date_from_sql("date", &r.2)?,
        planned_amount: money_from_sql("planned_amount", &r.3)?,
        status: parse_column("status", &r.4)?,
        paid_amount: opt_money_from_sql("paid_amount", r.5)?,
        paid_date: opt_date_from_sql("paid_date", r.6)?,
    })
}

pub(crate) async fn insert_occurrences(
    conn: &mut SqliteConnection,
    occurrences: &[Occurrence],
) -> Result<(), sqlx::Error> {
    for occ in occurrences {
        sqlx::query(
            "INSERT INTO occurrences (id, schedule_id, date, planned_amount, status, paid_amount, paid_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(occ.id.map(|id| id.0))
        .bind(occ.schedule_id.map(|id| id.0))
        .bind(format_iso_date(occ.date))
        .bind(money_to_sql(occ.planned_amount))
        .bind(occ.status.as_str())
        .bind(occ.paid_amount.map(money_to_sql))
        .bind(opt_date_to_sql(occ.paid_date))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) async fn insert_schedule_row(
    conn: &mut SqliteConnection,
    schedule: &Schedule,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO schedules (id, name, entry_type, category, amount, start_date, frequency,
                               repeat_interval, end_date, linked_debt_account_id, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(schedule.id.map(|id| id.0))
    .bind(&schedule.name)
    .bind(schedule.entry_type.as_str())
    .bind(&schedule.category)
    .bind(money_to_sql(schedule.amount))
    .bind(format_iso_date(schedule.start_date))
    .bind(schedule.frequency.as_str())
    .bind(i64::from(schedule.interval))
    .bind(opt_date_to_sql(schedule.end_date))
    .bind(schedule.linked_debt_account_id.map(|id| id.0))
    .bind(&schedule.notes)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Stores a new schedule together with its generated occurrences. Either
/// both land or neither does.
pub async fn insert_schedule(
    pool: &DbPool,
    schedule: &Schedule,
    months_ahead: u32,
) -> Result<ScheduleId, StorageError> {
    schedule.validate()?;

    let mut tx = pool.begin().await?;
    let id = ScheduleId(insert_schedule_row(&mut tx, schedule).await?);

    let mut stored = schedule.clone();
    stored.id = Some(id);
    let occurrences = generate_occurrences(&stored, months_ahead, None);
    insert_occurrences(&mut tx, &occurrences).await?;
    tx.commit().await?;

    tracing::info!(schedule = %id, occurrences = occurrences.len(), "schedule saved");
    Ok(id)
}

/// Saves an edited schedule and replaces all of its occurrences with a
/// fresh generation, atomically.
pub async fn update_schedule(
    pool: &DbPool,
    schedule: &Schedule,
    months_ahead: u32,
) -> Result<usize, StorageError> {
    schedule.validate()?;
    let id = schedule.id.ok_or_else(|| StorageError::not_found("schedule", "<unsaved>"))?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE schedules
        SET name = ?, entry_type = ?, category = ?, amount = ?, start_date = ?, frequency = ?,
            repeat_interval = ?, end_date = ?, linked_debt_account_id = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(&schedule.name)
    .bind(schedule.entry_type.as_str())
    .bind(&schedule.category)
    .bind(money_to_sql(schedule.amount))
    .bind(format_iso_date(schedule.start_date))
    .bind(schedule.frequency.as_str())
    .bind(i64::from(schedule.interval))
    .bind(opt_date_to_sql(schedule.end_date))
    .bind(schedule.linked_debt_account_id.map(|id| id.0))
    .bind(&schedule.notes)
    .bind(id.0)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("schedule", id));
    }

    sqlx::query("DELETE FROM occurrences WHERE schedule_id = ?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let occurrences = generate_occurrences(schedule, months_ahead, None);
    insert_occurrences(&mut tx, &occurrences).await?;
    tx.commit().await?;

    tracing::info!(schedule = %id, occurrences = occurrences.len(), "schedule regenerated");
    Ok(occurrences.len())
}

/// Replaces the occurrences dated on or after `from` with a fresh
/// generation resumed at `from`. Earlier history is left alone.
pub async fn regenerate_from(
    pool: &DbPool,
    id: ScheduleId,
    months_ahead: u32,
    from: NaiveDate,
) -> Result<usize, StorageError> {
    let schedule = get_schedule(pool, id)
        .await?
        .ok_or_else(|| StorageError::not_found("schedule", id))?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM occurrences WHERE schedule_id = ? AND date >= ?")
        .bind(id.0)
        .bind(format_iso_date(from))
        .execute(&mut *tx)
        .await?;
    let occurrences = generate_occurrences(&schedule, months_ahead, Some(from));
    insert_occurrences(&mut tx, &occurrences).await?;
    tx.commit().await?;

    tracing::info!(schedule = %id, %from, occurrences = occurrences.len(), "schedule resumed");
    Ok(occurrences.len())
}

/// Deletes the schedule and its occurrences.
pub async fn delete_schedule(pool: &DbPool, id: ScheduleId) -> Result<bool, StorageError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM occurrences WHERE schedule_id = ?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_schedule(pool: &DbPool, id: ScheduleId) -> Result<Option<Schedule>, StorageError> {
    let row = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(pool)
    .await?;
    row.map(schedule_from_row).transpose()
}

pub async fn get_schedules(pool: &DbPool) -> Result<Vec<Schedule>, StorageError> {
    let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY start_date, id"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(schedule_from_row).collect()
}

pub async fn get_occurrences_for_schedule(
    pool: &DbPool,
    id: ScheduleId,
) -> Result<Vec<Occurrence>, StorageError> {
    let rows = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE schedule_id = ? ORDER BY date, id"
    ))
    .bind(id.0)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(occurrence_from_row).collect()
}

pub async fn get_all_occurrences(pool: &DbPool) -> Result<Vec<Occurrence>, StorageError> {
    let rows = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences ORDER BY date, id"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(occurrence_from_row).collect()
}

/// Occurrences dated within `start..=end`.
pub async fn get_occurrences_between(
    pool: &DbPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Occurrence>, StorageError> {
    let rows = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE date >= ? AND date <= ? ORDER BY date, id"
    ))
    .bind(format_iso_date(start))
    .bind(format_iso_date(end))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(occurrence_from_row).collect()
}

pub async fn get_occurrence(pool: &DbPool, id: OccurrenceId) -> Result<Option<Occurrence>, StorageError> {
    let row = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(pool)
    .await?;
    row.map(occurrence_from_row).transpose()
}

/// Writes back the mutable fields of an occurrence. The schedule link is
/// never touched.
pub async fn update_occurrence(pool: &DbPool, occurrence: &Occurrence) -> Result<(), StorageError> {
    let id = occurrence
        .id
        .ok_or_else(|| StorageError::not_found("occurrence", "<unsaved>"))?;
    let result = sqlx::query(
        "UPDATE occurrences SET date = ?, planned_amount = ?, status = ?, paid_amount = ?, paid_date = ? WHERE id = ?",
    )
    .bind(format_iso_date(occurrence.date))
    .bind(money_to_sql(occurrence.planned_amount))
    .bind(occurrence.status.as_str())
    .bind(occurrence.paid_amount.map(money_to_sql))
    .bind(opt_date_to_sql(occurrence.paid_date))
    .bind(id.0)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("occurrence", id));
    }
    Ok(())
}

/// Flags scheduled occurrences dated before `today` as missed.
pub async fn mark_missed_before(pool: &DbPool, today: NaiveDate) -> Result<u64, StorageError> {
    let result = sqlx::query("UPDATE occurrences SET status = ? WHERE status = ? AND date < ?")
        .bind(OccurrenceStatus::Missed.as_str())
        .bind(OccurrenceStatus::Scheduled.as_str())
        .bind(format_iso_date(today))
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        tracing::info!(count = result.rows_affected(), "occurrences marked missed");
    }
    Ok(result.rows_affected())
}
