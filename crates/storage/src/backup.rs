use billcal_core::BackupPayload;

use crate::db::DbPool;
use crate::debts::{get_debt_accounts, insert_debt_row};
use crate::error::StorageError;
use crate::schedules::{get_all_occurrences, get_schedules, insert_occurrences, insert_schedule_row};

/// Snapshot of debt accounts, schedules and occurrences.
pub async fn export_backup(pool: &DbPool) -> Result<BackupPayload, StorageError> {
    Ok(BackupPayload {
        debt_accounts: get_debt_accounts(pool).await?,
        schedules: get_schedules(pool).await?,
        occurrences: get_all_occurrences(pool).await?,
    })
}

/// Replaces the calendar tables with the payload, keeping its ids. Nothing
/// changes if any row fails to insert.
pub async fn import_backup(pool: &DbPool, payload: &BackupPayload) -> Result<(), StorageError> {
    for schedule in &payload.schedules {
        schedule.validate()?;
    }

    let mut tx = pool.begin().await?;
    for table in ["occurrences", "schedules", "debt_accounts"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    for debt in &payload.debt_accounts {
        insert_debt_row(&mut tx, debt).await?;
    }
    for schedule in &payload.schedules {
        insert_schedule_row(&mut tx, schedule).await?;
    }
    insert_occurrences(&mut tx, &payload.occurrences).await?;
    tx.commit().await?;

    tracing::info!(
        debts = payload.debt_accounts.len(),
        schedules = payload.schedules.len(),
        occurrences = payload.occurrences.len(),
        "backup restored"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_db;
    use crate::debts::save_debt_account;
    use crate::schedules::insert_schedule;
    use billcal_core::{DebtAccount, EntryType, Frequency, Money, Occurrence, Schedule, ScheduleId};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded() -> DbPool {
        let pool = create_memory_db().await.unwrap();
        let debt_id = save_debt_account(&pool, &DebtAccount::new("Visa", Money::from_cents(500_00)))
            .await
            .unwrap();
        let mut repay = Schedule::new("Visa repayment", EntryType::Debt, Money::from_cents(50_00), date(2024, 1, 10), Frequency::Monthly);
        repay.linked_debt_account_id = Some(debt_id);
        insert_schedule(&pool, &repay, 2).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn export_then_import_into_fresh_db() {
        let source = seeded().await;
        let payload = export_backup(&source).await.unwrap();
        assert_eq!(payload.debt_accounts.len(), 1);
        assert_eq!(payload.schedules.len(), 1);
        assert_eq!(payload.occurrences.len(), 3);

        let json = payload.to_json().unwrap();
        let target = create_memory_db().await.unwrap();
        import_backup(&target, &BackupPayload::from_json(&json).unwrap()).await.unwrap();

        assert_eq!(export_backup(&target).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn import_replaces_existing_rows() {
        let pool = seeded().await;
        import_backup(&pool, &BackupPayload::default()).await.unwrap();
        assert!(export_backup(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broken_payload_leaves_database_untouched() {
        let pool = seeded().await;
        let before = export_backup(&pool).await.unwrap();

        let mut broken = before.clone();
        // Occurrence pointing at a schedule that is not in the payload.
        broken
            .occurrences
            .push(Occurrence::scheduled(Some(ScheduleId(999)), date(2024, 5, 1), Money::from_cents(1)));
        assert!(import_backup(&pool, &broken).await.is_err());
        assert_eq!(export_backup(&pool).await.unwrap(), before);
    }
}
