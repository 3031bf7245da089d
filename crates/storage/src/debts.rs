use billcal_core::{DebtAccount, DebtAccountId};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::db::{money_from_sql, money_to_sql, opt_money_from_sql, parse_column, DbPool};
use crate::error::StorageError;

type DebtRow = (i64, String, String, Option<String>, Option<String>, Option<i64>, bool);

fn debt_from_row(r: DebtRow) -> Result<DebtAccount, StorageError> {
    Ok(DebtAccount {
        id: Some(DebtAccountId(r.0)),
        name: r.1,
        balance: money_from_sql("balance", &r.2)?,
        apr: r.3.map(|v| parse_column::<Decimal>("apr", &v)).transpose()?,
        min_payment: opt_money_from_sql("min_payment", r.4)?,
        due_day: r.5
            .map(|d| u8::try_from(d).map_err(|_| StorageError::decode("due_day", &d.to_string())))
            .transpose()?,
        active: r.6,
    })
}

pub(crate) async fn insert_debt_row(conn: &mut SqliteConnection, debt: &DebtAccount) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO debt_accounts (id, name, balance, apr, min_payment, due_day, active) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(debt.id.map(|id| id.0))
    .bind(&debt.name)
    .bind(money_to_sql(debt.balance))
    .bind(debt.apr.map(|a| a.to_string()))
    .bind(debt.min_payment.map(money_to_sql))
    .bind(debt.due_day.map(i64::from))
    .bind(debt.active)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Inserts a new debt account, or updates it when it already has an id.
pub async fn save_debt_account(pool: &DbPool, debt: &DebtAccount) -> Result<DebtAccountId, StorageError> {
    let Some(id) = debt.id else {
        let mut conn = pool.acquire().await?;
        return Ok(DebtAccountId(insert_debt_row(&mut conn, debt).await?));
    };

    let result = sqlx::query(
        "UPDATE debt_accounts SET name = ?, balance = ?, apr = ?, min_payment = ?, due_day = ?, active = ? WHERE id = ?",
    )
    .bind(&debt.name)
    .bind(money_to_sql(debt.balance))
    .bind(debt.apr.map(|a| a.to_string()))
    .bind(debt.min_payment.map(money_to_sql))
    .bind(debt.due_day.map(i64::from))
    .bind(debt.active)
    .bind(id.0)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("debt account", id));
    }
    Ok(id)
}

pub async fn get_debt_accounts(pool: &DbPool) -> Result<Vec<DebtAccount>, StorageError> {
    let rows = sqlx::query_as::<_, DebtRow>(
        "SELECT id, name, balance, apr, min_payment, due_day, active FROM debt_accounts ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(debt_from_row).collect()
}
