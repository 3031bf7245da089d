use billcal_core::ScheduleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unreadable value '{value}' in column {column}")]
    Decode { column: &'static str, value: String },
    #[error("No {what} with id {id}")]
    NotFound { what: &'static str, id: String },
}

impl StorageError {
    pub(crate) fn decode(column: &'static str, value: &str) -> Self {
        StorageError::Decode {
            column,
            value: value.to_string(),
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}
