pub mod backup;
pub mod db;
pub mod debts;
pub mod error;
pub mod imports;
pub mod schedules;

pub use backup::{export_backup, import_backup};
pub use db::{create_db, create_memory_db, get_setting, set_setting, DbPool};
pub use debts::{get_debt_accounts, save_debt_account};
pub use error::StorageError;
pub use imports::{
    commit_import_batch, delete_category_rule, get_batch_transactions, get_category_rules,
    get_csv_mappings, get_import_batches, save_category_rule, save_csv_mapping,
};
pub use schedules::{
    delete_schedule, get_all_occurrences, get_occurrence, get_occurrences_between,
    get_occurrences_for_schedule, get_schedule, get_schedules, insert_schedule, mark_missed_before,
    regenerate_from, update_occurrence, update_schedule,
};
