pub mod backup;
pub mod calendar;
pub mod debt;
pub mod money;
pub mod occurrence;
pub mod recurrence;
pub mod schedule;

pub use backup::BackupPayload;
pub use calendar::{add_months_clamped, format_iso_date, parse_iso_date, DateRange};
pub use debt::{
    project_payoff, sort_debts, DebtAccount, DebtAccountId, PayoffProjection, PayoffRecommendation,
    PayoffStrategy,
};
pub use money::Money;
pub use occurrence::{refresh_missed, Occurrence, OccurrenceError, OccurrenceId, OccurrenceStatus};
pub use recurrence::{generate_occurrences, generate_occurrences_from_str, ScheduleDates, DEFAULT_HORIZON_MONTHS};
pub use schedule::{EntryType, Frequency, Schedule, ScheduleError, ScheduleId};
