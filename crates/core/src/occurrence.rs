use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::money::Money;
use super::schedule::ScheduleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccurrenceId(pub i64);

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    #[default]
    Scheduled,
    Paid,
    Partial,
    Skipped,
    Missed,
}

impl OccurrenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OccurrenceStatus::Scheduled => "scheduled",
            OccurrenceStatus::Paid => "paid",
            OccurrenceStatus::Partial => "partial",
            OccurrenceStatus::Skipped => "skipped",
            OccurrenceStatus::Missed => "missed",
        }
    }

    /// Paid and skipped occurrences need no further action.
    pub fn is_settled(self) -> bool {
        matches!(self, OccurrenceStatus::Paid | OccurrenceStatus::Skipped)
    }
}

impl fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccurrenceStatus {
    type Err = OccurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Ok(OccurrenceStatus::Scheduled),
            "paid" => Ok(OccurrenceStatus::Paid),
            "partial" => Ok(OccurrenceStatus::Partial),
            "skipped" => Ok(OccurrenceStatus::Skipped),
            "missed" => Ok(OccurrenceStatus::Missed),
            other => Err(OccurrenceError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OccurrenceError {
    #[error("Unknown occurrence status: '{0}'")]
    UnknownStatus(String),
    #[error("Payment amount must be positive, got {0}")]
    NonPositivePayment(Money),
    #[error("Moving {date} by {days} days leaves the calendar")]
    DateOutOfRange { date: NaiveDate, days: i64 },
}

/// One dated instance of a schedule. The schedule link never changes;
/// everything else is tracked independently of the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Option<OccurrenceId>,
    pub schedule_id: Option<ScheduleId>,
    pub date: NaiveDate,
    pub planned_amount: Money,
    pub status: OccurrenceStatus,
    pub paid_amount: Option<Money>,
    pub paid_date: Option<NaiveDate>,
}

impl Occurrence {
    pub fn scheduled(schedule_id: Option<ScheduleId>, date: NaiveDate, planned_amount: Money) -> Self {
        Occurrence {
            id: None,
            schedule_id,
            date,
            planned_amount,
            status: OccurrenceStatus::Scheduled,
            paid_amount: None,
            paid_date: None,
        }
    }

    /// Records a payment. Anything short of the planned amount is `partial`.
    pub fn mark_paid(&mut self, amount: Money, paid_on: NaiveDate) -> Result<(), OccurrenceError> {
        if !amount.is_positive() {
            return Err(OccurrenceError::NonPositivePayment(amount));
        }
        self.status = if amount < self.planned_amount {
            OccurrenceStatus::Partial
        } else {
            OccurrenceStatus::Paid
        };
        self.paid_amount = Some(amount);
        self.paid_date = Some(paid_on);
        Ok(())
    }

    pub fn mark_paid_in_full(&mut self, paid_on: NaiveDate) {
        self.status = OccurrenceStatus::Paid;
        self.paid_amount = Some(self.planned_amount);
        self.paid_date = Some(paid_on);
    }

    pub fn skip(&mut self) {
        self.status = OccurrenceStatus::Skipped;
    }

    /// Moves the occurrence and puts it back into the `scheduled` state.
    pub fn reschedule(&mut self, date: NaiveDate) {
        self.date = date;
        self.status = OccurrenceStatus::Scheduled;
        self.paid_amount = None;
        self.paid_date = None;
    }

    pub fn snooze(&mut self, days: i64) -> Result<(), OccurrenceError> {
        let date = Duration::try_days(days)
            .and_then(|d| self.date.checked_add_signed(d))
            .ok_or(OccurrenceError::DateOutOfRange { date: self.date, days })?;
        self.reschedule(date);
        Ok(())
    }

    pub fn is_missed(&self, today: NaiveDate) -> bool {
        self.status == OccurrenceStatus::Scheduled && self.date < today
    }

    pub fn outstanding(&self) -> Money {
        if self.status.is_settled() {
            return Money::zero();
        }
        self.planned_amount - self.paid_amount.unwrap_or_default()
    }
}

/// Flags every overdue scheduled occurrence as missed. Returns how many changed.
pub fn refresh_missed(occurrences: &mut [Occurrence], today: NaiveDate) -> usize {
    let mut changed = 0;
    for occ in occurrences.iter_mut().filter(|o| o.is_missed(today)) {
        occ.status = OccurrenceStatus::Missed;
        changed += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn occ(d: NaiveDate) -> Occurrence {
        Occurrence::scheduled(Some(ScheduleId(1)), d, Money::from_cents(10_000))
    }

    #[test]
    fn full_payment_marks_paid() {
        let mut o = occ(date(2024, 1, 1));
        o.mark_paid(Money::from_cents(10_000), date(2024, 1, 2)).unwrap();
        assert_eq!(o.status, OccurrenceStatus::Paid);
        assert_eq!(o.paid_date, Some(date(2024, 1, 2)));
        assert!(o.outstanding().is_zero());
    }

    #[test]
    fn short_payment_marks_partial() {
        let mut o = occ(date(2024, 1, 1));
        o.mark_paid(Money::from_cents(4_000), date(2024, 1, 1)).unwrap();
        assert_eq!(o.status, OccurrenceStatus::Partial);
        assert_eq!(o.outstanding().to_cents(), 6_000);
    }

    #[test]
    fn zero_payment_is_rejected() {
        let mut o = occ(date(2024, 1, 1));
        assert!(o.mark_paid(Money::zero(), date(2024, 1, 1)).is_err());
        assert_eq!(o.status, OccurrenceStatus::Scheduled);
    }

    #[test]
    fn reschedule_resets_payment_state() {
        let mut o = occ(date(2024, 1, 1));
        o.mark_paid_in_full(date(2024, 1, 1));
        o.reschedule(date(2024, 1, 10));
        assert_eq!(o.status, OccurrenceStatus::Scheduled);
        assert_eq!(o.date, date(2024, 1, 10));
        assert_eq!(o.paid_amount, None);
        assert_eq!(o.schedule_id, Some(ScheduleId(1)));
    }

    #[test]
    fn snooze_moves_forward() {
        let mut o = occ(date(2024, 1, 30));
        o.snooze(3).unwrap();
        assert_eq!(o.date, date(2024, 2, 2));
    }

    #[test]
    fn snooze_past_calendar_end_is_rejected() {
        let mut o = occ(date(2024, 1, 30));
        assert!(matches!(o.snooze(100_000_000), Err(OccurrenceError::DateOutOfRange { .. })));
        assert!(o.snooze(i64::MAX).is_err());
        assert_eq!(o.date, date(2024, 1, 30));
    }

    #[test]
    fn missed_only_applies_to_past_scheduled() {
        let today = date(2024, 2, 1);
        assert!(occ(date(2024, 1, 31)).is_missed(today));
        assert!(!occ(date(2024, 2, 1)).is_missed(today));

        let mut paid = occ(date(2024, 1, 1));
        paid.mark_paid_in_full(date(2024, 1, 1));
        assert!(!paid.is_missed(today));
    }

    #[test]
    fn refresh_missed_counts_changes() {
        let today = date(2024, 3, 1);
        let mut list = vec![occ(date(2024, 1, 1)), occ(date(2024, 2, 1)), occ(date(2024, 3, 1))];
        list[1].skip();
        assert_eq!(refresh_missed(&mut list, today), 1);
        assert_eq!(list[0].status, OccurrenceStatus::Missed);
        assert_eq!(list[1].status, OccurrenceStatus::Skipped);
        assert_eq!(list[2].status, OccurrenceStatus::Scheduled);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["scheduled", "paid", "partial", "skipped", "missed"] {
            assert_eq!(s.parse::<OccurrenceStatus>().unwrap().as_str(), s);
        }
        assert!("late".parse::<OccurrenceStatus>().is_err());
    }
}
