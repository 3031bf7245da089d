//! Expansion of a [`Schedule`] into dated [`Occurrence`]s.
//!
//! Every date is computed from the schedule's start date (`start + n * step`)
//! rather than from the previous occurrence, so month-end clamping never
//! drifts: a schedule starting Jan 31 lands on Feb 29, Mar 31, Apr 30.

use chrono::{Days, NaiveDate};

use super::calendar::{add_months_clamped, DateRange};
use super::occurrence::Occurrence;
use super::schedule::{Frequency, Schedule};

pub const DEFAULT_HORIZON_MONTHS: u32 = 12;

/// Unbounded, strictly increasing sequence of dates implied by a schedule.
#[derive(Debug, Clone)]
pub struct ScheduleDates {
    start: NaiveDate,
    frequency: Frequency,
    interval: u64,
    index: u64,
    last: Option<NaiveDate>,
    done: bool,
}

impl ScheduleDates {
    pub fn new(schedule: &Schedule) -> Self {
        ScheduleDates {
            start: schedule.start_date,
            frequency: schedule.frequency,
            interval: u64::from(schedule.interval),
            index: 0,
            last: None,
            done: schedule.frequency.is_recurring() && schedule.interval == 0,
        }
    }

    fn nth_date(&self, n: u64) -> Option<NaiveDate> {
        let steps = n.checked_mul(self.interval)?;
        match self.frequency {
            Frequency::None => (n == 0).then_some(self.start),
            Frequency::Weekly => self.start.checked_add_days(Days::new(steps.checked_mul(7)?)),
            Frequency::Fortnightly => self.start.checked_add_days(Days::new(steps.checked_mul(14)?)),
            Frequency::Monthly => Some(add_months_clamped(self.start, u32::try_from(steps).ok()?)),
            Frequency::Yearly => {
                let months = steps.checked_mul(12)?;
                Some(add_months_clamped(self.start, u32::try_from(months).ok()?))
            }
        }
    }
}

impl Iterator for ScheduleDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.done {
            return None;
        }
        let next = self.nth_date(self.index);
        self.index += 1;
        match (next, self.last) {
            // Saturated at the calendar's upper limit.
            (Some(date), Some(last)) if date <= last => {
                self.done = true;
                None
            }
            (Some(date), _) => {
                self.last = Some(date);
                Some(date)
            }
            (None, _) => {
                self.done = true;
                None
            }
        }
    }
}

/// Generates the occurrences of `schedule` inside the horizon.
///
/// The horizon runs from `from` (or the start date) to `months_ahead`
/// calendar months later, both ends inclusive, and is further cut by the
/// schedule's end date. With `from` set, dates before it are dropped but
/// the step alignment stays anchored to the start date.
///
/// Input the caller should have rejected (non-positive amount, zero
/// interval) yields an empty list.
pub fn generate_occurrences(
    schedule: &Schedule,
    months_ahead: u32,
    from: Option<NaiveDate>,
) -> Vec<Occurrence> {
    if !schedule.amount.is_positive() {
        return Vec::new();
    }

    let horizon = DateRange::months_from(from.unwrap_or(schedule.start_date), months_ahead);
    let in_range = |date: NaiveDate| {
        date <= horizon.end && schedule.end_date.map_or(true, |end| date <= end)
    };

    ScheduleDates::new(schedule)
        .take_while(|date| in_range(*date))
        .filter(|date| from.map_or(true, |from| *date >= from))
        .map(|date| Occurrence::scheduled(schedule.id, date, schedule.amount))
        .collect()
}

/// [`generate_occurrences`] with a resume date given as `YYYY-MM-DD`.
/// An unparseable resume date produces no occurrences.
pub fn generate_occurrences_from_str(
    schedule: &Schedule,
    months_ahead: u32,
    from: Option<&str>,
) -> Vec<Occurrence> {
    match from {
        Some(raw) => match super::calendar::parse_iso_date(raw) {
            Some(date) => generate_occurrences(schedule, months_ahead, Some(date)),
            None => Vec::new(),
        },
        None => generate_occurrences(schedule, months_ahead, None),
    }
}
