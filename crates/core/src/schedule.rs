use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::debt::DebtAccountId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub i64);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the schedule is money going out or coming in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debt,
    Credit,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Debt => "debt",
            EntryType::Credit => "credit",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debt" => Ok(EntryType::Debt),
            "credit" => Ok(EntryType::Credit),
            other => Err(ScheduleError::UnknownEntryType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    None,
    Weekly,
    Fortnightly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::None => "none",
            Frequency::Weekly => "weekly",
            Frequency::Fortnightly => "fortnightly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Frequency::None
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "once" => Ok(Frequency::None),
            "weekly" => Ok(Frequency::Weekly),
            "fortnightly" => Ok(Frequency::Fortnightly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" | "annually" => Ok(Frequency::Yearly),
            other => Err(ScheduleError::UnknownFrequency(other.to_string())),
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// A recurring commitment; the template occurrences are generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Option<ScheduleId>,
    pub name: String,
    pub entry_type: EntryType,
    pub category: String,
    pub amount: Money,
    pub start_date: NaiveDate,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    pub end_date: Option<NaiveDate>,
    pub linked_debt_account_id: Option<DebtAccountId>,
    #[serde(default)]
    pub notes: String,
}

impl Schedule {
    pub fn new(
        name: &str,
        entry_type: EntryType,
        amount: Money,
        start_date: NaiveDate,
        frequency: Frequency,
    ) -> Self {
        Schedule {
            id: None,
            name: name.to_string(),
            entry_type,
            category: String::new(),
            amount,
            start_date,
            frequency,
            interval: 1,
            end_date: None,
            linked_debt_account_id: None,
            notes: String::new(),
        }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Checks the invariants callers must uphold before generating
    /// occurrences. The recurrence engine itself never fails.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::EmptyName);
        }
        if !self.amount.is_positive() {
            return Err(ScheduleError::NonPositiveAmount(self.amount));
        }
        if self.frequency.is_recurring() && self.interval == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ScheduleError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("Schedule name must not be empty")]
    EmptyName,
    #[error("Schedule amount must be positive, got {0}")]
    NonPositiveAmount(Money),
    #[error("Recurring schedules need an interval of at least 1")]
    ZeroInterval,
    #[error("End date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("Unknown frequency: '{0}'")]
    UnknownFrequency(String),
    #[error("Unknown entry type: '{0}'")]
    UnknownEntryType(String),
}
