use serde::{Deserialize, Serialize};

use super::debt::DebtAccount;
use super::occurrence::Occurrence;
use super::schedule::Schedule;

/// Full calendar snapshot, exported and restored as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    #[serde(default)]
    pub debt_accounts: Vec<DebtAccount>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

impl BackupPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.debt_accounts.is_empty() && self.schedules.is_empty() && self.occurrences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::recurrence::generate_occurrences;
    use crate::schedule::{EntryType, Frequency, ScheduleId};
    use chrono::NaiveDate;

    #[test]
    fn json_round_trip_preserves_everything() {
        let mut schedule = Schedule::new(
            "Phone",
            EntryType::Debt,
            Money::from_cents(4_500),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            Frequency::Monthly,
        );
        schedule.id = Some(ScheduleId(3));
        let payload = BackupPayload {
            debt_accounts: vec![DebtAccount::new("Visa", Money::from_cents(120_000))],
            occurrences: generate_occurrences(&schedule, 2, None),
            schedules: vec![schedule],
        };

        let json = payload.to_json().unwrap();
        let restored = BackupPayload::from_json(&json).unwrap();
        assert_eq!(restored, payload);
        assert_eq!(restored.occurrences.len(), 3);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let restored = BackupPayload::from_json("{}").unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(BackupPayload::from_json("[1, 2").is_err());
    }
}
