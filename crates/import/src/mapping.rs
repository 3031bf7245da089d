use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::source::SourceKind;

const DATE_CANDIDATES: &[&str] = &["date", "transaction date", "posting date", "value date"];
const DESCRIPTION_CANDIDATES: &[&str] = &["description", "details", "narrative", "merchant", "reference"];
const AMOUNT_CANDIDATES: &[&str] = &["amount", "amt", "value"];
const DEBIT_CANDIDATES: &[&str] = &["debit", "withdrawal", "debits"];
const CREDIT_CANDIDATES: &[&str] = &["credit", "deposit", "credits"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingField {
    Date,
    Description,
    Amount,
    Debit,
    Credit,
}

impl MappingField {
    pub const ALL: [MappingField; 5] = [
        MappingField::Date,
        MappingField::Description,
        MappingField::Amount,
        MappingField::Debit,
        MappingField::Credit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MappingField::Date => "date",
            MappingField::Description => "description",
            MappingField::Amount => "amount",
            MappingField::Debit => "debit",
            MappingField::Credit => "credit",
        }
    }

    /// Lowercase terms searched for inside header names, in priority order.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            MappingField::Date => DATE_CANDIDATES,
            MappingField::Description => DESCRIPTION_CANDIDATES,
            MappingField::Amount => AMOUNT_CANDIDATES,
            MappingField::Debit => DEBIT_CANDIDATES,
            MappingField::Credit => CREDIT_CANDIDATES,
        }
    }
}

impl fmt::Display for MappingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        MappingField::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("Unknown mapping field: '{s}'"))
    }
}

/// Logical field → source header name. An empty string means unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub debit: String,
    #[serde(default)]
    pub credit: String,
}

impl ColumnMapping {
    pub fn get(&self, field: MappingField) -> &str {
        match field {
            MappingField::Date => &self.date,
            MappingField::Description => &self.description,
            MappingField::Amount => &self.amount,
            MappingField::Debit => &self.debit,
            MappingField::Credit => &self.credit,
        }
    }

    pub fn set(&mut self, field: MappingField, header: &str) {
        let slot = match field {
            MappingField::Date => &mut self.date,
            MappingField::Description => &mut self.description,
            MappingField::Amount => &mut self.amount,
            MappingField::Debit => &mut self.debit,
            MappingField::Credit => &mut self.credit,
        };
        *slot = header.trim().to_string();
    }

    pub fn has_unified_amount(&self) -> bool {
        !self.amount.is_empty()
    }

    /// Enough to normalize: a date, a description, and either a signed
    /// amount column or a debit/credit pair.
    pub fn is_complete(&self) -> bool {
        !self.date.is_empty()
            && !self.description.is_empty()
            && (!self.amount.is_empty() || (!self.debit.is_empty() && !self.credit.is_empty()))
    }

    pub fn missing_fields(&self) -> Vec<MappingField> {
        let mut missing = Vec::new();
        if self.date.is_empty() {
            missing.push(MappingField::Date);
        }
        if self.description.is_empty() {
            missing.push(MappingField::Description);
        }
        if self.amount.is_empty() && (self.debit.is_empty() || self.credit.is_empty()) {
            missing.push(MappingField::Amount);
            if self.debit.is_empty() {
                missing.push(MappingField::Debit);
            }
            if self.credit.is_empty() {
                missing.push(MappingField::Credit);
            }
        }
        missing
    }
}

/// Per-field overrides stored for a header layout. Absent keys keep the
/// heuristic guess.
#[derive(Debug, Clone, Default, Deserialize)]
struct MappingOverrides {
    date: Option<String>,
    description: Option<String>,
    amount: Option<String>,
    debit: Option<String>,
    credit: Option<String>,
}

impl MappingOverrides {
    fn apply(self, mapping: &mut ColumnMapping) {
        let pairs = [
            (MappingField::Date, self.date),
            (MappingField::Description, self.description),
            (MappingField::Amount, self.amount),
            (MappingField::Debit, self.debit),
            (MappingField::Credit, self.credit),
        ];
        for (field, value) in pairs {
            if let Some(value) = value {
                mapping.set(field, &value);
            }
        }
    }
}

/// A confirmed mapping remembered for one (source, header layout) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMapping {
    pub id: Option<i64>,
    pub source: SourceKind,
    pub headers_signature: String,
    pub mapping_json: String,
}

impl SavedMapping {
    pub fn new(
        source: SourceKind,
        headers: &[String],
        mapping: &ColumnMapping,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: None,
            source,
            headers_signature: header_signature(headers),
            mapping_json: serde_json::to_string(mapping)?,
        })
    }
}

/// Stable hash of a header row: SHA-256 hex over the trimmed, lowercased
/// headers joined with `|`.
pub fn header_signature(headers: &[String]) -> String {
    let joined = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    let digest = Sha256::digest(joined.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn find_saved<'a>(
    saved: &'a [SavedMapping],
    source: SourceKind,
    signature: &str,
) -> Option<&'a SavedMapping> {
    saved
        .iter()
        .find(|m| m.source == source && m.headers_signature == signature)
}

/// Guesses which header feeds each logical field, then lets a saved mapping
/// for the same layout override the guesses field by field. Returned
/// header names keep the file's original spelling.
pub fn detect_mapping(headers: &[String], saved: Option<&SavedMapping>) -> ColumnMapping {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let find = |field: MappingField| -> String {
        lowered
            .iter()
            .position(|h| field.candidates().iter().any(|c| h.contains(c)))
            .map(|idx| headers[idx].trim().to_string())
            .unwrap_or_default()
    };

    let mut mapping = ColumnMapping {
        date: find(MappingField::Date),
        description: find(MappingField::Description),
        amount: find(MappingField::Amount),
        debit: find(MappingField::Debit),
        credit: find(MappingField::Credit),
    };

    if let Some(saved) = saved {
        match serde_json::from_str::<MappingOverrides>(&saved.mapping_json) {
            Ok(overrides) => overrides.apply(&mut mapping),
            Err(err) => tracing::warn!(
                "Ignoring unreadable saved mapping for {}: {err}",
                saved.source
            ),
        }
    }

    tracing::debug!(?mapping, complete = mapping.is_complete(), "detected column mapping");
    mapping
}
