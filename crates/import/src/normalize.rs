use billcal_core::{format_iso_date, Money};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::csv::RawImportRow;
use crate::mapping::ColumnMapping;
use crate::source::SourceKind;

pub const UNCATEGORISED: &str = "uncategorised";
pub const DEFAULT_PROFILE: &str = "personal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Zero counts as a credit.
    pub fn of(amount: Money) -> Self {
        if amount.is_negative() {
            Direction::Debit
        } else {
            Direction::Credit
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

/// A cell that could not be read and was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowIssue {
    UnparseableDate { value: String },
    UnparseableAmount { column: String, value: String },
}

/// A normalized bank movement. Positive amounts are inflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub description: String,
    pub signed_amount: Money,
    pub direction: Direction,
    pub source: SourceKind,
    pub category: String,
    pub profile: String,
    pub confidence: f32,
    pub matched_rule: Option<String>,
    pub dedupe_key: String,
    pub import_batch_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<RowIssue>,
}

impl Transaction {
    pub fn new(date: Option<NaiveDate>, description: &str, signed_amount: Money, source: SourceKind) -> Self {
        Transaction {
            id: None,
            date,
            description: description.to_string(),
            signed_amount,
            direction: Direction::of(signed_amount),
            source,
            category: UNCATEGORISED.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            confidence: 0.0,
            matched_rule: None,
            dedupe_key: dedupe_key(date, signed_amount, description, source),
            import_batch_id: None,
            issues: Vec::new(),
        }
    }

    /// `YYYY-MM-DD`, or an empty string when the date was unreadable.
    pub fn date_iso(&self) -> String {
        self.date.map(format_iso_date).unwrap_or_default()
    }

    pub fn is_debit(&self) -> bool {
        self.direction == Direction::Debit
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// `date|amount|description|source`
pub fn dedupe_key(date: Option<NaiveDate>, amount: Money, description: &str, source: SourceKind) -> String {
    format!(
        "{}|{}|{}|{}",
        date.map(format_iso_date).unwrap_or_default(),
        amount.to_plain_string(),
        description,
        source.key()
    )
}

fn iso_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("invalid regex"))
}

fn amount_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\p{Sc}|,|\s|\b(?:aud|usd|nzd)\b").expect("invalid regex"))
}

/// Reads a statement date. Year-first values are taken as-is; anything
/// else is day-month-year split on `/` or `-`, with two-digit years in
/// the 2000s. Returns `None` for anything that is not a real date.
pub fn parse_date_cell(value: &str) -> Option<NaiveDate> {
    let value = value.split_whitespace().next()?;

    if let Some(caps) = iso_prefix().captures(value) {
        let y = caps[1].parse().ok()?;
        let m = caps[2].parse().ok()?;
        let d = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    let sep = if value.contains('/') { '/' } else { '-' };
    let parts: Vec<&str> = value.split(sep).collect();
    let [d, m, y] = parts.as_slice() else {
        return None;
    };
    let year = match y.len() {
        2 => format!("20{y}"),
        4 => y.to_string(),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Reads a money cell. Currency symbols, codes and thousands separators
/// are ignored and `(12.00)` means `-12.00`. Blank cells are zero;
/// `None` means the cell held something that is not a number.
pub fn parse_amount_cell(value: &str) -> Option<Money> {
    let s = value.trim();
    if s.is_empty() {
        return Some(Money::zero());
    }

    let (negative, inner) = match s.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned = amount_noise().replace_all(inner, "");
    let cleaned = cleaned.strip_prefix('+').unwrap_or(cleaned.as_ref());
    let dec = Decimal::from_str(cleaned).ok()?;
    let money = Money::from_decimal(dec);
    Some(if negative { -money.abs() } else { money })
}

fn read_amount(row: &RawImportRow, column: &str, issues: &mut Vec<RowIssue>) -> Money {
    if column.is_empty() {
        return Money::zero();
    }
    let raw = row.get(column).unwrap_or_default();
    parse_amount_cell(raw).unwrap_or_else(|| {
        issues.push(RowIssue::UnparseableAmount {
            column: column.to_string(),
            value: raw.to_string(),
        });
        Money::zero()
    })
}

/// Turns raw rows into uncategorized transactions. A bad cell never fails
/// the batch: the date becomes `None` or the amount zero, and the row
/// carries a [`RowIssue`].
pub fn normalize_rows(rows: &[RawImportRow], mapping: &ColumnMapping, source: SourceKind) -> Vec<Transaction> {
    let transactions: Vec<Transaction> = rows
        .iter()
        .map(|row| normalize_row(row, mapping, source))
        .collect();

    let degraded = transactions.iter().filter(|t| !t.is_clean()).count();
    if degraded > 0 {
        tracing::warn!(degraded, total = transactions.len(), "rows normalized with unreadable cells");
    }
    transactions
}

fn normalize_row(row: &RawImportRow, mapping: &ColumnMapping, source: SourceKind) -> Transaction {
    let mut issues = Vec::new();

    let raw_date = row.get(&mapping.date).unwrap_or_default();
    let date = parse_date_cell(raw_date);
    if date.is_none() {
        issues.push(RowIssue::UnparseableDate {
            value: raw_date.to_string(),
        });
    }

    let description = row.get(&mapping.description).unwrap_or_default();

    let signed_amount = if mapping.has_unified_amount() {
        read_amount(row, &mapping.amount, &mut issues)
    } else {
        let credit = read_amount(row, &mapping.credit, &mut issues);
        let debit = read_amount(row, &mapping.debit, &mut issues);
        credit.checked_sub(debit).unwrap_or_else(|| {
            issues.push(RowIssue::UnparseableAmount {
                column: mapping.debit.clone(),
                value: row.get(&mapping.debit).unwrap_or_default().to_string(),
            });
            Money::zero()
        })
    };

    if !issues.is_empty() {
        tracing::debug!(line = row.line, ?issues, "degraded statement row");
    }

    let mut tx = Transaction::new(date, description, signed_amount, source);
    tx.issues = issues;
    tx
}
