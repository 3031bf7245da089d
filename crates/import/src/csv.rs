use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::normalize::Transaction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    pub delimiter: u8,
    /// Honour `"..."` quoting. Off by default: bank exports are split on
    /// the delimiter as-is.
    pub quoting: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quoting: false,
        }
    }
}

/// One data line keyed by header name. Values are trimmed; cells missing
/// from a short line are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawImportRow {
    /// 1-based position among the data lines.
    pub line: usize,
    pub fields: HashMap<String, String>,
}

impl RawImportRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawImportRow>,
}

impl ParsedCsv {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("CSV output is not UTF-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

/// Splits raw statement text into headers and rows. Blank lines are
/// dropped, the first remaining line is the header row. Never fails: an
/// unreadable line is logged and skipped.
pub fn parse_delimited(text: &str, options: &ParseOptions) -> ParsedCsv {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(options.quoting)
        .delimiter(options.delimiter)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("Skipping unreadable line {}: {err}", index + 1);
                continue;
            }
        };

        if record.iter().all(str::is_empty) && record.len() <= 1 {
            continue;
        }

        if headers.is_none() {
            headers = Some(record.iter().map(str::to_string).collect());
            continue;
        }

        let fields = headers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), record.get(idx).unwrap_or_default().to_string()))
            .collect();
        rows.push(RawImportRow {
            line: rows.len() + 1,
            fields,
        });
    }

    ParsedCsv {
        headers: headers.unwrap_or_default(),
        rows,
    }
}

/// Writes normalized transactions back out as `Date,Description,Amount`.
pub fn write_transactions(transactions: &[Transaction]) -> Result<String, CsvError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Description", "Amount"])?;
    for tx in transactions {
        writer.write_record([
            tx.date_iso(),
            tx.description.clone(),
            tx.signed_amount.to_plain_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::IoError(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}
