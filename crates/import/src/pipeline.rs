use serde::Serialize;

use crate::batch::BatchCommit;
use crate::csv::{parse_delimited, ParseOptions, ParsedCsv};
use crate::mapping::{detect_mapping, find_saved, header_signature, ColumnMapping, MappingField, SavedMapping};
use crate::normalize::{normalize_rows, Transaction};
use crate::rules::{CategoryRule, CategoryRuleEngine};
use crate::source::SourceKind;

pub const DEFAULT_PREVIEW_ROWS: usize = 50;

/// Composes the four stages over one statement file. Holds no state
/// between calls; `reparse` can run any number of times.
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    pub options: ParseOptions,
    pub preview_rows: usize,
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self {
            options: ParseOptions::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub source: SourceKind,
    pub parsed: ParsedCsv,
    pub signature: String,
    pub mapping: ColumnMapping,
    pub used_saved_mapping: bool,
    /// Set when the mapping cannot drive normalization. No transactions
    /// are produced until the caller supplies a corrected mapping.
    pub needs_mapping: bool,
    pub missing: Vec<MappingField>,
    pub transactions: Vec<Transaction>,
    pub preview_rows: usize,
}

impl ImportPreview {
    pub fn headers(&self) -> &[String] {
        &self.parsed.headers
    }

    /// The first `preview_rows` transactions.
    pub fn visible(&self) -> &[Transaction] {
        let end = self.transactions.len().min(self.preview_rows);
        &self.transactions[..end]
    }

    pub fn degraded_rows(&self) -> usize {
        self.transactions.iter().filter(|t| !t.is_clean()).count()
    }

    /// Mapping to remember for this source and header layout.
    pub fn saved_mapping(&self) -> Result<SavedMapping, serde_json::Error> {
        SavedMapping::new(self.source, &self.parsed.headers, &self.mapping)
    }

    /// Hand correction of one row (0-based). The row no longer counts as
    /// rule-matched. `None` when there is no such row.
    pub fn correct_row(&mut self, index: usize, category: &str, profile: Option<&str>) -> Option<&Transaction> {
        let tx = self.transactions.get_mut(index)?;
        tx.category = category.trim().to_string();
        if let Some(profile) = profile {
            tx.profile = profile.trim().to_string();
        }
        tx.confidence = 1.0;
        tx.matched_rule = None;
        Some(&*tx)
    }

    pub fn into_commit(self, file_name: &str) -> BatchCommit {
        BatchCommit::prepare(self.source, file_name, self.transactions)
    }
}

impl ImportPipeline {
    pub fn new(options: ParseOptions, preview_rows: usize) -> Self {
        Self { options, preview_rows }
    }

    /// Parses, infers a mapping (preferring a saved one for this layout),
    /// then normalizes and classifies if the mapping is complete.
    pub fn preview(
        &self,
        text: &str,
        source: SourceKind,
        rules: &[CategoryRule],
        saved: &[SavedMapping],
    ) -> ImportPreview {
        let parsed = parse_delimited(text, &self.options);
        let signature = header_signature(&parsed.headers);
        let remembered = find_saved(saved, source, &signature);
        let mapping = detect_mapping(&parsed.headers, remembered);
        tracing::debug!(
            %source,
            rows = parsed.rows.len(),
            saved = remembered.is_some(),
            "parsed statement"
        );
        self.build(parsed, signature, mapping, remembered.is_some(), source, rules)
    }

    /// Re-runs normalization and classification with a corrected mapping.
    pub fn reparse(
        &self,
        previous: ImportPreview,
        mapping: ColumnMapping,
        rules: &[CategoryRule],
    ) -> ImportPreview {
        let ImportPreview {
            source,
            parsed,
            signature,
            ..
        } = previous;
        self.build(parsed, signature, mapping, false, source, rules)
    }

    fn build(
        &self,
        parsed: ParsedCsv,
        signature: String,
        mapping: ColumnMapping,
        used_saved_mapping: bool,
        source: SourceKind,
        rules: &[CategoryRule],
    ) -> ImportPreview {
        let missing = mapping.missing_fields();
        let needs_mapping = !mapping.is_complete();

        let transactions = if needs_mapping {
            tracing::info!(?missing, "column mapping incomplete");
            Vec::new()
        } else {
            let mut txs = normalize_rows(&parsed.rows, &mapping, source);
            CategoryRuleEngine::new(rules.to_vec()).apply_rules(&mut txs);
            txs
        };

        ImportPreview {
            source,
            parsed,
            signature,
            mapping,
            used_saved_mapping,
            needs_mapping,
            missing,
            transactions,
            preview_rows: self.preview_rows,
        }
    }
}
