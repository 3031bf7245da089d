use billcal_core::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::normalize::{dedupe_key, Transaction, DEFAULT_PROFILE, UNCATEGORISED};
use crate::source::SourceKind;

/// One committed statement file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: Uuid,
    pub source: SourceKind,
    pub file_name: String,
    pub imported_at: DateTime<Utc>,
    pub row_count: usize,
}

/// Collapses transactions sharing a dedupe key. Each key keeps the position
/// of its first occurrence and the contents of its last.
pub fn dedupe_transactions(transactions: Vec<Transaction>) -> Vec<Transaction> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Transaction> = Vec::with_capacity(transactions.len());
    for tx in transactions {
        match index.get(&tx.dedupe_key) {
            Some(&pos) => unique[pos] = tx,
            None => {
                index.insert(tx.dedupe_key.clone(), unique.len());
                unique.push(tx);
            }
        }
    }
    unique
}

/// A deduplicated batch ready to be written in one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCommit {
    pub batch: ImportBatch,
    pub transactions: Vec<Transaction>,
    /// Sum of outflows, negative or zero.
    pub total_debits: Money,
    /// Sum of inflows, positive or zero.
    pub total_credits: Money,
}

impl BatchCommit {
    pub fn prepare(source: SourceKind, file_name: &str, transactions: Vec<Transaction>) -> Self {
        Self::prepare_at(source, file_name, transactions, Utc::now())
    }

    pub fn prepare_at(
        source: SourceKind,
        file_name: &str,
        transactions: Vec<Transaction>,
        imported_at: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let incoming = transactions.len();

        // Keys embed the source, so rebase them before collapsing duplicates.
        let rebased = transactions.into_iter().map(|mut tx| {
            if tx.source != source {
                tx.source = source;
                tx.dedupe_key = dedupe_key(tx.date, tx.signed_amount, &tx.description, source);
            }
            tx
        });

        let transactions: Vec<Transaction> = dedupe_transactions(rebased.collect())
            .into_iter()
            .map(|mut tx| {
                tx.import_batch_id = Some(id);
                if tx.category.trim().is_empty() {
                    tx.category = UNCATEGORISED.to_string();
                }
                if tx.profile.trim().is_empty() {
                    tx.profile = DEFAULT_PROFILE.to_string();
                }
                tx
            })
            .collect();

        let total_debits = transactions
            .iter()
            .filter(|t| t.is_debit())
            .fold(Money::zero(), |acc, t| acc.saturating_add(t.signed_amount));
        let total_credits = transactions
            .iter()
            .filter(|t| !t.is_debit())
            .fold(Money::zero(), |acc, t| acc.saturating_add(t.signed_amount));

        if transactions.len() < incoming {
            tracing::debug!(
                dropped = incoming - transactions.len(),
                "collapsed duplicate statement rows"
            );
        }

        Self {
            batch: ImportBatch {
                id,
                source,
                file_name: file_name.to_string(),
                imported_at,
                row_count: transactions.len(),
            },
            transactions,
            total_debits,
            total_credits,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Saved {} rows. Debits {}, Credits {}.",
            self.batch.row_count, self.total_debits, self.total_credits
        )
    }
}
