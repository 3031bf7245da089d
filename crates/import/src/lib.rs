pub mod batch;
pub mod csv;
pub mod mapping;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod source;

pub use batch::{dedupe_transactions, BatchCommit, ImportBatch};
pub use csv::{parse_delimited, write_transactions, CsvError, ParseOptions, ParsedCsv, RawImportRow};
pub use mapping::{detect_mapping, find_saved, header_signature, ColumnMapping, MappingField, SavedMapping};
pub use normalize::{
    dedupe_key, normalize_rows, parse_amount_cell, parse_date_cell, Direction, RowIssue, Transaction,
    DEFAULT_PROFILE, UNCATEGORISED,
};
pub use pipeline::{ImportPipeline, ImportPreview, DEFAULT_PREVIEW_ROWS};
pub use rules::{
    learn_rule, parse_rules_toml, CategoryRule, CategoryRuleEngine, Classification, MatchType, RuleError,
    UBER_PROFILE, ZIP_CATEGORY,
};
pub use source::SourceKind;
