use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::{Transaction, DEFAULT_PROFILE, UNCATEGORISED};

pub const UBER_PROFILE: &str = "uber";
pub const ZIP_CATEGORY: &str = "zip_payments_or_purchases";

const HIGH_PRIORITY: i32 = 90;
const HIGH_CONFIDENCE: f32 = 0.9;
const RULE_CONFIDENCE: f32 = 0.75;
const FALLBACK_CONFIDENCE: f32 = 0.2;
const LEARNED_PRIORITY: i32 = 100;
const LEARNED_PATTERN_CHARS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    #[serde(default)]
    pub id: Option<i64>,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub category: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CategoryRule {
    pub fn new(pattern: &str, match_type: MatchType, category: &str, priority: i32) -> Self {
        Self {
            id: None,
            pattern: pattern.to_string(),
            match_type,
            category: category.to_string(),
            profile: None,
            priority,
            enabled: true,
        }
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }

    /// How a transaction records which rule classified it.
    pub fn reference(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => self.pattern.clone(),
        }
    }

    /// Case-insensitive test against a description.
    pub fn matches(&self, description: &str) -> bool {
        let text = description.to_lowercase();
        let pattern = self.pattern.to_lowercase();
        match self.match_type {
            MatchType::Contains => text.contains(&pattern),
            MatchType::StartsWith => text.starts_with(&pattern),
            MatchType::Equals => text == pattern,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
    Equals,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Contains => "contains",
            MatchType::StartsWith => "startsWith",
            MatchType::Equals => "equals",
        }
    }
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "contains" => Ok(MatchType::Contains),
            "startswith" => Ok(MatchType::StartsWith),
            "equals" | "exact" => Ok(MatchType::Equals),
            _ => Err(format!("Unknown match type: '{s}'")),
        }
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to parse rules TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Rule {index} has an empty pattern")]
    EmptyPattern { index: usize },
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<CategoryRule>,
}

/// Outcome of classifying one description.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub profile: String,
    pub confidence: f32,
    pub matched_rule: Option<String>,
}

/// Enabled rules in evaluation order: priority descending, ties in the
/// order they were given.
pub struct CategoryRuleEngine {
    rules: Vec<CategoryRule>,
}

impl CategoryRuleEngine {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut rules: Vec<CategoryRule> = rules.into_iter().filter(|r| r.enabled).collect();
        // sort_by is stable.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Reads `[[rules]]` tables.
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        Ok(Self::new(parse_rules_toml(toml_content)?))
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn find_matching_rule(&self, description: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.matches(description))
    }

    /// Classifies a description. `current` is kept when no rule matches.
    pub fn classify(&self, description: &str, current: Option<(&str, &str)>) -> Classification {
        let (current_category, current_profile) = current.unwrap_or((UNCATEGORISED, DEFAULT_PROFILE));

        let mut result = match self.find_matching_rule(description) {
            Some(rule) => Classification {
                category: rule.category.clone(),
                profile: rule
                    .profile
                    .clone()
                    .unwrap_or_else(|| current_profile.to_string()),
                confidence: if rule.priority >= HIGH_PRIORITY {
                    HIGH_CONFIDENCE
                } else {
                    RULE_CONFIDENCE
                },
                matched_rule: Some(rule.reference()),
            },
            None => Classification {
                category: current_category.to_string(),
                profile: current_profile.to_string(),
                confidence: FALLBACK_CONFIDENCE,
                matched_rule: None,
            },
        };

        let lowered = description.to_lowercase();
        if lowered.contains("uber") {
            result.profile = UBER_PROFILE.to_string();
            result.confidence = result.confidence.max(RULE_CONFIDENCE);
        }
        if lowered.contains("zip") {
            result.category = ZIP_CATEGORY.to_string();
            result.confidence = result.confidence.max(RULE_CONFIDENCE);
        }
        result
    }

    /// Classifies every transaction in place.
    pub fn apply_rules(&self, transactions: &mut [Transaction]) {
        let mut matched = 0usize;
        for tx in transactions.iter_mut() {
            let current = non_empty(&tx.category, UNCATEGORISED);
            let profile = non_empty(&tx.profile, DEFAULT_PROFILE);
            let c = self.classify(&tx.description, Some((current.as_str(), profile.as_str())));
            if c.matched_rule.is_some() {
                matched += 1;
            }
            tx.category = c.category;
            tx.profile = c.profile;
            tx.confidence = c.confidence;
            tx.matched_rule = c.matched_rule;
        }
        tracing::debug!(matched, total = transactions.len(), "applied category rules");
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

pub fn parse_rules_toml(toml_content: &str) -> Result<Vec<CategoryRule>, RuleError> {
    let file: RuleFile = toml::from_str(toml_content)?;
    if let Some(index) = file.rules.iter().position(|r| r.pattern.trim().is_empty()) {
        return Err(RuleError::EmptyPattern { index });
    }
    Ok(file.rules)
}

/// Builds the rule behind "remember this categorization": a contains-rule
/// on the first 30 characters of the lowercased description at priority
/// 100. The caller appends it to its own rule collection.
pub fn learn_rule(description: &str, category: &str, profile: Option<&str>) -> CategoryRule {
    let pattern: String = description
        .trim()
        .to_lowercase()
        .chars()
        .take(LEARNED_PATTERN_CHARS)
        .collect();
    let category = if category.trim().is_empty() {
        UNCATEGORISED
    } else {
        category
    };
    CategoryRule {
        id: None,
        pattern,
        match_type: MatchType::Contains,
        category: category.to_string(),
        profile: Some(profile.unwrap_or(DEFAULT_PROFILE).to_string()),
        priority: LEARNED_PRIORITY,
        enabled: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use billcal_core::Money;

    fn tx(desc: &str) -> Transaction {
        Transaction::new(None, desc, Money::from_cents(-1000), SourceKind::CommBank)
    }

    // ── match modes ───────────────────────────────────────────────────────────

    #[test]
    fn contains_match_case_insensitive() {
        let rule = CategoryRule::new("Woolworths", MatchType::Contains, "groceries", 1);
        assert!(rule.matches("WOOLWORTHS 123 SYDNEY"));
        assert!(!rule.matches("COLES 55"));
    }

    #[test]
    fn starts_with_match() {
        let rule = CategoryRule::new("netflix", MatchType::StartsWith, "subscriptions", 1);
        assert!(rule.matches("NETFLIX.COM"));
        assert!(!rule.matches("PAYPAL *NETFLIX"));
    }

    #[test]
    fn equals_match() {
        let rule = CategoryRule::new("rent", MatchType::Equals, "housing", 1);
        assert!(rule.matches("RENT"));
        assert!(!rule.matches("RENT JANUARY"));
    }

    #[test]
    fn match_type_parses_and_serializes() {
        assert_eq!("startsWith".parse::<MatchType>().unwrap(), MatchType::StartsWith);
        assert_eq!("starts_with".parse::<MatchType>().unwrap(), MatchType::StartsWith);
        assert_eq!("EQUALS".parse::<MatchType>().unwrap(), MatchType::Equals);
        assert!("regex".parse::<MatchType>().is_err());
        assert_eq!(serde_json::to_string(&MatchType::StartsWith).unwrap(), "\"startsWith\"");
    }

    // ── classification ────────────────────────────────────────────────────────

    #[test]
    fn high_priority_rule_gives_high_confidence() {
        let engine = CategoryRuleEngine::new(vec![CategoryRule::new(
            "woolworths",
            MatchType::Contains,
            "groceries",
            100,
        )]);
        let c = engine.classify("WOOLWORTHS 123 SYDNEY", None);
        assert_eq!(c.category, "groceries");
        assert_eq!(c.confidence, 0.9);
        assert_eq!(c.profile, DEFAULT_PROFILE);
        assert_eq!(c.matched_rule.as_deref(), Some("woolworths"));
    }

    #[test]
    fn low_priority_rule_gives_standard_confidence() {
        let engine = CategoryRuleEngine::new(vec![
            CategoryRule::new("coles", MatchType::Contains, "groceries", 10).with_profile("household"),
        ]);
        let c = engine.classify("COLES 55", None);
        assert_eq!(c.confidence, 0.75);
        assert_eq!(c.profile, "household");
    }

    #[test]
    fn no_match_falls_back() {
        let engine = CategoryRuleEngine::new(Vec::new());
        let c = engine.classify("SOMETHING ELSE", None);
        assert_eq!(c.category, UNCATEGORISED);
        assert_eq!(c.profile, DEFAULT_PROFILE);
        assert_eq!(c.confidence, 0.2);
        assert!(c.matched_rule.is_none());
    }

    #[test]
    fn priority_ordering_highest_wins() {
        let engine = CategoryRuleEngine::new(vec![
            CategoryRule::new("amazon", MatchType::Contains, "shopping", 50),
            CategoryRule::new("amazon", MatchType::Contains, "books", 100),
        ]);
        assert_eq!(engine.classify("AMAZON MARKETPLACE", None).category, "books");
    }

    #[test]
    fn equal_priority_keeps_given_order() {
        let engine = CategoryRuleEngine::new(vec![
            CategoryRule::new("cafe", MatchType::Contains, "coffee", 5),
            CategoryRule::new("cafe", MatchType::Contains, "dining", 5),
        ]);
        assert_eq!(engine.classify("CAFE ROMA", None).category, "coffee");
    }

    #[test]
    fn disabled_rules_are_ignored() {
        let mut rule = CategoryRule::new("amazon", MatchType::Contains, "shopping", 100);
        rule.enabled = false;
        let engine = CategoryRuleEngine::new(vec![rule]);
        assert!(engine.rules().is_empty());
        assert!(engine.classify("AMAZON", None).matched_rule.is_none());
    }

    #[test]
    fn stored_rule_reference_is_its_id() {
        let mut rule = CategoryRule::new("amazon", MatchType::Contains, "shopping", 1);
        rule.id = Some(42);
        let engine = CategoryRuleEngine::new(vec![rule]);
        assert_eq!(engine.classify("AMAZON", None).matched_rule.as_deref(), Some("42"));
    }

    // ── built-in overrides ────────────────────────────────────────────────────

    #[test]
    fn uber_forces_profile_and_raises_confidence() {
        let engine = CategoryRuleEngine::new(Vec::new());
        let c = engine.classify("UBER *TRIP HELP.UBER.COM", None);
        assert_eq!(c.profile, UBER_PROFILE);
        assert_eq!(c.confidence, 0.75);
    }

    #[test]
    fn zip_forces_category_without_lowering_confidence() {
        let engine = CategoryRuleEngine::new(vec![CategoryRule::new(
            "zip pay",
            MatchType::Contains,
            "debt",
            95,
        )]);
        let c = engine.classify("ZIP PAY REPAYMENT", None);
        assert_eq!(c.category, ZIP_CATEGORY);
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn apply_rules_updates_transactions_in_place() {
        let engine = CategoryRuleEngine::new(vec![CategoryRule::new(
            "woolworths",
            MatchType::Contains,
            "groceries",
            100,
        )]);
        let mut txs = vec![tx("WOOLWORTHS 123 SYDNEY"), tx("BP FUEL")];
        txs[1].category = "transport".to_string();
        engine.apply_rules(&mut txs);
        assert_eq!(txs[0].category, "groceries");
        assert_eq!(txs[0].confidence, 0.9);
        assert_eq!(txs[1].category, "transport");
        assert_eq!(txs[1].confidence, 0.2);
    }

    // ── loading and learning ──────────────────────────────────────────────────

    #[test]
    fn from_toml_reads_rule_tables() {
        let engine = CategoryRuleEngine::from_toml(
            r#"
            [[rules]]
            pattern = "woolworths"
            category = "groceries"
            priority = 100

            [[rules]]
            pattern = "netflix"
            match_type = "startsWith"
            category = "subscriptions"
            profile = "household"
            priority = 50

            [[rules]]
            pattern = "old"
            category = "ignored"
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(engine.rules().len(), 2);
        assert_eq!(engine.rules()[0].pattern, "woolworths");
        assert_eq!(engine.rules()[0].match_type, MatchType::Contains);
        assert_eq!(engine.rules()[1].profile.as_deref(), Some("household"));
    }

    #[test]
    fn from_toml_rejects_bad_input() {
        assert!(matches!(CategoryRuleEngine::from_toml("rules = 5"), Err(RuleError::Toml(_))));
        assert!(matches!(
            CategoryRuleEngine::from_toml("[[rules]]\npattern = \" \"\ncategory = \"x\"\n"),
            Err(RuleError::EmptyPattern { index: 0 })
        ));
    }

    #[test]
    fn learned_rule_shape() {
        let rule = learn_rule("WOOLWORTHS METRO 1234 SYDNEY NSW AUSTRALIA", "groceries", None);
        assert_eq!(rule.pattern, "woolworths metro 1234 sydney n");
        assert_eq!(rule.pattern.chars().count(), 30);
        assert_eq!(rule.match_type, MatchType::Contains);
        assert_eq!(rule.priority, 100);
        assert!(rule.enabled);
        assert_eq!(rule.profile.as_deref(), Some(DEFAULT_PROFILE));
    }

    #[test]
    fn learned_rule_classifies_the_same_merchant() {
        let mut rules = Vec::new();
        rules.push(learn_rule("Local Bakery", "", Some("household")));
        let engine = CategoryRuleEngine::new(rules);
        let c = engine.classify("LOCAL BAKERY 02/03", None);
        assert_eq!(c.category, UNCATEGORISED);
        assert_eq!(c.profile, "household");
        assert_eq!(c.confidence, 0.9);
    }
}
