// 🏷️ Prefix Rules - Rules as Data
// Roll-number prefix → course code table, evaluated longest-prefix-first

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Longest prefix a rule may declare
pub const MAX_PREFIX_LEN: usize = 4;

/// Default table, in declaration order
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("MCOM", "MCOM"),
    ("BAMC", "BAMASS"),
    ("MBA", "MBA"),
    ("MCA", "MCA"),
    ("BBA", "BBA"),
    ("BCA", "BCA"),
    ("BCOM", "BCOMH"),
    ("BA", "BAMASS"),
];

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    /// Alphabetic roll-number prefix (1-4 chars, stored upper-case)
    pub prefix: String,

    /// Course code assigned when the prefix matches
    pub course: String,
}

impl PrefixRule {
    pub fn new(prefix: &str, course: &str) -> Self {
        PrefixRule {
            prefix: prefix.trim().to_uppercase(),
            course: course.trim().to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        let len = self.prefix.chars().count();
        if len == 0 || len > MAX_PREFIX_LEN {
            bail!(
                "prefix {:?} must be 1-{} characters long",
                self.prefix,
                MAX_PREFIX_LEN
            );
        }
        if !self.prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("prefix {:?} must be alphabetic", self.prefix);
        }
        if self.course.is_empty() {
            bail!("prefix {:?} has an empty course code", self.prefix);
        }
        Ok(())
    }
}

// ============================================================================
// PREFIX TABLE
// ============================================================================

/// Immutable, ordered rule table.
///
/// Rules are kept sorted by descending prefix length. Equal-length prefixes
/// keep their declaration order. The matcher in [`crate::classifier`] relies
/// on this ordering and never re-sorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTable {
    rules: Vec<PrefixRule>,
}

impl PrefixTable {
    /// Build a table from rules, validating every entry
    pub fn from_rules(rules: Vec<PrefixRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            let rule = PrefixRule::new(&rule.prefix, &rule.course);
            rule.validate()?;
            if !seen.insert(rule.prefix.clone()) {
                bail!("duplicate prefix {:?} in rule table", rule.prefix);
            }
        }

        Ok(Self::sorted(
            rules
                .iter()
                .map(|r| PrefixRule::new(&r.prefix, &r.course))
                .collect(),
        ))
    }

    /// Load rules from JSON file (array of `{"prefix", "course"}`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read prefix rules file: {:?}", path.as_ref()))?;

        let rules: Vec<PrefixRule> =
            serde_json::from_str(&content).context("Failed to parse prefix rules JSON")?;

        PrefixTable::from_rules(rules)
            .with_context(|| format!("Invalid prefix rules in {:?}", path.as_ref()))
    }

    // Stable sort: equal lengths keep declaration order
    fn sorted(mut rules: Vec<PrefixRule>) -> Self {
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        PrefixTable { rules }
    }

    /// Rules in evaluation order (longest prefix first)
    pub fn rules(&self) -> &[PrefixRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Course code for an exact prefix, if declared
    pub fn course_for_prefix(&self, prefix: &str) -> Option<&str> {
        let prefix = prefix.trim().to_uppercase();
        self.rules
            .iter()
            .find(|r| r.prefix == prefix)
            .map(|r| r.course.as_str())
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::sorted(
            DEFAULT_RULES
                .iter()
                .map(|(prefix, course)| PrefixRule::new(prefix, course))
                .collect(),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
