// 🔎 Roll Number Classifier
// [PREFIX][YY_IN][YY_OUT][NNN] → course, entrance year, pass-out year
//
// Example: BCA2326077 → BCA, entered 2023, passes 2026, roll 077

use crate::rules::PrefixTable;
use serde::{Deserialize, Serialize};

/// Length of the digit run after the prefix
pub const DIGIT_RUN_LEN: usize = 7;

/// Century added to the two-digit year fields
pub const CENTURY: i32 = 2000;

// ============================================================================
// PARSED IDENTIFIER
// ============================================================================

/// Derived view of a roll number. Either every field is present or none is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    pub course: Option<String>,
    pub entrance_year: Option<i32>,
    pub pass_out_year: Option<i32>,

    /// Prefix that matched (diagnostics only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl ParsedIdentifier {
    pub fn is_classified(&self) -> bool {
        self.course.is_some()
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Stateless roll-number classifier over an injected [`PrefixTable`].
#[derive(Debug, Clone, Default)]
pub struct RollClassifier {
    table: PrefixTable,
}

impl RollClassifier {
    pub fn new(table: PrefixTable) -> Self {
        RollClassifier { table }
    }

    pub fn table(&self) -> &PrefixTable {
        &self.table
    }

    /// Classify a roll number.
    ///
    /// Prefixes are tried longest first; the first one whose remainder is
    /// exactly seven ASCII digits wins. A prefix whose remainder is invalid
    /// does not end the scan.
    ///
    /// ```
    /// use roll_sync::RollClassifier;
    ///
    /// let parsed = RollClassifier::default().classify("BCA2326077");
    /// assert_eq!(parsed.course.as_deref(), Some("BCA"));
    /// assert_eq!(parsed.entrance_year, Some(2023));
    /// assert_eq!(parsed.pass_out_year, Some(2026));
    /// ```
    pub fn classify(&self, roll_number: &str) -> ParsedIdentifier {
        let upper = roll_number.trim().to_uppercase();
        if upper.is_empty() {
            return ParsedIdentifier::default();
        }

        for rule in self.table.rules() {
            let Some(remainder) = upper.strip_prefix(rule.prefix.as_str()) else {
                continue;
            };

            if let Some((entrance, pass_out)) = parse_digit_run(remainder) {
                return ParsedIdentifier {
                    course: Some(rule.course.clone()),
                    entrance_year: Some(entrance),
                    pass_out_year: Some(pass_out),
                    prefix: Some(rule.prefix.clone()),
                };
            }
        }

        ParsedIdentifier::default()
    }

    /// Classify an optional roll number; `None` is unclassified
    pub fn classify_opt(&self, roll_number: Option<&str>) -> ParsedIdentifier {
        roll_number
            .map(|r| self.classify(r))
            .unwrap_or_default()
    }

    pub fn detect_course(&self, roll_number: &str) -> Option<String> {
        self.classify(roll_number).course
    }

    pub fn extract_entrance_year(&self, roll_number: &str) -> Option<i32> {
        self.classify(roll_number).entrance_year
    }

    pub fn extract_pass_out_year(&self, roll_number: &str) -> Option<i32> {
        self.classify(roll_number).pass_out_year
    }
}

/// `YYIN YYOUT NNN` → (entrance, pass-out). Exactly 7 digits, nothing else.
fn parse_digit_run(remainder: &str) -> Option<(i32, i32)> {
    if remainder.len() != DIGIT_RUN_LEN || !remainder.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let entrance: i32 = remainder[0..2].parse().ok()?;
    let pass_out: i32 = remainder[2..4].parse().ok()?;

    Some((CENTURY + entrance, CENTURY + pass_out))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PrefixRule;

    fn classify(roll: &str) -> ParsedIdentifier {
        RollClassifier::default().classify(roll)
    }

    fn assert_parsed(roll: &str, course: &str, entrance: i32, pass_out: i32) {
        let parsed = classify(roll);
        assert_eq!(parsed.course.as_deref(), Some(course), "course for {}", roll);
        assert_eq!(parsed.entrance_year, Some(entrance), "entrance for {}", roll);
        assert_eq!(parsed.pass_out_year, Some(pass_out), "pass-out for {}", roll);
    }

    #[test]
    fn test_known_examples() {
        assert_parsed("BCA2326077", "BCA", 2023, 2026);
        assert_parsed("MCOM2125045", "MCOM", 2021, 2025);
        assert_parsed("BAMC2024010", "BAMASS", 2020, 2024);
        assert_parsed("MBA2224001", "MBA", 2022, 2024);
        assert_parsed("MCA2325100", "MCA", 2023, 2025);
        assert_parsed("BBA2427999", "BBA", 2024, 2027);
        assert_parsed("BA2326001", "BAMASS", 2023, 2026);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let parsed = classify("BCOM2326077");
        assert_eq!(parsed.course.as_deref(), Some("BCOMH"));
        assert_eq!(parsed.prefix.as_deref(), Some("BCOM"));

        let parsed = classify("BAMC2024010");
        assert_eq!(parsed.prefix.as_deref(), Some("BAMC"));
    }

    #[test]
    fn test_exact_length_remainder() {
        assert!(!classify("BCA232607").is_classified()); // 6 digits
        assert!(!classify("BCA23260777").is_classified()); // 8 digits
        assert!(!classify("BCA23260A7").is_classified());
        assert!(!classify("BCA").is_classified());
    }

    #[test]
    fn test_invalid_remainder_is_not_a_match() {
        // "BAMC" + 6 digits fails, and "BA" + "MC..." is not digits either
        assert!(!classify("BAMC202401").is_classified());

        let table = PrefixTable::from_rules(vec![
            PrefixRule::new("ABC", "LONG"),
            PrefixRule::new("AB", "SHORT"),
        ])
        .unwrap();
        let classifier = RollClassifier::new(table);

        // "ABC" + "123456" (6 digits) fails; "AB" + "C123456" fails too
        assert!(!classifier.classify("ABC123456").is_classified());
        assert_eq!(
            classifier.detect_course("ABC1234567").as_deref(),
            Some("LONG")
        );
        assert_eq!(
            classifier.detect_course("AB1234567").as_deref(),
            Some("SHORT")
        );
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(classify("  bca2326077  "), classify("BCA2326077"));
        assert_eq!(classify("\tBcOm2125045\n").course.as_deref(), Some("BCOMH"));
    }

    #[test]
    fn test_unknown_prefix_and_empty_input() {
        assert_eq!(classify("XYZ1234567"), ParsedIdentifier::default());
        assert_eq!(classify(""), ParsedIdentifier::default());
        assert_eq!(classify("   "), ParsedIdentifier::default());

        let classifier = RollClassifier::default();
        assert_eq!(classifier.classify_opt(None), ParsedIdentifier::default());
    }

    #[test]
    fn test_convenience_accessors() {
        let classifier = RollClassifier::default();
        assert_eq!(classifier.detect_course("BCA2326077").as_deref(), Some("BCA"));
        assert_eq!(classifier.extract_entrance_year("BCA2326077"), Some(2023));
        assert_eq!(classifier.extract_pass_out_year("BCA2326077"), Some(2026));
        assert_eq!(classifier.extract_pass_out_year("nope"), None);
    }

    #[test]
    fn test_substituted_table() {
        let table = PrefixTable::from_rules(vec![PrefixRule::new("BCA", "COMPUTER_APPS")]).unwrap();
        let classifier = RollClassifier::new(table);

        assert_eq!(
            classifier.detect_course("BCA2326077").as_deref(),
            Some("COMPUTER_APPS")
        );
        assert!(!classifier.classify("MBA2224001").is_classified());
    }
}
