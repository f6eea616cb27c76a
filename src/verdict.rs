//! Classification of a judge agent's free-text verdict.
//!
//! The baseline is a case-insensitive substring vocabulary. It misfires on
//! unrelated prose ("critical" anywhere flags a review).

use regex::Regex;
use std::sync::LazyLock;

/// Phrases that mean the judged artifact needs more work.
pub const NEEDS_CHANGES_KEYWORDS: [&str; 7] = [
    "needs changes",
    "requires changes",
    "does not meet",
    "problematic",
    "issues found",
    "must be fixed",
    "should be revised",
];

/// Extra phrase only code review treats as a request for changes.
pub const REVIEW_EXTRA_KEYWORD: &str = "critical";

const INCOMPLETE_KEYWORDS: [&str; 2] = ["incomplete", "missing"];

static COMPLETE_WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcomplete\b").expect("complete regex"));

/// Decides what a judge's verdict means.
pub trait VerdictClassifier: Send + Sync {
    /// Whether the verdict asks for the artifact to be reworked.
    fn needs_changes(&self, verdict: &str) -> bool;

    /// Whether the verdict declares the work ready to publish.
    fn is_complete(&self, verdict: &str) -> bool;
}

/// Substring-vocabulary classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    needs_changes: Vec<&'static str>,
}

impl KeywordClassifier {
    /// Vocabulary used to judge plans.
    pub fn plan_validation() -> Self {
        Self {
            needs_changes: NEEDS_CHANGES_KEYWORDS.to_vec(),
        }
    }

    /// Vocabulary used to judge code; also flags "critical".
    pub fn code_review() -> Self {
        let mut needs_changes = NEEDS_CHANGES_KEYWORDS.to_vec();
        needs_changes.push(REVIEW_EXTRA_KEYWORD);
        Self { needs_changes }
    }

    /// The keyword that matched, if any.
    pub fn matched_keyword(&self, verdict: &str) -> Option<&'static str> {
        let lower = verdict.to_lowercase();
        self.needs_changes
            .iter()
            .copied()
            .find(|keyword| lower.contains(keyword))
    }
}

impl VerdictClassifier for KeywordClassifier {
    fn needs_changes(&self, verdict: &str) -> bool {
        self.matched_keyword(verdict).is_some()
    }

    fn is_complete(&self, verdict: &str) -> bool {
        let lower = verdict.to_lowercase();
        let flagged = INCOMPLETE_KEYWORDS.iter().any(|k| lower.contains(k));
        !flagged || COMPLETE_WORD_REGEX.is_match(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_keyword_triggers_needs_changes() {
        let classifier = KeywordClassifier::plan_validation();
        for keyword in NEEDS_CHANGES_KEYWORDS {
            let verdict = format!("Overall: the plan {} before approval.", keyword.to_uppercase());
            assert!(
                classifier.needs_changes(&verdict),
                "'{}' should trigger needs_changes",
                keyword
            );
        }
    }

    #[test]
    fn test_clean_verdict_does_not_need_changes() {
        let classifier = KeywordClassifier::plan_validation();
        assert!(!classifier.needs_changes("LGTM. The plan is thorough and ready."));
        assert!(!classifier.needs_changes(""));
    }

    #[test]
    fn test_critical_only_counts_for_review() {
        let verdict = "One critical bug in the parser.";
        assert!(!KeywordClassifier::plan_validation().needs_changes(verdict));
        assert!(KeywordClassifier::code_review().needs_changes(verdict));
        assert_eq!(
            KeywordClassifier::code_review().matched_keyword(verdict),
            Some("critical")
        );
    }

    #[test]
    fn test_is_complete_defaults_to_true() {
        let classifier = KeywordClassifier::code_review();
        assert!(classifier.is_complete("Ready to ship."));
        assert!(classifier.is_complete(""));
    }

    #[test]
    fn test_is_complete_detects_incomplete_work() {
        let classifier = KeywordClassifier::code_review();
        assert!(!classifier.is_complete("The implementation is INCOMPLETE."));
        assert!(!classifier.is_complete("Tests are missing for the new module."));
    }

    #[test]
    fn test_complete_keyword_overrides() {
        let classifier = KeywordClassifier::code_review();
        assert!(classifier.is_complete("No missing pieces; the work is complete."));
        assert!(classifier.is_complete("Complete. Nothing is missing."));
        // "incomplete" alone must not count as the override word.
        assert!(!classifier.is_complete("incomplete: missing docs"));
    }
}
