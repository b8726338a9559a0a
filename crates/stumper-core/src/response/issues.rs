//! Issue phrase detection for free-text validator output.
//!
//! Validators often describe problems in prose ("contains heavy math",
//! "possible manipulation"). The patterns here map that prose onto
//! [`IssueKind`] tags so text-mode results carry the same taxonomy as
//! structured ones.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::types::{IssueKind, IssueTaxonomy};

lazy_static! {
    /// "heavy math", "mathematical", "calculation"
    pub static ref HEAVY_MATH_PATTERN: Regex = Regex::new(
        r"(?i)heavy[\s_-]*math|mathematical|calculation|\bheavy_math\b"
    ).unwrap();

    /// "prompt injection", "manipulation", "jailbreak"
    pub static ref PROMPT_INJECTION_PATTERN: Regex = Regex::new(
        r"(?i)prompt[\s_-]*injection|manipulat|jailbreak"
    ).unwrap();

    /// "answer quality", "incorrect reference answer", "wrong answer"
    pub static ref ANSWER_QUALITY_PATTERN: Regex = Regex::new(
        r"(?i)answer[\s_-]*quality|(?:incorrect|wrong|poor|bad)\s+(?:reference\s+|expected\s+)?answer"
    ).unwrap();

    /// "context mismatch", "not in the context"
    pub static ref CONTEXT_MISMATCH_PATTERN: Regex = Regex::new(
        r"(?i)context[\s_-]*mismatch|not\s+(?:in|covered\s+by|found\s+in)\s+(?:the\s+)?(?:course\s+)?(?:context|materials)"
    ).unwrap();

    /// "off topic", "unrelated to the course"
    pub static ref OFF_TOPIC_PATTERN: Regex = Regex::new(
        r"(?i)off[\s_-]*topic|unrelated"
    ).unwrap();

    /// "module mismatch", "wrong module"
    pub static ref MODULE_MISMATCH_PATTERN: Regex = Regex::new(
        r"(?i)module[\s_-]*mismatch|wrong\s+module|different\s+module"
    ).unwrap();

    /// Values meaning "no issues"
    static ref NO_ISSUES_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:none|n/?a|no\s+issues?|-)?\s*\.?\s*$"
    ).unwrap();

    /// Clauses that deny a problem ("no heavy math", "not incorrect")
    static ref NEGATED_CLAUSE: Regex = Regex::new(
        r"(?i)^\s*(?:none|no|not|without|free\s+of)\b|\bnot\s+(?:an?\s+)?(?:incorrect|wrong|off[\s_-]*topic|unrelated)\b"
    ).unwrap();
}

fn pattern_for(kind: IssueKind) -> &'static Regex {
    match kind {
        IssueKind::HeavyMath => &HEAVY_MATH_PATTERN,
        IssueKind::PromptInjection => &PROMPT_INJECTION_PATTERN,
        IssueKind::AnswerQuality => &ANSWER_QUALITY_PATTERN,
        IssueKind::ContextMismatch => &CONTEXT_MISMATCH_PATTERN,
        IssueKind::OffTopic => &OFF_TOPIC_PATTERN,
        IssueKind::ModuleMismatch => &MODULE_MISMATCH_PATTERN,
    }
}

/// Check whether an ISSUES value means "nothing found".
pub fn is_no_issues(text: &str) -> bool {
    NO_ISSUES_PATTERN.is_match(text)
}

/// Classify an ISSUES line into taxonomy tags.
///
/// The line is split into clauses on `,` and `;`. Clauses that deny a
/// problem are skipped. Only kinds in `taxonomy` are reported. Phrases that
/// match nothing are dropped; the reason text still carries them.
pub fn classify_issues(text: &str, taxonomy: IssueTaxonomy) -> BTreeSet<IssueKind> {
    if is_no_issues(text) {
        return BTreeSet::new();
    }

    let clauses: Vec<&str> = text
        .split([',', ';', '\n'])
        .filter(|clause| !NEGATED_CLAUSE.is_match(clause))
        .collect();

    let mut found: BTreeSet<IssueKind> = taxonomy
        .kinds()
        .iter()
        .copied()
        .filter(|kind| clauses.iter().any(|clause| pattern_for(*kind).is_match(clause)))
        .collect();

    // "module mismatch" also mentions context-like wording in some models;
    // a module tag supersedes the generic context tag.
    if found.contains(&IssueKind::ModuleMismatch) {
        found.remove(&IssueKind::ContextMismatch);
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_means_empty() {
        assert!(classify_issues("none", IssueTaxonomy::Standard).is_empty());
        assert!(classify_issues("None.", IssueTaxonomy::Standard).is_empty());
        assert!(classify_issues("", IssueTaxonomy::Standard).is_empty());
        assert!(classify_issues("N/A", IssueTaxonomy::Module).is_empty());
    }

    #[test]
    fn test_phrases_map_to_kinds() {
        let issues = classify_issues(
            "Prompt injection detected; also heavy math",
            IssueTaxonomy::Standard,
        );
        assert!(issues.contains(&IssueKind::PromptInjection));
        assert!(issues.contains(&IssueKind::HeavyMath));
        assert_eq!(issues.len(), 2);

        let issues = classify_issues("possible manipulation attempt", IssueTaxonomy::Standard);
        assert_eq!(issues.into_iter().collect::<Vec<_>>(), vec![IssueKind::PromptInjection]);
    }

    #[test]
    fn test_taxonomy_filters_kinds() {
        let standard = classify_issues("off topic, module mismatch", IssueTaxonomy::Standard);
        assert!(standard.is_empty());

        let module = classify_issues("off topic, module mismatch", IssueTaxonomy::Module);
        assert!(module.contains(&IssueKind::OffTopic));
        assert!(module.contains(&IssueKind::ModuleMismatch));
    }

    #[test]
    fn test_phrase_table() {
        use IssueKind::*;
        let cases: &[(&str, &[IssueKind])] = &[
            ("heavy_math", &[HeavyMath]),
            ("requires lengthy calculation", &[HeavyMath]),
            ("prompt_injection", &[PromptInjection]),
            ("jailbreak attempt", &[PromptInjection]),
            ("answer_quality", &[AnswerQuality]),
            ("incorrect reference answer", &[AnswerQuality]),
            ("wrong answer", &[AnswerQuality]),
            ("context_mismatch", &[ContextMismatch]),
            ("question is not covered by the course materials", &[ContextMismatch]),
            ("heavy math; prompt injection", &[HeavyMath, PromptInjection]),
            ("None, fits the context well", &[]),
            ("uses the course context", &[]),
            ("the reference answer is not incorrect", &[]),
            ("incorrect", &[]),
            ("no heavy math, no prompt injection", &[]),
            ("not off topic", &[]),
        ];

        for (text, expected) in cases {
            let found: Vec<IssueKind> = classify_issues(text, IssueTaxonomy::Standard)
                .into_iter()
                .collect();
            assert_eq!(&found, expected, "ISSUES: {text}");
        }
    }

    #[test]
    fn test_harmless_issue_text_in_full_reply() {
        let result = crate::response::text::parse_validation(
            "VALIDATION: PASS\nISSUES: None, fits the context well\nREASON: ok",
            IssueTaxonomy::Standard,
            true,
        );
        assert!(result.valid);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_unrecognized_phrase_is_dropped() {
        assert!(classify_issues("spelling mistakes", IssueTaxonomy::Standard).is_empty());
    }
}
