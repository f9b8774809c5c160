use crate::types::Outcome;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Substrings that flag a log window as worth a closer look.
pub const ISSUE_KEYWORDS: [&str; 6] = ["error", "warn", "fail", "exception", "crash", "restart"];

static ISSUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(&ISSUE_KEYWORDS.join("|"))
        .case_insensitive(true)
        .unicode(false)
        .build()
        .expect("issue keyword pattern is a plain alternation")
});

/// Returns `IssueFound` if any issue keyword occurs in `text`, ignoring case, else `Normal`.
pub fn classify(text: &str) -> Outcome {
    if ISSUE_PATTERN.is_match(text) {
        Outcome::IssueFound
    } else {
        Outcome::Normal
    }
}

/// Distinct keywords present in `text`, in keyword-table order.
pub fn matched_keywords(text: &str) -> Vec<&'static str> {
    let mut found = Vec::new();
    for m in ISSUE_PATTERN.find_iter(text) {
        let hit = m.as_str().to_ascii_lowercase();
        if let Some(keyword) = ISSUE_KEYWORDS.iter().find(|k| **k == hit)
            && !found.contains(keyword)
        {
            found.push(*keyword);
        }
    }
    found.sort_by_key(|k| ISSUE_KEYWORDS.iter().position(|x| x == k));
    found
}
