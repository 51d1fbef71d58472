//! Search text sanitisation
//!
//! Search terms end up inside store-side pattern expressions
//! (`or=(description.ilike.*term*,...)`), so characters that carry meaning
//! in that grammar are removed before the term leaves the process.

use once_cell::sync::Lazy;
use regex::Regex;

static PATTERN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[%_,()*\\'":.]"#).expect("Invalid search sanitizer regex"));

/// Strip pattern-injection characters and collapse whitespace.
///
/// Returns `None` when nothing searchable is left.
pub fn sanitize_search(raw: &str) -> Option<String> {
    let stripped = PATTERN_CHARS.replace_all(raw, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: sanitised output never contains a pattern character or
        /// doubled whitespace, and sanitising is idempotent.
        #[test]
        fn prop_sanitized_is_clean(raw in ".{0,40}") {
            if let Some(clean) = sanitize_search(&raw) {
                prop_assert!(!clean.chars().any(|c| "%_,()*\\'\":.".contains(c)));
                prop_assert!(!clean.contains("  "));
                prop_assert_eq!(clean.trim(), clean.as_str());
                prop_assert_eq!(sanitize_search(&clean), Some(clean.clone()));
            }
        }
    }
}
