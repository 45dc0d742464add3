//! Text predicates used to select branches.
//!
//! Predicates are compiled once when a scenario is loaded. Evaluation order
//! within one predicate is fixed: `otherwise`, then `containsAny`, then
//! `regex`. A predicate carrying none of them never matches.

use parley_types::Predicate;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::warn;

/// Flags applied to branch patterns that do not specify any.
pub const DEFAULT_BRANCH_FLAGS: &str = "i";

/// A pattern that failed to compile.
#[derive(Debug, Error)]
#[error("invalid pattern {pattern:?}: {source}")]
pub struct PredicateError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Build a regex from a pattern and script-style flag letters.
///
/// `i`, `m`, `s` and `x` map to the corresponding regex options; `g`, `y`
/// and `u` have no meaning for a single test and are ignored.
///
/// Patterns use the `regex` crate syntax. Look-around and backreferences are
/// not supported and fail to compile like any other malformed pattern.
pub fn build_regex(pattern: &str, flags: &str) -> Result<Regex, PredicateError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            _ => {}
        }
    }
    builder.build().map_err(|source| PredicateError {
        pattern: pattern.to_string(),
        source,
    })
}

/// Compiled form of a branch predicate.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// `otherwise`, or a branch with no predicate at all.
    Always,
    /// Lowercased tokens; any substring hit matches.
    ContainsAny(Vec<String>),
    Pattern(Regex),
    Never,
}

impl Matcher {
    /// Compile a predicate, reporting malformed patterns.
    pub fn compile(when: Option<&Predicate>) -> Result<Self, PredicateError> {
        let Some(when) = when else {
            return Ok(Matcher::Always);
        };
        if when.otherwise {
            return Ok(Matcher::Always);
        }
        if let Some(tokens) = &when.contains_any {
            return Ok(Matcher::ContainsAny(
                tokens.iter().map(|t| t.to_lowercase()).collect(),
            ));
        }
        if let Some(pattern) = &when.regex {
            let flags = match when.flags.as_deref() {
                Some(f) if !f.is_empty() => f,
                _ => DEFAULT_BRANCH_FLAGS,
            };
            return build_regex(pattern, flags).map(Matcher::Pattern);
        }
        Ok(Matcher::Never)
    }

    /// Compile a predicate, degrading a malformed pattern to `Never`.
    pub fn compile_lenient(when: Option<&Predicate>) -> Self {
        match Self::compile(when) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!(target: "parley::scenario", "Predicate treated as non-match: {}", e);
                Matcher::Never
            }
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Always => true,
            Matcher::ContainsAny(tokens) => {
                let hay = text.to_lowercase();
                tokens.iter().any(|t| hay.contains(t.as_str()))
            }
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Never => false,
        }
    }
}

/// Index of the first item whose matcher accepts `text`.
pub fn first_match<T>(items: &[T], matcher: impl Fn(&T) -> &Matcher, text: &str) -> Option<usize> {
    items.iter().position(|item| matcher(item).matches(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn contains_any(tokens: &[&str]) -> Predicate {
        Predicate {
            contains_any: Some(tokens.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    fn regex(pattern: &str, flags: Option<&str>) -> Predicate {
        Predicate {
            regex: Some(pattern.to_string()),
            flags: flags.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_otherwise_always_matches() {
        let when = Predicate {
            otherwise: true,
            ..Default::default()
        };
        let m = Matcher::compile(Some(&when)).unwrap();
        assert!(m.matches(""));
        assert!(m.matches("anything"));
    }

    #[test]
    fn test_missing_predicate_matches() {
        assert!(Matcher::compile(None).unwrap().matches("x"));
    }

    #[test]
    fn test_empty_predicate_never_matches() {
        let m = Matcher::compile(Some(&Predicate::default())).unwrap();
        assert!(!m.matches("p95"));
    }

    #[test]
    fn test_contains_any_is_case_insensitive() {
        let m = Matcher::compile(Some(&contains_any(&["P95", "latency"]))).unwrap();
        assert!(m.matches("the p95 is 500ms"));
        assert!(m.matches("LATENCY spiked"));
        assert!(!m.matches("not sure"));
    }

    #[test]
    fn test_contains_any_takes_precedence_over_regex() {
        let mut when = contains_any(&["cache"]);
        when.regex = Some("^never$".into());
        let m = Matcher::compile(Some(&when)).unwrap();
        assert!(m.matches("add a cache"));
    }

    #[test]
    fn test_regex_defaults_to_case_insensitive() {
        let m = Matcher::compile(Some(&regex(r"\bindex(es)?\b", None))).unwrap();
        assert!(m.matches("Add an INDEX on user_id"));

        let m = Matcher::compile(Some(&regex(r"\bindex\b", Some("")))).unwrap();
        assert!(m.matches("INDEX"));
    }

    #[test]
    fn test_regex_explicit_flags_replace_default() {
        let m = Matcher::compile(Some(&regex("^Index$", Some("g")))).unwrap();
        assert!(m.matches("Index"));
        assert!(!m.matches("index"));
    }

    #[test]
    fn test_malformed_regex_is_reported() {
        let err = Matcher::compile(Some(&regex("(unclosed", None))).unwrap_err();
        assert_eq!(err.pattern, "(unclosed");
    }

    #[test]
    fn test_malformed_regex_lenient_is_non_match() {
        let m = Matcher::compile_lenient(Some(&regex("(unclosed", None)));
        assert!(matches!(m, Matcher::Never));
        assert!(!m.matches("(unclosed"));
    }

    #[test]
    fn test_lookaround_and_backreference_rejected() {
        for pattern in ["^(?!no).*yes", r"(a)\1"] {
            assert!(build_regex(pattern, "").is_err(), "{}", pattern);
            let m = Matcher::compile_lenient(Some(&regex(pattern, None)));
            assert!(matches!(m, Matcher::Never));
        }
    }

    #[test]
    fn test_build_regex_flags() {
        let re = build_regex("^b$", "m").unwrap();
        assert!(re.is_match("a\nb\nc"));

        let re = build_regex("a.b", "s").unwrap();
        assert!(re.is_match("a\nb"));
    }

    #[test]
    fn test_first_match_picks_earliest() {
        let matchers = vec![
            Matcher::ContainsAny(vec!["p95".into()]),
            Matcher::ContainsAny(vec!["ms".into()]),
            Matcher::Always,
        ];
        assert_eq!(first_match(&matchers, |m| m, "p95 is 500ms"), Some(0));
        assert_eq!(first_match(&matchers, |m| m, "500ms"), Some(1));
        assert_eq!(first_match(&matchers, |m| m, "no idea"), Some(2));
        assert_eq!(first_match(&matchers[..2], |m| m, "no idea"), None);
    }

    proptest! {
        #[test]
        fn prop_trailing_otherwise_always_selects(text in ".*", tokens in prop::collection::vec("[a-z]{1,6}", 0..5)) {
            let mut matchers: Vec<Matcher> = tokens
                .into_iter()
                .map(|t| Matcher::ContainsAny(vec![t]))
                .collect();
            matchers.push(Matcher::Always);
            prop_assert!(first_match(&matchers, |m| m, &text).is_some());
        }

        #[test]
        fn prop_first_match_is_deterministic_and_minimal(text in "[a-z ]{0,20}", tokens in prop::collection::vec("[a-z]{1,3}", 1..6)) {
            let matchers: Vec<Matcher> = tokens
                .iter()
                .map(|t| Matcher::ContainsAny(vec![t.clone()]))
                .collect();
            let first = first_match(&matchers, |m| m, &text);
            prop_assert_eq!(first, first_match(&matchers, |m| m, &text));
            if let Some(idx) = first {
                prop_assert!(matchers[idx].matches(&text));
                prop_assert!(matchers[..idx].iter().all(|m| !m.matches(&text)));
            } else {
                prop_assert!(matchers.iter().all(|m| !m.matches(&text)));
            }
        }
    }
}
