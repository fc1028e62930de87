use serde::Deserialize;

/// A whitelist/blacklist pair over ref strings (branches or tags).
///
/// Patterns are literal unless wrapped in `/…/`, in which case the inside is
/// compiled as a regular expression and matched anywhere in the ref.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefSelector {
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("error compiling regular expression {pattern:?}: {source}")]
pub struct SelectorError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

impl RefSelector {
    /// A ref matches when the whitelist is empty or any whitelisted pattern
    /// matches it, and no blacklisted pattern matches it. Pattern compilation
    /// failure is an error, never a silent non-match.
    pub fn matches(&self, git_ref: &str) -> Result<bool, SelectorError> {
        let mut matches_whitelist = self.only.is_empty();
        for pattern in &self.only {
            if ref_match(git_ref, pattern)? {
                matches_whitelist = true;
                break;
            }
        }
        for pattern in &self.ignore {
            if ref_match(git_ref, pattern)? {
                return Ok(false);
            }
        }
        Ok(matches_whitelist)
    }
}

fn ref_match(git_ref: &str, value_or_pattern: &str) -> Result<bool, SelectorError> {
    if let Some(inner) = value_or_pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    {
        let regex = regex::Regex::new(inner).map_err(|source| SelectorError {
            pattern: value_or_pattern.to_owned(),
            source,
        })?;
        return Ok(regex.is_match(git_ref));
    }
    Ok(git_ref == value_or_pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(only: &[&str], ignore: &[&str]) -> RefSelector {
        RefSelector {
            only: only.iter().map(|s| (*s).to_owned()).collect(),
            ignore: ignore.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn empty_selector_matches_everything() {
        let s = RefSelector::default();
        assert!(s.matches("master").unwrap());
        assert!(s.matches("").unwrap());
    }

    #[test]
    fn literal_matches_exact_string_only() {
        let s = selector(&["master"], &[]);
        assert!(s.matches("master").unwrap());
        assert!(!s.matches("masterful").unwrap());
        assert!(!s.matches("a-master").unwrap());
    }

    #[test]
    fn regex_pattern_matches_substring() {
        let s = selector(&["/abc/"], &[]);
        assert!(s.matches("abc").unwrap());
        assert!(s.matches("xxabcxx").unwrap());
        assert!(!s.matches("ab-c").unwrap());
    }

    #[test]
    fn version_tag_pattern() {
        let s = selector(&[r"/v[0-9]+(\.[0-9]+)*/"], &[]);
        assert!(s.matches("v1.2.3").unwrap());
        assert!(s.matches("v2").unwrap());
        assert!(!s.matches("latest").unwrap());
    }

    #[test]
    fn blacklist_overrides_whitelist() {
        let s = selector(&["/.*/"], &["master"]);
        assert!(s.matches("dev").unwrap());
        assert!(!s.matches("master").unwrap());
    }

    #[test]
    fn blacklist_applies_with_empty_whitelist() {
        let s = selector(&[], &["/wip-/"]);
        assert!(s.matches("main").unwrap());
        assert!(!s.matches("wip-thing").unwrap());
    }

    #[test]
    fn invalid_pattern_is_an_error_not_false() {
        let s = selector(&["/(/"], &[]);
        let err = s.matches("anything").unwrap_err();
        assert_eq!(err.pattern, "/(/");
    }

    #[test]
    fn invalid_blacklist_pattern_is_an_error() {
        let s = selector(&[], &["/[/"]);
        assert!(s.matches("anything").is_err());
    }

    #[test]
    fn slash_wrapped_empty_pattern_matches_everything() {
        // "//" compiles to the empty regex, which matches any ref.
        let s = selector(&["//"], &[]);
        assert!(s.matches("whatever").unwrap());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_ref() -> impl Strategy<Value = String> {
            "[a-z0-9./_-]{0,16}"
        }

        // Literal patterns must not be wrapped in slashes, or they would be
        // compiled as regexes.
        fn arb_literal() -> impl Strategy<Value = String> {
            "[a-z0-9._-]{0,16}"
        }

        proptest! {
            #[test]
            fn literal_only_matches_exactly(git_ref in arb_ref(), literal in arb_literal()) {
                let s = selector(&[&literal], &[]);
                prop_assert_eq!(s.matches(&git_ref).unwrap(), git_ref == literal);
            }

            #[test]
            fn slash_pattern_matches_any_containing_ref(git_ref in arb_ref()) {
                let s = selector(&["/abc/"], &[]);
                prop_assert_eq!(s.matches(&git_ref).unwrap(), git_ref.contains("abc"));
            }

            #[test]
            fn whitelist_blacklist_algebra(
                git_ref in arb_ref(),
                only in proptest::collection::vec(arb_literal(), 0..4),
                ignore in proptest::collection::vec(arb_literal(), 0..4),
            ) {
                let s = RefSelector { only: only.clone(), ignore: ignore.clone() };
                let expected = (only.is_empty() || only.iter().any(|p| *p == git_ref))
                    && !ignore.iter().any(|p| *p == git_ref);
                prop_assert_eq!(s.matches(&git_ref).unwrap(), expected);
            }

            #[test]
            fn matching_is_deterministic(git_ref in arb_ref()) {
                let s = selector(&["/ab/", "main"], &["/x$/"]);
                let first = s.matches(&git_ref).unwrap();
                let second = s.matches(&git_ref).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
