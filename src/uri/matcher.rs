//! Region identifier matching
//!
//! Finds the first region identifier embedded in arbitrary text such as a
//! host name or URL.

use crate::region::KNOWN_REGIONS;
use lazy_static::lazy_static;
use regex_lite::Regex;

lazy_static! {
    static ref KNOWN_MATCHER: RegionMatcher = RegionMatcher::new(KNOWN_REGIONS.iter().copied());
}

/// Matches region identifiers in text.
///
/// Alternatives are ordered longest first so that an identifier is never
/// shadowed by a shorter one it starts with (`us-east-1` wins over `us-east`).
#[derive(Debug, Clone)]
pub struct RegionMatcher {
    pattern: Option<Regex>,
}

impl RegionMatcher {
    /// Build a matcher over the given region identifiers
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = regions
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();

        if names.is_empty() {
            return Self { pattern: None };
        }

        let alternation = names
            .iter()
            .map(|name| regex_lite::escape(name))
            .collect::<Vec<_>>()
            .join("|");

        Self {
            pattern: Regex::new(&alternation).ok(),
        }
    }

    /// Matcher over every region the store client knows about
    pub fn known() -> &'static RegionMatcher {
        &KNOWN_MATCHER
    }

    /// First region identifier found in `text`
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern
            .as_ref()
            .and_then(|pattern| pattern.find(text))
            .map(|m| m.as_str())
    }
}
