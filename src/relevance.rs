//! Keyword relevance filtering.
//!
//! The vocabulary is compiled once into a [`RegexSet`] of escaped literals, so
//! a single pass over the body reports every keyword it contains, including
//! terms that overlap each other in the text. Matching is literal and
//! case-sensitive; the only normalization is dropping ASCII spaces, which
//! news pages sprinkle between CJK characters.

use regex::RegexSet;
use std::collections::BTreeSet;
use tracing::debug;

/// Default minimum body length, in characters, for an article to be kept.
pub const MIN_BODY_CHARS: usize = 100;

/// Literal multi-keyword matcher.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    /// Sorted, deduplicated vocabulary; indices line up with `set`.
    keywords: Vec<String>,
    set: RegexSet,
}

impl KeywordMatcher {
    /// Compile a matcher from a vocabulary. Empty and duplicate terms are dropped.
    ///
    /// # Errors
    ///
    /// Only if the compiled set exceeds the regex size limit; terms are
    /// escaped, so no keyword can be an invalid pattern.
    pub fn new<I, S>(vocabulary: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = vocabulary
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let set = RegexSet::new(keywords.iter().map(|k| regex::escape(k)))?;
        debug!(terms = keywords.len(), "Compiled keyword matcher");
        Ok(Self { keywords, set })
    }

    /// Every vocabulary term present anywhere in `text`.
    pub fn matches(&self, text: &str) -> BTreeSet<String> {
        let squeezed = text.replace(' ', "");
        self.set
            .matches(&squeezed)
            .into_iter()
            .map(|i| self.keywords[i].clone())
            .collect()
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// True when every configured term was blank.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Outcome of running an extracted body through [`RelevanceFilter::assess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Long enough, with these keyword hits.
    Relevant(BTreeSet<String>),
    /// Below the minimum length (empty bodies included).
    TooShort { chars: usize },
    /// Long enough, but no term from the vocabulary appears.
    NoKeywords,
}

/// Body-length gate followed by the keyword matcher.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    matcher: KeywordMatcher,
    min_body_chars: usize,
}

impl RelevanceFilter {
    /// # Arguments
    ///
    /// * `matcher` - Compiled vocabulary
    /// * `min_body_chars` - Shortest body kept, counted in characters
    pub fn new(matcher: KeywordMatcher, min_body_chars: usize) -> Self {
        Self {
            matcher,
            min_body_chars,
        }
    }

    /// Length is checked before keywords, so a short body never reports hits.
    pub fn assess(&self, body: &str) -> Verdict {
        let chars = body.chars().count();
        if chars < self.min_body_chars {
            return Verdict::TooShort { chars };
        }
        let hits = self.matcher.matches(body);
        if hits.is_empty() {
            Verdict::NoKeywords
        } else {
            Verdict::Relevant(hits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> KeywordMatcher {
        KeywordMatcher::new(["政策", "改革", "人大", "人民代表大会", "税"]).unwrap()
    }

    #[test]
    fn test_matches_reports_every_hit() {
        let hits = matcher().matches("全国人民代表大会审议财政改革与税收政策");
        let expected: BTreeSet<String> = ["政策", "改革", "人民代表大会", "税"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // "人大" is not a substring of "人民代表大会".
        assert_eq!(hits, expected);
    }

    #[test]
    fn test_overlapping_terms_both_count() {
        let m = KeywordMatcher::new(["人民", "人民代表大会"]).unwrap();
        let hits = m.matches("人民代表大会开幕");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_spaces_are_removed_before_matching() {
        let hits = matcher().matches("新 一 轮 改 革");
        assert!(hits.contains("改革"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let m = KeywordMatcher::new(["GDP"]).unwrap();
        assert!(m.matches("gdp growth").is_empty());
        assert_eq!(m.matches("GDP growth").len(), 1);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = KeywordMatcher::new(["a.b", "(x)"]).unwrap();
        assert!(m.matches("axb").is_empty());
        assert_eq!(m.matches("a.b and (x)").len(), 2);
    }

    #[test]
    fn test_vocabulary_dedup_and_empty_terms() {
        let m = KeywordMatcher::new(["政策", "政策", "", "  "]).unwrap();
        assert_eq!(m.len(), 1);
        let empty = KeywordMatcher::new(Vec::<String>::new()).unwrap();
        assert!(empty.is_empty());
        assert!(empty.matches("政策").is_empty());
    }

    #[test]
    fn test_filter_boundary_at_min_length() {
        let filter = RelevanceFilter::new(matcher(), MIN_BODY_CHARS);

        let short = format!("政策{}", "文".repeat(97));
        assert_eq!(short.chars().count(), 99);
        assert_eq!(filter.assess(&short), Verdict::TooShort { chars: 99 });

        let exact = format!("政策{}", "文".repeat(98));
        assert_eq!(exact.chars().count(), 100);
        match filter.assess(&exact) {
            Verdict::Relevant(hits) => assert!(hits.contains("政策")),
            other => panic!("expected relevant, got {:?}", other),
        }

        let no_hits = "文".repeat(150);
        assert_eq!(filter.assess(&no_hits), Verdict::NoKeywords);
    }
}
