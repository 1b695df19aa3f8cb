//! Content fingerprints used as dedup keys.
//!
//! A fingerprint is `"{date}_{title50}"` where `date` is everything before the
//! first space of the date column and `title50` is the first 50 alphanumeric
//! characters of the title (CJK ideographs count as alphanumeric). Punctuation
//! and whitespace differences between two copies of one story vanish, so the
//! copies collapse onto the same key. Unrelated stories that share a date and a
//! 50-character prefix collide; that is accepted.

use crate::models::{ExtractedArticle, Record};

/// Number of normalized title characters kept in a fingerprint.
pub const TITLE_PREFIX_CHARS: usize = 50;

/// Derive the dedup key for a title and a date column value.
///
/// Never fails: an empty title or date still produces a valid key.
pub fn fingerprint(title: &str, date: &str) -> String {
    let title_prefix: String = title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(TITLE_PREFIX_CHARS)
        .collect();
    let date_part = date.split(' ').next().unwrap_or_default();
    format!("{}_{}", date_part, title_prefix)
}

pub fn fingerprint_record(record: &Record) -> String {
    fingerprint(&record.title, &record.published)
}

pub fn fingerprint_article(article: &ExtractedArticle) -> String {
    fingerprint(&article.title, &article.date_string())
}
