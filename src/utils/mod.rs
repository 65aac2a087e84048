//! Common utilities and helper functions
//!
//! Text helpers shared by ingestion, matching and sentiment scoring.

pub mod error;

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn url_regex() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("Invalid regex pattern")
    })
}

fn mention_regex() -> &'static Regex {
    static MENTION_RE: OnceLock<Regex> = OnceLock::new();
    MENTION_RE.get_or_init(|| Regex::new(r"@(\w+)").expect("Invalid regex pattern"))
}

fn hashtag_regex() -> &'static Regex {
    static HASHTAG_RE: OnceLock<Regex> = OnceLock::new();
    HASHTAG_RE.get_or_init(|| Regex::new(r"#(\w+)").expect("Invalid regex pattern"))
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Remove URLs and `@handle` tokens so they do not influence scoring
pub fn strip_urls_and_mentions(text: &str) -> String {
    let without_urls = url_regex().replace_all(text, " ");
    let without_mentions = mention_regex().replace_all(&without_urls, " ");
    normalize_whitespace(&without_mentions)
}

/// Extract `#hashtags` from text, lowercased and without the `#`
pub fn extract_hashtags(text: &str) -> BTreeSet<String> {
    hashtag_regex()
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Extract `@mentions` from text, lowercased and without the `@`
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    mention_regex()
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Extract URLs from text
pub fn extract_urls(text: &str) -> BTreeSet<String> {
    url_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello \n\t world  "), "hello world");
    }

    #[test]
    fn test_strip_urls_and_mentions() {
        let text = "@elonmusk doge https://t.co/abc to the www.moon.io moon";
        assert_eq!(strip_urls_and_mentions(text), "doge to the moon");
    }

    #[test]
    fn test_extract_hashtags() {
        let tags = extract_hashtags("buy #DOGE and #Shib now #doge");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("doge"));
        assert!(tags.contains("shib"));
    }

    #[test]
    fn test_extract_mentions_and_urls() {
        let text = "cc @ElonMusk see https://example.com/x";
        assert!(extract_mentions(text).contains("elonmusk"));
        assert!(extract_urls(text).contains("https://example.com/x"));
    }
}
