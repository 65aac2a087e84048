//! Word weights for crypto/social-media sentiment.
//!
//! Keys are lowercase single tokens. Values in `(0.0, 1.0]` are positive,
//! in `[-1.0, 0.0)` are negative.

use std::collections::HashMap;
use std::sync::OnceLock;

pub(crate) const LEXICON: &[(&str, f64)] = &[
    // Positive signals
    ("moon", 0.5),
    ("mooning", 0.5),
    ("bullish", 0.6),
    ("pump", 0.3),
    ("pumping", 0.4),
    ("gains", 0.5),
    ("gain", 0.4),
    ("profit", 0.4),
    ("profits", 0.4),
    ("hodl", 0.3),
    ("lambo", 0.4),
    ("rally", 0.4),
    ("breakout", 0.4),
    ("ath", 0.4),
    ("surge", 0.4),
    ("soaring", 0.5),
    ("rocket", 0.4),
    ("gem", 0.4),
    ("legit", 0.3),
    ("wagmi", 0.5),
    ("buy", 0.2),
    ("great", 0.4),
    ("good", 0.3),
    ("awesome", 0.5),
    ("amazing", 0.5),
    ("excellent", 0.5),
    ("love", 0.5),
    ("best", 0.5),
    ("win", 0.4),
    ("winning", 0.4),
    ("happy", 0.4),
    ("excited", 0.4),
    ("strong", 0.3),
    ("bright", 0.3),
    // Negative signals
    ("dump", -0.5),
    ("dumping", -0.5),
    ("crash", -0.6),
    ("crashed", -0.6),
    ("rug", -0.7),
    ("rugged", -0.7),
    ("rugpull", -0.8),
    ("scam", -0.8),
    ("scammer", -0.8),
    ("fraud", -0.8),
    ("ponzi", -0.7),
    ("bearish", -0.6),
    ("rekt", -0.6),
    ("loss", -0.4),
    ("losses", -0.4),
    ("lost", -0.4),
    ("sell", -0.2),
    ("selling", -0.3),
    ("fud", -0.3),
    ("ngmi", -0.5),
    ("plunge", -0.5),
    ("drop", -0.3),
    ("dropped", -0.3),
    ("bubble", -0.3),
    ("hack", -0.6),
    ("hacked", -0.7),
    ("worthless", -0.7),
    ("dead", -0.5),
    ("panic", -0.5),
    ("fear", -0.4),
    ("risky", -0.3),
    ("warning", -0.4),
    ("bad", -0.4),
    ("terrible", -0.6),
    ("worst", -0.6),
    ("awful", -0.6),
    ("hate", -0.5),
    ("sad", -0.4),
];

/// Emoji weights, matched per character anywhere in the text
pub(crate) const EMOJI: &[(char, f64)] = &[
    ('🚀', 0.4),
    ('💎', 0.3),
    ('📈', 0.3),
    ('🔥', 0.2),
    ('😍', 0.4),
    ('📉', -0.4),
    ('💀', -0.3),
    ('😭', -0.3),
    ('🤡', -0.4),
];

/// Tokens that flip the polarity of the next weighted word
pub(crate) const NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "dont", "isn't", "isnt", "won't", "wont", "can't", "cant",
    "ain't", "aint", "nothing", "without", "nor",
];

/// Tokens that scale the word immediately after them
pub(crate) const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("so", 1.2),
    ("super", 1.4),
    ("extremely", 1.5),
    ("totally", 1.3),
    ("absolutely", 1.4),
    ("incredibly", 1.5),
    ("insanely", 1.5),
    ("mega", 1.4),
];

fn lexicon_map() -> &'static HashMap<&'static str, f64> {
    static MAP: OnceLock<HashMap<&'static str, f64>> = OnceLock::new();
    MAP.get_or_init(|| LEXICON.iter().copied().collect())
}

/// Weight of a lowercase token, if it carries sentiment
pub(crate) fn word_weight(token: &str) -> Option<f64> {
    lexicon_map().get(token).copied()
}

pub(crate) fn emoji_weight(c: char) -> Option<f64> {
    EMOJI.iter().find(|(e, _)| *e == c).map(|(_, w)| *w)
}

pub(crate) fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token)
}

pub(crate) fn intensifier(token: &str) -> Option<f64> {
    INTENSIFIERS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, factor)| *factor)
}
