//! Violation detection.
//!
//! Rules run in a fixed priority order (links, mass-mention, caps, banned
//! words, emoji) and detection stops at the first match, so a message
//! reports at most one violation. The order is policy: the cheapest,
//! highest-signal checks come first.

use regex::Regex;

use crate::document::Filters;

/// The rule a message violated. `label()` is the wire/counter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Links,
    Everyone,
    Caps,
    BadWords,
    Emojis,
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Links => "links",
            RuleKind::Everyone => "everyone",
            RuleKind::Caps => "caps",
            RuleKind::BadWords => "badWords",
            RuleKind::Emojis => "emojis",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Compiled detection patterns, built once and reused per message.
pub struct RuleMatcher {
    link_re: Regex,
    emoji_re: Regex,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self {
            link_re: Regex::new(r"(?i)(https?://|discord\.gg)").unwrap(),
            emoji_re: Regex::new(r"\p{Extended_Pictographic}").unwrap(),
        }
    }

    /// First enabled rule the content violates, in priority order.
    pub fn detect(&self, content: &str, filters: &Filters) -> Option<RuleKind> {
        if filters.links.is_enabled() && self.link_re.is_match(content) {
            return Some(RuleKind::Links);
        }

        if filters.everyone.is_enabled()
            && (content.contains("@everyone") || content.contains("@here"))
        {
            return Some(RuleKind::Everyone);
        }

        if let Some(caps) = filters.caps.params() {
            if content.chars().count() >= caps.min_length && caps_percent(content) >= caps.percent
            {
                return Some(RuleKind::Caps);
            }
        }

        if let Some(bad_words) = filters.bad_words.params() {
            let lower = content.to_lowercase();
            if bad_words
                .words
                .iter()
                .filter(|word| !word.is_empty())
                .any(|word| lower.contains(&word.to_lowercase()))
            {
                return Some(RuleKind::BadWords);
            }
        }

        if let Some(emojis) = filters.emojis.params() {
            if self.emoji_re.find_iter(content).count() > emojis.max {
                return Some(RuleKind::Emojis);
            }
        }

        None
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage of alphabetic characters that are uppercase.
///
/// Non-alphabetic characters count toward neither side; a message with no
/// letters scores 0.
pub fn caps_percent(content: &str) -> f64 {
    let letters = content.chars().filter(char::is_ascii_alphabetic).count();
    if letters == 0 {
        return 0.0;
    }
    let caps = content
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .count();
    (caps as f64 / letters as f64) * 100.0
}
