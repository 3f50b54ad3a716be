//! Display title cleanup rules

use serde::{Deserialize, Serialize};

/// A literal `from -> to` replacement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// Text to look for
    pub from: String,
    /// Replacement text
    pub to: String,
}

/// Rules applied to raw titles before they are shown on a task
///
/// Rules run in a fixed order: characters are removed first, then words, then
/// replacements, and finally runs of whitespace collapse to a single space.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFilter {
    /// Substrings removed verbatim (usually single characters such as `【`)
    #[serde(default)]
    pub remove_chars: Vec<String>,
    /// Words removed verbatim
    #[serde(default)]
    pub remove_words: Vec<String>,
    /// Literal replacements
    #[serde(default)]
    pub replace_rules: Vec<ReplaceRule>,
}

impl TitleFilter {
    /// Apply the rules to a raw title
    pub fn apply(&self, title: &str) -> String {
        if title.is_empty() {
            return String::new();
        }

        let mut filtered = title.to_string();
        for pattern in self.remove_chars.iter().chain(self.remove_words.iter()) {
            if !pattern.is_empty() {
                filtered = filtered.replace(pattern.as_str(), "");
            }
        }
        for rule in &self.replace_rules {
            if !rule.from.is_empty() {
                filtered = filtered.replace(rule.from.as_str(), &rule.to);
            }
        }

        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
