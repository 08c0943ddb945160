//! Input triage run before any backend call.
//!
//! Records that are empty, or whose text is UTF-8 Indic script that was decoded as
//! Latin-1/Windows-1252 somewhere upstream, never reach the backend.

use regex::Regex;

lazy_static! {
    /// `à¤`, `à¥` (Devanagari) and `à¦` (Bengali/Assamese) lead sequences followed by a
    /// high-range code point. One match is one mis-decoded character.
    static ref MOJIBAKE_PATTERN: Regex =
        Regex::new(r"à¤[\x{80}-\x{FF}]|à¥[\x{80}-\x{FF}]|à¦[\x{80}-\x{FF}]")
            .expect("mojibake pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityIssue {
    Empty,
    CorruptedEncoding,
}

impl QualityIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityIssue::Empty => "empty",
            QualityIssue::CorruptedEncoding => "corrupted-encoding",
        }
    }
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QualityFilter {
    /// Fraction of the text's characters that must belong to mojibake sequences.
    pub corruption_threshold: f64,
    /// Trimmed texts shorter than this are never flagged as corrupted.
    pub min_corruption_len: usize,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self {
            corruption_threshold: 0.15,
            min_corruption_len: 10,
        }
    }
}

impl QualityFilter {
    pub fn evaluate(&self, text: &str) -> Option<QualityIssue> {
        if text.trim().is_empty() {
            return Some(QualityIssue::Empty);
        }
        if self.is_corrupted(text) {
            return Some(QualityIssue::CorruptedEncoding);
        }
        None
    }

    pub fn is_corrupted(&self, text: &str) -> bool {
        if text.trim().chars().count() < self.min_corruption_len {
            return false;
        }
        let matched_chars: usize = MOJIBAKE_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().chars().count())
            .sum();
        if matched_chars == 0 {
            return false;
        }
        let total_chars = text.chars().count();
        matched_chars as f64 / total_chars as f64 >= self.corruption_threshold
    }
}
