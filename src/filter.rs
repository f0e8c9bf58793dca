//! Noise filter for OCR detections
//!
//! Drops fragments that cannot be card names: low-confidence reads, UI labels,
//! mana-cost glyphs and stray digits.

use crate::config::PipelineConfig;
use crate::detection::Detection;
use std::collections::HashSet;

/// Why a detection was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowConfidence,
    Length,
    NoLetters,
    Stoplisted,
    ManaCost,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::Length => "length",
            Self::NoLetters => "no_letters",
            Self::Stoplisted => "stoplisted",
            Self::ManaCost => "mana_cost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionFilter {
    min_confidence: f32,
    min_len: usize,
    max_len: usize,
    stoplist: HashSet<String>,
    mana_symbols: HashSet<char>,
}

impl DetectionFilter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_confidence: config.min_confidence_floor,
            min_len: config.min_text_length,
            max_len: config.max_text_length,
            stoplist: config
                .noise_stoplist
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            mana_symbols: config.mana_symbol_set.chars().collect(),
        }
    }

    /// Check a single text fragment. The text is expected to be trimmed.
    pub fn check(&self, text: &str, confidence: f32) -> Result<(), Rejection> {
        if confidence < self.min_confidence {
            return Err(Rejection::LowConfidence);
        }

        let len = text.chars().count();
        if len < self.min_len || len > self.max_len {
            return Err(Rejection::Length);
        }

        if !text.chars().any(char::is_alphabetic) {
            return Err(Rejection::NoLetters);
        }

        if self.stoplist.contains(&text.to_lowercase()) {
            return Err(Rejection::Stoplisted);
        }

        if text
            .chars()
            .all(|c| c.is_numeric() || self.mana_symbols.contains(&c))
        {
            return Err(Rejection::ManaCost);
        }

        Ok(())
    }

    /// Keep-or-discard for one detection; kept detections carry trimmed text
    pub fn apply(&self, detection: Detection) -> Option<Detection> {
        let trimmed = detection.text().trim();
        match self.check(trimmed, detection.confidence()) {
            Ok(()) => {
                let trimmed = trimmed.to_string();
                Some(detection.with_text(trimmed))
            }
            Err(reason) => {
                tracing::trace!("Dropped {:?}: {}", detection.text(), reason.as_str());
                None
            }
        }
    }

    pub fn filter(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter_map(|d| self.apply(d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_support::rect;

    fn default_filter() -> DetectionFilter {
        DetectionFilter::new(&PipelineConfig::default())
    }

    fn check(text: &str) -> Result<(), Rejection> {
        default_filter().check(text, 0.9)
    }

    #[test]
    fn test_keeps_card_names() {
        assert_eq!(check("Lightning Bolt"), Ok(()));
        assert_eq!(check("Opt"), Ok(()));
        assert_eq!(check("Jace, the Mind Sculptor"), Ok(()));
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        assert_eq!(check("Ab"), Err(Rejection::Length));
        assert_eq!(check("Abc"), Ok(()));
        let fifty = "a".repeat(50);
        let fifty_one = "a".repeat(51);
        assert_eq!(check(&fifty), Ok(()));
        assert_eq!(check(&fifty_one), Err(Rejection::Length));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 3 chars, 6 bytes
        assert_eq!(check("Æöü"), Ok(()));
    }

    #[test]
    fn test_requires_a_letter() {
        assert_eq!(check("1234"), Err(Rejection::NoLetters));
        assert_eq!(check("{}/"), Err(Rejection::NoLetters));
    }

    #[test]
    fn test_stoplist_is_case_insensitive() {
        assert_eq!(check("Sideboard"), Err(Rejection::Stoplisted));
        assert_eq!(check("UNTAP"), Err(Rejection::Stoplisted));
        assert_eq!(check("Main Deck"), Ok(()));
    }

    #[test]
    fn test_mana_cost_notation() {
        assert_eq!(check("{2}{U}{U}"), Err(Rejection::ManaCost));
        assert_eq!(check("2WW"), Err(Rejection::ManaCost));
        assert_eq!(check("1/G"), Err(Rejection::ManaCost));
        // Lowercase letters are not mana symbols
        assert_eq!(check("wub"), Ok(()));
    }

    #[test]
    fn test_mana_cost_accepts_non_ascii_digits() {
        assert_eq!(check("²WW"), Err(Rejection::ManaCost));
        assert_eq!(check("{٣}{B}"), Err(Rejection::ManaCost));
    }

    #[test]
    fn test_confidence_floor() {
        let filter = default_filter();
        assert_eq!(filter.check("Opt", 0.04), Err(Rejection::LowConfidence));
        assert_eq!(filter.check("Opt", 0.05), Ok(()));
    }

    #[test]
    fn test_apply_trims_text() {
        let kept = default_filter()
            .apply(rect(0.0, 0.0, 10.0, 10.0, "  Counterspell \n", 0.9))
            .unwrap();
        assert_eq!(kept.text(), "Counterspell");
    }

    #[test]
    fn test_whitespace_padding_does_not_pass_length_check() {
        assert!(default_filter()
            .apply(rect(0.0, 0.0, 10.0, 10.0, "  ab  ", 0.9))
            .is_none());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let input = vec![
            rect(0.0, 0.0, 10.0, 10.0, "Lightning", 0.9),
            rect(0.0, 20.0, 10.0, 10.0, "{1}{R}", 0.9),
            rect(0.0, 40.0, 10.0, 10.0, " Bolt ", 0.9),
            rect(0.0, 60.0, 10.0, 10.0, "tap", 0.9),
            rect(0.0, 80.0, 10.0, 10.0, "Shock", 0.01),
            rect(0.0, 90.0, 10.0, 10.0, "42", 0.9),
        ];
        let filter = default_filter();
        let once = filter.filter(input);
        let twice = filter.filter(once.clone());
        assert_eq!(once, twice);
        let texts: Vec<&str> = once.iter().map(|d| d.text()).collect();
        assert_eq!(texts, vec!["Lightning", "Bolt"]);
    }

    #[test]
    fn test_custom_stoplist() {
        let config = PipelineConfig {
            noise_stoplist: vec!["Creatures".to_string()],
            ..Default::default()
        };
        let filter = DetectionFilter::new(&config);
        assert_eq!(filter.check("creatures", 0.9), Err(Rejection::Stoplisted));
        assert_eq!(filter.check("deck", 0.9), Ok(()));
    }
}
