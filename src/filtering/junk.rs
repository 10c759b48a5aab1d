// Junk passage detection
// Navigation labels, bylines and community-forum furniture crowd out real
// content in nearest-neighbour results, so they are dropped before ranking.
use regex::Regex;

use crate::config::FiltersConfig;
use crate::error::{KbError, Result};
use crate::filtering::text::{char_len, normalize};

/// Low-value passage detector
#[derive(Debug, Clone)]
pub struct JunkFilter {
    /// Passages shorter than this (in chars, after normalization) are junk
    min_chars: usize,
    /// All boilerplate patterns compiled into one alternation
    pattern: Option<Regex>,
}

impl JunkFilter {
    /// Compile a filter from a minimum length and boilerplate patterns
    pub fn new(min_chars: usize, patterns: &[String]) -> Result<Self> {
        let pattern = if patterns.is_empty() {
            None
        } else {
            let joined = patterns
                .iter()
                .map(|p| format!("(?:{})", p))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&joined).map_err(|e| KbError::InvalidConfigValue {
                path: "filters.junk_patterns".to_string(),
                message: e.to_string(),
            })?;
            Some(regex)
        };

        Ok(Self { min_chars, pattern })
    }

    pub fn from_config(config: &FiltersConfig) -> Result<Self> {
        Self::new(config.min_chars, &config.junk_patterns)
    }

    /// True when the passage is too short or matches a boilerplate pattern
    pub fn is_junk(&self, text: &str) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() || char_len(&normalized) < self.min_chars {
            return true;
        }

        self.pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&normalized))
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }
}
