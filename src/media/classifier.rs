use super::types::{MediaKind, MediaReference};
use crate::error::ClassificationError;
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_DOMAIN: &str = "tidal.com";

static DEFAULT_CLASSIFIER: Lazy<UrlClassifier> = Lazy::new(|| {
    UrlClassifier::new(DEFAULT_DOMAIN).expect("built-in URL patterns are valid")
});

/// Classify `input` against the default Tidal URL patterns.
pub fn classify(input: &str) -> Result<MediaReference, ClassificationError> {
    DEFAULT_CLASSIFIER.classify(input)
}

/// Ordered (kind, pattern) list, evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    patterns: Vec<(MediaKind, Regex)>,
}

impl UrlClassifier {
    pub fn new(domain: &str) -> Result<Self, regex::Error> {
        let domain = regex::escape(domain);
        let patterns = MediaKind::ORDERED
            .iter()
            .map(|kind| {
                let pattern = format!(
                    r"{}/(?:browse/)?{}/({})",
                    domain,
                    kind.as_str(),
                    kind.id_pattern()
                );
                Regex::new(&pattern).map(|re| (*kind, re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn classify(&self, input: &str) -> Result<MediaReference, ClassificationError> {
        for (kind, pattern) in &self.patterns {
            if let Some(id) = pattern.captures(input).and_then(|caps| caps.get(1)) {
                return Ok(MediaReference::new(*kind, id.as_str()));
            }
        }

        // Bare numeric IDs default to tracks
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Ok(MediaReference::new(MediaKind::Track, trimmed));
        }

        Err(ClassificationError::unrecognized(input))
    }
}

impl Default for UrlClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}
