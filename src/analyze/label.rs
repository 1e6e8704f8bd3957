// src/analyze/label.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized classification of one item.
///
/// `Failed` is not a classification: it marks that none could be obtained and is never
/// cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Factual,
    Misinformation,
    Opinion,
    Unknown,
    Failed,
}

impl Label {
    /// Maps a service label string onto the closed set; anything unrecognized is `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "factual" | "fact" => Label::Factual,
            "misinformation" | "misinfo" => Label::Misinformation,
            "opinion" => Label::Opinion,
            _ => Label::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Factual => "factual",
            Label::Misinformation => "misinformation",
            Label::Opinion => "opinion",
            Label::Unknown => "unknown",
            Label::Failed => "failed",
        }
    }

    /// Decodes a persisted cache value. `failed` is never persisted, so it is rejected.
    pub fn from_stored(raw: &str) -> Option<Self> {
        match raw {
            "factual" => Some(Label::Factual),
            "misinformation" => Some(Label::Misinformation),
            "opinion" => Some(Label::Opinion),
            "unknown" => Some(Label::Unknown),
            _ => None,
        }
    }

    pub fn is_cacheable(self) -> bool {
        self != Label::Failed
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_and_whitespace_tolerant() {
        assert_eq!(Label::normalize(" Factual "), Label::Factual);
        assert_eq!(Label::normalize("MISINFORMATION"), Label::Misinformation);
        assert_eq!(Label::normalize("opinion"), Label::Opinion);
        assert_eq!(Label::normalize("satire"), Label::Unknown);
        assert_eq!(Label::normalize(""), Label::Unknown);
    }

    #[test]
    fn failed_is_not_storable() {
        assert!(!Label::Failed.is_cacheable());
        assert_eq!(Label::from_stored("failed"), None);
        for l in [Label::Factual, Label::Misinformation, Label::Opinion, Label::Unknown] {
            assert!(l.is_cacheable());
            assert_eq!(Label::from_stored(l.as_str()), Some(l));
        }
    }
}
