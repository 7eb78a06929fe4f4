//! Literal content policy.
//!
//! Screening is case-insensitive substring matching against a configured
//! list of banned terms, plus one image-only rule refusing depictions of real
//! people. There is no semantic analysis.

use crate::core::config::ModerationConfig;
use serde::Serialize;

/// Mode under which the real-person rule applies.
pub const IMAGE_MODE: &str = "image";

const REAL_PERSON_PHRASE: &str = "real person";
const REAL_PERSON_REASON: &str = "Real-person image generation not allowed";

/// Outcome of screening one prompt. `reason` is set iff `blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationResult {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModerationResult {
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModerationEngine {
    /// Lower-cased, non-empty, in configured order
    banned_terms: Vec<String>,
}

impl ModerationEngine {
    pub fn new<I, S>(banned_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let banned_terms = banned_terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { banned_terms }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(&config.banned_terms)
    }

    pub fn banned_terms(&self) -> &[String] {
        &self.banned_terms
    }

    /// Screen `prompt` for the given request mode.
    ///
    /// Banned terms are checked first, in configured order, and the first hit
    /// names the reason. The real-person rule only fires for [`IMAGE_MODE`].
    pub fn evaluate(&self, prompt: &str, mode: &str) -> ModerationResult {
        let lower = prompt.to_lowercase();

        if let Some(term) = self.banned_terms.iter().find(|t| lower.contains(t.as_str())) {
            return ModerationResult::blocked(format!("Disallowed content: {}", term));
        }

        if mode == IMAGE_MODE && lower.contains(REAL_PERSON_PHRASE) {
            return ModerationResult::blocked(REAL_PERSON_REASON);
        }

        ModerationResult::allowed()
    }
}

impl Default for ModerationEngine {
    fn default() -> Self {
        Self::from_config(&ModerationConfig::default())
    }
}
