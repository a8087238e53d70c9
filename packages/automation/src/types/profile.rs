//! User profile types consumed by value generation and recipe replay.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user-curated canned answer for a recurring application question.
pub type PreAnswered = HashMap<String, String>;

/// The applicant profile, fetched fresh per job execution.
///
/// Stored as structured JSON so recipe templates can address any part of
/// it with a dotted path (`{{personal.email}}`, `{{experience.0.title}}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Structured profile document (personal info, experience, education)
    pub data: Value,

    /// Canned answers keyed by normalized question text
    #[serde(default)]
    pub pre_answered: PreAnswered,

    /// Short free-text summary used in LLM prompts
    #[serde(default)]
    pub summary: String,

    /// Path to the resume file for upload steps
    #[serde(default)]
    pub resume_path: Option<String>,
}

impl UserProfile {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_pre_answered(mut self, pre_answered: PreAnswered) -> Self {
        self.pre_answered = pre_answered;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Resolve a dotted path (`personal.email`, `experience.0.company`)
    /// against the profile document. Arrays are addressed by index.
    pub fn lookup(&self, path: &str) -> Option<String> {
        let mut node = &self.data;
        for segment in path.split('.') {
            node = match node {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match node {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Find a canned answer by normalized question text, exact match first
    /// then containment either way.
    pub fn pre_answered_for(&self, question: &str) -> Option<&str> {
        let normalized = normalize_question(question);
        if normalized.is_empty() {
            return None;
        }

        if let Some((_, answer)) = self
            .pre_answered
            .iter()
            .find(|(q, _)| normalize_question(q) == normalized)
        {
            return Some(answer.as_str());
        }

        self.pre_answered
            .iter()
            .find(|(q, _)| {
                let candidate = normalize_question(q);
                !candidate.is_empty()
                    && (candidate.contains(&normalized) || normalized.contains(&candidate))
            })
            .map(|(_, answer)| answer.as_str())
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_question(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> UserProfile {
        UserProfile::new(json!({
            "personal": {
                "first_name": "Ada",
                "email": "ada@example.com",
                "phone": "+1 555 0100"
            },
            "experience": [
                {"title": "Engineer", "company": "Analytical"}
            ]
        }))
    }

    #[test]
    fn lookup_resolves_nested_paths() {
        let p = profile();
        assert_eq!(p.lookup("personal.email").as_deref(), Some("ada@example.com"));
        assert_eq!(p.lookup("experience.0.company").as_deref(), Some("Analytical"));
        assert_eq!(p.lookup("personal.missing"), None);
        assert_eq!(p.lookup("experience.9.title"), None);
    }

    #[test]
    fn pre_answered_matches_fuzzily() {
        let mut pre = PreAnswered::new();
        pre.insert(
            "Are you authorized to work in the US?".to_string(),
            "Yes".to_string(),
        );
        let p = profile().with_pre_answered(pre);

        assert_eq!(
            p.pre_answered_for("are you authorized to work in the us"),
            Some("Yes")
        );
        // Containment either way
        assert_eq!(p.pre_answered_for("Authorized to work in the US?"), Some("Yes"));
        assert_eq!(p.pre_answered_for("Desired salary"), None);
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(
            normalize_question("  Are you... LEGALLY-authorized? "),
            "are you legally authorized"
        );
    }
}
