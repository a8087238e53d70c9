//! Field-value generation.
//!
//! Per-field precedence: pre-answered lookup (exact or fuzzy label match,
//! used verbatim) first, then one batched LLM call for every remaining
//! field. Pre-answered fields never invoke the LLM, which bounds cost per
//! application. Everything that comes back from the model is validated
//! against the field type before it is eligible to be written; invalid
//! values are dropped with a warning, never written as garbage.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::ai::{FieldValueAi, FieldValueRequest};
use crate::types::field::{ExtractedField, FieldKind};
use crate::types::fill::{FieldValue, FieldValues};
use crate::types::profile::UserProfile;

/// Prompt for answering a batch of application form fields.
pub const ANSWER_FIELDS_PROMPT: &str = r#"You are filling out a job application form on behalf of a candidate.

Job description:
{job}

Candidate profile:
{profile}

Form fields:
{fields}

Rules:
- Answer every field by its exact "name" key.
- For radio and select fields, return EXACTLY ONE of the listed option values.
- For checkbox fields, return a JSON array of option values (may be empty).
- For free-text fields, respect the length limit when one is given.
- Use only information from the profile; leave a field as "" if the profile
  has no basis for an answer.

Output a single JSON object mapping field name to value:
{"field_name": "value", "checkbox_field": ["a", "b"]}"#;

/// Generates values for extracted fields.
pub struct FieldValueGenerator<A> {
    ai: A,
}

impl<A: FieldValueAi> FieldValueGenerator<A> {
    pub fn new(ai: A) -> Self {
        Self { ai }
    }

    /// Produce a value per field from the pre-answered map and, for
    /// whatever remains, one batched LLM call.
    pub async fn generate(
        &self,
        fields: &[ExtractedField],
        profile: &UserProfile,
        job_description: &str,
    ) -> Result<FieldValues> {
        let mut values = FieldValues::new();
        let mut remaining: Vec<ExtractedField> = Vec::new();

        for field in fields {
            // File inputs are handled by the filler from the profile's
            // resume path, not generated.
            if field.kind == FieldKind::File {
                continue;
            }

            match profile.pre_answered_for(&field.label) {
                Some(answer) => {
                    match validate_value(field, &Value::String(answer.to_string())) {
                        Some(value) => {
                            values.insert(field.name.clone(), value);
                        }
                        None => {
                            warn!(
                                field = %field.name,
                                "pre-answered value does not fit field, deferring to LLM"
                            );
                            remaining.push(field.clone());
                        }
                    }
                }
                None => remaining.push(field.clone()),
            }
        }

        debug!(
            pre_answered = values.len(),
            llm = remaining.len(),
            "field value sources resolved"
        );

        if remaining.is_empty() {
            return Ok(values);
        }

        let answers = self
            .ai
            .answer_fields(FieldValueRequest {
                fields: &remaining,
                job_description,
                profile_summary: &profile.summary,
            })
            .await?;

        for field in &remaining {
            let Some(raw) = answers.get(&field.name) else {
                warn!(field = %field.name, "LLM returned no value for field");
                continue;
            };
            match validate_value(field, raw) {
                Some(value) => {
                    values.insert(field.name.clone(), value);
                }
                None => {
                    warn!(field = %field.name, "dropping invalid LLM value");
                }
            }
        }

        Ok(values)
    }
}

/// Format the field list for the batched prompt.
pub fn format_fields_block(fields: &[ExtractedField]) -> String {
    fields
        .iter()
        .map(|f| {
            let mut line = format!("- name: {} | label: {} | kind: {:?}", f.name, f.label, f.kind);
            if !f.options.is_empty() {
                let opts: Vec<&str> = f.options.iter().map(|o| o.value.as_str()).collect();
                line.push_str(&format!(" | options: [{}]", opts.join(", ")));
            }
            if let Some(max) = f.max_length {
                line.push_str(&format!(" | max_length: {}", max));
            }
            if f.required {
                line.push_str(" | required");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the full prompt for a request.
pub fn format_answer_prompt(request: &FieldValueRequest<'_>) -> String {
    ANSWER_FIELDS_PROMPT
        .replace("{job}", request.job_description)
        .replace("{profile}", request.profile_summary)
        .replace("{fields}", &format_fields_block(request.fields))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[\d\s().-]{7,20}$").unwrap())
}

/// Validate a raw value against the field's type and options. Returns the
/// normalized value, or None when it must not be written.
pub fn validate_value(field: &ExtractedField, raw: &Value) -> Option<FieldValue> {
    match field.kind {
        FieldKind::Checkbox => {
            let items: Vec<String> = match raw {
                Value::Array(arr) => arr
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
                Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
                _ => return None,
            };
            let valid: Vec<String> = items
                .into_iter()
                .filter_map(|v| canonical_option(field, &v))
                .collect();
            (!valid.is_empty()).then_some(FieldValue::Many(valid))
        }
        FieldKind::Radio | FieldKind::Select => {
            let s = raw.as_str()?.trim();
            canonical_option(field, s).map(FieldValue::Single)
        }
        FieldKind::Email => {
            let s = raw.as_str()?.trim();
            email_regex()
                .is_match(s)
                .then(|| FieldValue::Single(s.to_string()))
        }
        FieldKind::Phone => {
            let s = raw.as_str()?.trim();
            phone_regex()
                .is_match(s)
                .then(|| FieldValue::Single(s.to_string()))
        }
        FieldKind::Number => {
            let s = value_to_string(raw)?;
            s.trim()
                .parse::<f64>()
                .is_ok()
                .then(|| FieldValue::Single(s.trim().to_string()))
        }
        _ => {
            let s = value_to_string(raw)?;
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            let truncated = match field.max_length {
                Some(max) if s.chars().count() > max => s.chars().take(max).collect(),
                _ => s.to_string(),
            };
            Some(FieldValue::Single(truncated))
        }
    }
}

/// Resolve a value to the declared option's canonical submit value,
/// matching value or label case-insensitively.
fn canonical_option(field: &ExtractedField, value: &str) -> Option<String> {
    let needle = value.trim().to_lowercase();
    field
        .options
        .iter()
        .find(|o| {
            o.value.trim().to_lowercase() == needle || o.label.trim().to_lowercase() == needle
        })
        .map(|o| o.value.clone())
}

fn value_to_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFieldAi;
    use crate::types::field::FieldOption;
    use serde_json::json;

    fn email_field() -> ExtractedField {
        ExtractedField::new("email", "Email address", FieldKind::Email)
    }

    fn radio_field() -> ExtractedField {
        ExtractedField::new("visa", "Require sponsorship?", FieldKind::Radio).with_options(vec![
            FieldOption::new("yes", "Yes"),
            FieldOption::new("no", "No"),
        ])
    }

    #[test]
    fn validates_email_format() {
        let field = email_field();
        assert!(validate_value(&field, &json!("ada@example.com")).is_some());
        assert!(validate_value(&field, &json!("not-an-email")).is_none());
    }

    #[test]
    fn validates_phone_format() {
        let field = ExtractedField::new("phone", "Phone", FieldKind::Phone);
        assert!(validate_value(&field, &json!("+1 (555) 010-0100")).is_some());
        assert!(validate_value(&field, &json!("call me maybe")).is_none());
    }

    #[test]
    fn radio_values_must_match_declared_options() {
        let field = radio_field();
        assert_eq!(
            validate_value(&field, &json!("YES")),
            Some(FieldValue::Single("yes".to_string()))
        );
        assert!(validate_value(&field, &json!("probably")).is_none());
    }

    #[test]
    fn checkbox_values_filter_to_declared_options() {
        let field = ExtractedField::new("langs", "Languages", FieldKind::Checkbox).with_options(
            vec![FieldOption::new("rust", "Rust"), FieldOption::new("go", "Go")],
        );
        assert_eq!(
            validate_value(&field, &json!(["Rust", "cobol", "go"])),
            Some(FieldValue::Many(vec!["rust".to_string(), "go".to_string()]))
        );
        assert!(validate_value(&field, &json!(["cobol"])).is_none());
    }

    #[test]
    fn free_text_truncated_to_max_length() {
        let mut field = ExtractedField::new("why", "Why us?", FieldKind::Textarea);
        field.max_length = Some(5);
        assert_eq!(
            validate_value(&field, &json!("a very long answer")),
            Some(FieldValue::Single("a ver".to_string()))
        );
    }

    #[tokio::test]
    async fn pre_answered_fields_never_reach_the_llm() {
        let mut profile = UserProfile::default();
        profile
            .pre_answered
            .insert("Email address".to_string(), "ada@example.com".to_string());

        let ai = MockFieldAi::new();
        let generator = FieldValueGenerator::new(ai.clone());

        let values = generator
            .generate(&[email_field()], &profile, "Engineer role")
            .await
            .unwrap();

        assert_eq!(
            values.get("email"),
            Some(&FieldValue::Single("ada@example.com".to_string()))
        );
        assert_eq!(ai.call_count(), 0);
    }

    #[tokio::test]
    async fn remaining_fields_batched_into_one_call() {
        let ai = MockFieldAi::new()
            .with_answer("email", json!("ada@example.com"))
            .with_answer("visa", json!("no"));
        let generator = FieldValueGenerator::new(ai.clone());

        let values = generator
            .generate(
                &[email_field(), radio_field()],
                &UserProfile::default(),
                "Engineer role",
            )
            .await
            .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(ai.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_llm_values_are_dropped() {
        let ai = MockFieldAi::new()
            .with_answer("email", json!("garbage"))
            .with_answer("visa", json!("maybe"));
        let generator = FieldValueGenerator::new(ai.clone());

        let values = generator
            .generate(
                &[email_field(), radio_field()],
                &UserProfile::default(),
                "Engineer role",
            )
            .await
            .unwrap();

        assert!(values.is_empty());
    }
}
