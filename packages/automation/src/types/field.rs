//! Extracted form field types.
//!
//! `ExtractedField` is transient: it lives for one job execution and is
//! never persisted. Radio and checkbox inputs sharing a `name` attribute
//! are collapsed into one logical field with an enumerated option list.

use serde::{Deserialize, Serialize};

/// The kind of form control behind a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Number,
    Url,
    Date,
    Textarea,
    Select,
    Radio,
    Checkbox,
    File,
}

impl FieldKind {
    /// Whether this field is a grouped choice control.
    pub fn is_grouped(&self) -> bool {
        matches!(self, FieldKind::Radio | FieldKind::Checkbox)
    }

    /// Whether this field enumerates its legal values.
    pub fn has_options(&self) -> bool {
        matches!(self, FieldKind::Select | FieldKind::Radio | FieldKind::Checkbox)
    }
}

/// One selectable option of a select/radio/checkbox field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// The value submitted with the form
    pub value: String,
    /// The human-visible text
    pub label: String,
}

impl FieldOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A single logical form field extracted from the application page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    /// The `name` attribute (or id fallback) identifying the field
    pub name: String,

    /// Human label derived from `<label>`, aria-label, or placeholder
    pub label: String,

    /// Control kind
    pub kind: FieldKind,

    /// Candidate CSS selectors, highest priority first (3-6 entries)
    pub selectors: Vec<String>,

    /// Value present on the page at extraction time
    pub current_value: Option<String>,

    /// Legal values for select/radio/checkbox fields
    pub options: Vec<FieldOption>,

    /// Marked required in the DOM
    pub required: bool,

    /// `maxlength` hint for free-text fields
    pub max_length: Option<usize>,

    /// Group key for radio/checkbox sets (the shared `name`)
    pub group_key: Option<String>,
}

impl ExtractedField {
    /// Create a minimal field; selectors and options added by the extractor.
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            selectors: Vec::new(),
            current_value: None,
            options: Vec::new(),
            required: false,
            max_length: None,
            group_key: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = options;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether `value` is among this field's declared options
    /// (case-insensitive, matching either option value or label).
    pub fn accepts_option(&self, value: &str) -> bool {
        let needle = value.trim().to_lowercase();
        self.options.iter().any(|o| {
            o.value.trim().to_lowercase() == needle || o.label.trim().to_lowercase() == needle
        })
    }
}

/// The result of extracting a page's application form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedForm {
    /// Logical fields, in document order
    pub fields: Vec<ExtractedField>,

    /// A CAPTCHA widget is present on the page
    pub captcha_detected: bool,

    /// Selector of the form's submit control, when one was found
    pub submit_selector: Option<String>,
}

impl ExtractedForm {
    /// An extraction that found nothing. Callers decide whether this is a
    /// form-not-found condition.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields marked required in the DOM.
    pub fn required_fields(&self) -> impl Iterator<Item = &ExtractedField> {
        self.fields.iter().filter(|f| f.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_option_matches_value_and_label_case_insensitive() {
        let field = ExtractedField::new("visa", "Require sponsorship?", FieldKind::Radio)
            .with_options(vec![
                FieldOption::new("yes", "Yes"),
                FieldOption::new("no", "No"),
            ]);

        assert!(field.accepts_option("YES"));
        assert!(field.accepts_option("no"));
        assert!(!field.accepts_option("maybe"));
    }

    #[test]
    fn grouped_kinds() {
        assert!(FieldKind::Radio.is_grouped());
        assert!(FieldKind::Checkbox.is_grouped());
        assert!(!FieldKind::Select.is_grouped());
        assert!(FieldKind::Select.has_options());
    }
}
