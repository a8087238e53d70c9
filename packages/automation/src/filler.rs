//! Form filling through the browser seam.
//!
//! Selector resolution is an explicit, ordered list of pure functions
//! `(field, value) -> Option<selector>`, evaluated in sequence with
//! short-circuit on the first selector that matches a live DOM node. The
//! extractor's own candidates rank first, then the generic fallbacks.
//!
//! Values are written by direct property assignment (the browser seam
//! dispatches synthetic `input`/`change` events), not simulated
//! keystrokes. A single field failure never aborts the pass.

use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::browser::BrowserPage;
use crate::types::field::{ExtractedField, FieldKind};
use crate::types::fill::{FieldValue, FieldValues, FillResult};

/// One way of locating a field's DOM element.
pub type SelectorStrategy = fn(&ExtractedField, Option<&str>) -> Option<String>;

/// Generic fallback strategies, in priority order. The extractor's
/// candidates are always tried before these.
pub const FALLBACK_STRATEGIES: &[SelectorStrategy] = &[
    name_attribute,
    id_attribute,
    type_qualified_name,
    value_scoped,
];

/// `[name="X"]`
pub fn name_attribute(field: &ExtractedField, _value: Option<&str>) -> Option<String> {
    Some(format!("[name=\"{}\"]", escape(&field.name)))
}

/// `#X`
pub fn id_attribute(field: &ExtractedField, _value: Option<&str>) -> Option<String> {
    Some(format!("#{}", escape(&field.name)))
}

/// `input[type="radio"][name="X"]` and friends.
pub fn type_qualified_name(field: &ExtractedField, _value: Option<&str>) -> Option<String> {
    let type_attr = match field.kind {
        FieldKind::Email => "email",
        FieldKind::Phone => "tel",
        FieldKind::Number => "number",
        FieldKind::Url => "url",
        FieldKind::Date => "date",
        FieldKind::Radio => "radio",
        FieldKind::Checkbox => "checkbox",
        FieldKind::File => "file",
        FieldKind::Text => "text",
        FieldKind::Select | FieldKind::Textarea => return None,
    };
    Some(format!(
        "input[type=\"{}\"][name=\"{}\"]",
        type_attr,
        escape(&field.name)
    ))
}

/// `[name="X"][value="V"]` for a specific radio/checkbox choice.
pub fn value_scoped(field: &ExtractedField, value: Option<&str>) -> Option<String> {
    if !field.kind.is_grouped() {
        return None;
    }
    let value = value?;
    Some(format!(
        "[name=\"{}\"][value=\"{}\"]",
        escape(&field.name),
        escape(value)
    ))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Fills extracted fields with generated values.
#[derive(Debug, Clone, Default)]
pub struct FormFiller;

impl FormFiller {
    pub fn new() -> Self {
        Self
    }

    /// Fill every field that has a value; aggregate per-field outcomes.
    pub async fn fill(
        &self,
        page: &dyn BrowserPage,
        fields: &[ExtractedField],
        values: &FieldValues,
    ) -> Result<FillResult> {
        let mut result = FillResult::default();

        for field in fields {
            let Some(value) = values.get(&field.name) else {
                result.record_skipped(field.name.clone());
                continue;
            };

            match self.fill_field(page, field, value).await {
                Ok(selector) => {
                    debug!(field = %field.name, selector = %selector, "field filled");
                    result.record_filled(field.name.clone(), selector);
                }
                Err(reason) => {
                    warn!(field = %field.name, reason = %reason, "field fill failed");
                    result.record_error(field.name.clone(), reason);
                }
            }
        }

        Ok(result)
    }

    /// Fill one field. Returns the selector that resolved, or a reason
    /// string on failure (kept as a plain string so one bad field cannot
    /// abort the pass).
    async fn fill_field(
        &self,
        page: &dyn BrowserPage,
        field: &ExtractedField,
        value: &FieldValue,
    ) -> std::result::Result<String, String> {
        match field.kind {
            FieldKind::Radio => {
                let choice = value
                    .as_single()
                    .ok_or_else(|| "radio group needs a single value".to_string())?;
                let selector = self
                    .resolve(page, field, Some(choice))
                    .await
                    .ok_or_else(|| format!("no selector matched for value {:?}", choice))?;
                page.set_checked(&selector, true)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(selector)
            }
            FieldKind::Checkbox => {
                let mut last_selector = None;
                for choice in value.values() {
                    let selector = self
                        .resolve(page, field, Some(choice))
                        .await
                        .ok_or_else(|| format!("no selector matched for value {:?}", choice))?;
                    page.set_checked(&selector, true)
                        .await
                        .map_err(|e| e.to_string())?;
                    last_selector = Some(selector);
                }
                last_selector.ok_or_else(|| "no checkbox values to set".to_string())
            }
            FieldKind::Select => {
                let choice = value
                    .as_single()
                    .ok_or_else(|| "select needs a single value".to_string())?;
                let selector = self
                    .resolve(page, field, None)
                    .await
                    .ok_or_else(|| "no selector matched".to_string())?;
                self.select_value(page, &selector, choice).await?;
                Ok(selector)
            }
            FieldKind::File => {
                let path = value
                    .as_single()
                    .ok_or_else(|| "file field needs a path".to_string())?;
                let selector = self
                    .resolve(page, field, None)
                    .await
                    .ok_or_else(|| "no selector matched".to_string())?;
                page.upload(&selector, path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(selector)
            }
            _ => {
                let text = value
                    .as_single()
                    .ok_or_else(|| "text field needs a single value".to_string())?;
                let selector = self
                    .resolve(page, field, None)
                    .await
                    .ok_or_else(|| "no selector matched".to_string())?;
                page.set_value(&selector, text)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(selector)
            }
        }
    }

    /// Try the extractor's candidates, then the fallback strategies, and
    /// return the first selector that resolves to a live node.
    pub async fn resolve(
        &self,
        page: &dyn BrowserPage,
        field: &ExtractedField,
        value: Option<&str>,
    ) -> Option<String> {
        // Value-scoped resolution first when a specific choice is wanted,
        // otherwise an unscoped candidate could land on the wrong input of
        // the group.
        if value.is_some() {
            if let Some(selector) = value_scoped(field, value) {
                if page.exists(&selector).await.unwrap_or(false) {
                    return Some(selector);
                }
            }
        }

        for selector in &field.selectors {
            if value.is_some() && field.kind.is_grouped() && !selector.contains("[value=") {
                continue;
            }
            if page.exists(selector).await.unwrap_or(false) {
                return Some(selector.clone());
            }
        }

        for strategy in FALLBACK_STRATEGIES {
            if let Some(selector) = strategy(field, value) {
                if value.is_some() && field.kind.is_grouped() && !selector.contains("[value=") {
                    continue;
                }
                if page.exists(&selector).await.unwrap_or(false) {
                    return Some(selector);
                }
            }
        }

        None
    }

    /// Select by option value first, then case-insensitive substring match
    /// on option text.
    async fn select_value(
        &self,
        page: &dyn BrowserPage,
        selector: &str,
        choice: &str,
    ) -> std::result::Result<(), String> {
        if page
            .select_option(selector, choice)
            .await
            .map_err(|e| e.to_string())?
        {
            return Ok(());
        }

        let needle = choice.to_lowercase();
        let options = page.options_of(selector).await.map_err(|e| e.to_string())?;
        let matched = options
            .iter()
            .find(|(_, text)| text.to_lowercase().contains(&needle))
            .map(|(value, _)| value.clone())
            .ok_or_else(|| format!("no option matching {:?}", choice))?;

        page.select_option(selector, &matched)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockElement, MockPage};
    use crate::types::field::FieldOption;

    fn text_field(name: &str) -> ExtractedField {
        ExtractedField::new(name, name, FieldKind::Text)
            .with_selector(format!("[name=\"{}\"]", name))
    }

    #[test]
    fn fallback_strategies_generate_expected_selectors() {
        let field = ExtractedField::new("email", "Email", FieldKind::Email);
        assert_eq!(
            name_attribute(&field, None).as_deref(),
            Some("[name=\"email\"]")
        );
        assert_eq!(id_attribute(&field, None).as_deref(), Some("#email"));
        assert_eq!(
            type_qualified_name(&field, None).as_deref(),
            Some("input[type=\"email\"][name=\"email\"]")
        );
        assert_eq!(value_scoped(&field, Some("x")), None);

        let radio = ExtractedField::new("visa", "Visa", FieldKind::Radio);
        assert_eq!(
            value_scoped(&radio, Some("yes")).as_deref(),
            Some("[name=\"visa\"][value=\"yes\"]")
        );
    }

    #[tokio::test]
    async fn resolves_first_live_selector() {
        let page = MockPage::new().with_element("#late", MockElement::text_input());
        let field = ExtractedField::new("late", "Late", FieldKind::Text)
            .with_selector("[name=\"late\"]"); // not present; #late fallback is
        let filler = FormFiller::new();

        let resolved = filler.resolve(&page, &field, None).await;
        assert_eq!(resolved.as_deref(), Some("#late"));
    }

    #[tokio::test]
    async fn fills_text_and_records_outcome() {
        let page = MockPage::new().with_element("[name=\"email\"]", MockElement::text_input());
        let filler = FormFiller::new();
        let mut values = FieldValues::new();
        values.insert("email".to_string(), "ada@example.com".into());
        values.insert("missing".to_string(), "x".into());

        let fields = vec![text_field("email"), text_field("missing"), text_field("skipped")];
        let result = filler.fill(&page, &fields, &values).await.unwrap();

        assert_eq!(result.filled_count(), 1);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(page.value_of("[name=\"email\"]").as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn radio_uses_value_scoped_selector() {
        let page = MockPage::new()
            .with_element("[name=\"visa\"][value=\"yes\"]", MockElement::checkable())
            .with_element("[name=\"visa\"][value=\"no\"]", MockElement::checkable());
        let field = ExtractedField::new("visa", "Visa", FieldKind::Radio).with_options(vec![
            FieldOption::new("yes", "Yes"),
            FieldOption::new("no", "No"),
        ]);
        let mut values = FieldValues::new();
        values.insert("visa".to_string(), "no".into());

        let result = FormFiller::new()
            .fill(&page, &[field], &values)
            .await
            .unwrap();

        assert_eq!(result.filled_count(), 1);
        assert!(page.is_checked("[name=\"visa\"][value=\"no\"]"));
        assert!(!page.is_checked("[name=\"visa\"][value=\"yes\"]"));
    }

    #[tokio::test]
    async fn select_falls_back_to_text_substring() {
        let page = MockPage::new().with_element(
            "[name=\"source\"]",
            MockElement::select(vec![
                ("li", "LinkedIn"),
                ("ref", "Employee Referral"),
            ]),
        );
        let field = ExtractedField::new("source", "Source", FieldKind::Select)
            .with_selector("[name=\"source\"]");
        let mut values = FieldValues::new();
        // Not an option value; matches "Employee Referral" by substring.
        values.insert("source".to_string(), "referral".into());

        let result = FormFiller::new()
            .fill(&page, &[field], &values)
            .await
            .unwrap();

        assert_eq!(result.filled_count(), 1);
        assert_eq!(page.value_of("[name=\"source\"]").as_deref(), Some("ref"));
    }

    #[tokio::test]
    async fn checkbox_group_sets_each_choice() {
        let page = MockPage::new()
            .with_element("[name=\"langs\"][value=\"rust\"]", MockElement::checkable())
            .with_element("[name=\"langs\"][value=\"go\"]", MockElement::checkable());
        let field = ExtractedField::new("langs", "Languages", FieldKind::Checkbox);
        let mut values = FieldValues::new();
        values.insert(
            "langs".to_string(),
            FieldValue::Many(vec!["rust".to_string(), "go".to_string()]),
        );

        let result = FormFiller::new()
            .fill(&page, &[field], &values)
            .await
            .unwrap();

        assert_eq!(result.filled_count(), 1);
        assert!(page.is_checked("[name=\"langs\"][value=\"rust\"]"));
        assert!(page.is_checked("[name=\"langs\"][value=\"go\"]"));
    }
}
