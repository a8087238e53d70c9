//! Form field extraction from a live application page.
//!
//! The extractor pulls the page HTML through the browser seam, then parses
//! it synchronously with `scraper` CSS selectors. It enumerates every
//! input/select/textarea plus file-upload widgets, derives a human label
//! per field, groups radio/checkbox inputs sharing a `name` into one
//! logical field with an enumerated option list, and generates a ranked
//! list of candidate selectors per field. CAPTCHA presence is reported as
//! a flag for callers to branch on before attempting a fill.
//!
//! Finding zero fields is not an error; the caller decides whether an
//! empty form is a form-not-found condition.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::Result;
use crate::traits::browser::BrowserPage;
use crate::types::field::{ExtractedField, ExtractedForm, FieldKind, FieldOption};

/// Extracts the application form from a page.
#[derive(Debug, Clone, Default)]
pub struct FormExtractor;

impl FormExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the form from the page's current document.
    pub async fn extract(&self, page: &dyn BrowserPage) -> Result<ExtractedForm> {
        let html = page.content().await.map_err(crate::error::AutomationError::Browser)?;
        let form = parse_form(&html);
        debug!(
            fields = form.fields.len(),
            captcha = form.captcha_detected,
            "form extracted"
        );
        Ok(form)
    }
}

/// Parse an HTML document into an extracted form. Pure and synchronous so
/// the `scraper` DOM never crosses an await point.
pub fn parse_form(html: &str) -> ExtractedForm {
    let doc = Html::parse_document(html);

    let labels_by_for = collect_labels(&doc);

    let control_sel = Selector::parse("input, select, textarea").unwrap();

    let mut fields: Vec<ExtractedField> = Vec::new();
    // Index into `fields` for each radio/checkbox group key.
    let mut group_index: HashMap<String, usize> = HashMap::new();

    for element in doc.select(&control_sel) {
        let tag = element.value().name();
        let input_type = element
            .value()
            .attr("type")
            .unwrap_or(if tag == "input" { "text" } else { tag })
            .to_lowercase();

        if matches!(input_type.as_str(), "hidden" | "submit" | "button" | "reset" | "image") {
            continue;
        }

        let name = match element
            .value()
            .attr("name")
            .or_else(|| element.value().attr("id"))
        {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => continue,
        };

        let kind = field_kind(tag, &input_type);

        if kind.is_grouped() {
            let value = element.value().attr("value").unwrap_or("on").to_string();
            let option_label = option_label_for(&element, &labels_by_for)
                .unwrap_or_else(|| value.clone());

            match group_index.get(&name) {
                Some(&idx) => {
                    fields[idx]
                        .options
                        .push(FieldOption::new(value, option_label));
                }
                None => {
                    let mut field = build_field(&element, &name, kind, &labels_by_for);
                    field.group_key = Some(name.clone());
                    field.options.push(FieldOption::new(value, option_label));
                    group_index.insert(name.clone(), fields.len());
                    fields.push(field);
                }
            }
            continue;
        }

        let mut field = build_field(&element, &name, kind, &labels_by_for);

        if kind == FieldKind::Select {
            field.options = select_options(&element);
            field.current_value = selected_value(&element);
        } else {
            field.current_value = element
                .value()
                .attr("value")
                .filter(|v| !v.is_empty())
                .map(String::from);
        }

        fields.push(field);
    }

    ExtractedForm {
        fields,
        captcha_detected: detect_captcha(&doc),
        submit_selector: find_submit(&doc),
    }
}

fn field_kind(tag: &str, input_type: &str) -> FieldKind {
    match tag {
        "select" => FieldKind::Select,
        "textarea" => FieldKind::Textarea,
        _ => match input_type {
            "email" => FieldKind::Email,
            "tel" => FieldKind::Phone,
            "number" => FieldKind::Number,
            "url" => FieldKind::Url,
            "date" => FieldKind::Date,
            "radio" => FieldKind::Radio,
            "checkbox" => FieldKind::Checkbox,
            "file" => FieldKind::File,
            _ => FieldKind::Text,
        },
    }
}

fn build_field(
    element: &ElementRef<'_>,
    name: &str,
    kind: FieldKind,
    labels_by_for: &HashMap<String, String>,
) -> ExtractedField {
    let label = derive_label(element, labels_by_for)
        .unwrap_or_else(|| prettify_name(name));

    let mut field = ExtractedField::new(name, label, kind);
    field.required = element.value().attr("required").is_some()
        || element.value().attr("aria-required") == Some("true");
    field.max_length = element
        .value()
        .attr("maxlength")
        .and_then(|v| v.parse().ok());
    field.selectors = candidate_selectors(element, name, kind);
    field
}

/// Generate 3-6 candidate selectors for a field, highest priority first.
fn candidate_selectors(element: &ElementRef<'_>, name: &str, kind: FieldKind) -> Vec<String> {
    let tag = element.value().name();
    let escaped = css_escape(name);
    let mut selectors = vec![format!("[name=\"{}\"]", escaped)];

    if let Some(id) = element.value().attr("id").filter(|i| !i.trim().is_empty()) {
        selectors.push(format!("#{}", css_escape(id)));
    }

    selectors.push(format!("{}[name=\"{}\"]", tag, escaped));

    if let Some(input_type) = element.value().attr("type") {
        selectors.push(format!(
            "input[type=\"{}\"][name=\"{}\"]",
            input_type, escaped
        ));
    }

    if kind.is_grouped() {
        if let Some(value) = element.value().attr("value") {
            selectors.push(format!(
                "[name=\"{}\"][value=\"{}\"]",
                escaped,
                css_escape(value)
            ));
        }
    }

    if let Some(placeholder) = element.value().attr("placeholder") {
        selectors.push(format!(
            "{}[placeholder=\"{}\"]",
            tag,
            css_escape(placeholder)
        ));
    }

    selectors.truncate(6);
    selectors.dedup();
    selectors
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Map `for` attributes of label elements to their text.
fn collect_labels(doc: &Html) -> HashMap<String, String> {
    let label_sel = Selector::parse("label[for]").unwrap();
    doc.select(&label_sel)
        .filter_map(|label| {
            let target = label.value().attr("for")?.to_string();
            let text = element_text(&label);
            (!text.is_empty()).then_some((target, text))
        })
        .collect()
}

/// Derive a label: `<label for>`, wrapping `<label>`, `aria-label`, then
/// placeholder.
fn derive_label(
    element: &ElementRef<'_>,
    labels_by_for: &HashMap<String, String>,
) -> Option<String> {
    if let Some(id) = element.value().attr("id") {
        if let Some(text) = labels_by_for.get(id) {
            return Some(text.clone());
        }
    }

    if let Some(text) = wrapping_label_text(element) {
        return Some(text);
    }

    if let Some(aria) = element.value().attr("aria-label") {
        let aria = aria.trim();
        if !aria.is_empty() {
            return Some(aria.to_string());
        }
    }

    element
        .value()
        .attr("placeholder")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
}

fn wrapping_label_text(element: &ElementRef<'_>) -> Option<String> {
    let mut node = element.parent();
    while let Some(current) = node {
        if let Some(parent_el) = ElementRef::wrap(current) {
            if parent_el.value().name() == "label" {
                let text = element_text(&parent_el);
                return (!text.is_empty()).then_some(text);
            }
        }
        node = current.parent();
    }
    None
}

/// The label text used for one radio/checkbox option.
fn option_label_for(
    element: &ElementRef<'_>,
    labels_by_for: &HashMap<String, String>,
) -> Option<String> {
    derive_label(element, labels_by_for)
}

fn select_options(element: &ElementRef<'_>) -> Vec<FieldOption> {
    let option_sel = Selector::parse("option").unwrap();
    element
        .select(&option_sel)
        .filter_map(|opt| {
            let label = element_text(&opt);
            let value = opt
                .value()
                .attr("value")
                .map(String::from)
                .unwrap_or_else(|| label.clone());
            // Placeholder options carry no submittable value.
            (!value.is_empty()).then(|| FieldOption::new(value, label))
        })
        .collect()
}

fn selected_value(element: &ElementRef<'_>) -> Option<String> {
    let option_sel = Selector::parse("option[selected]").unwrap();
    element.select(&option_sel).next().map(|opt| {
        opt.value()
            .attr("value")
            .map(String::from)
            .unwrap_or_else(|| element_text(&opt))
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turn `first_name` / `applicant[email]` into a readable fallback label.
fn prettify_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

const CAPTCHA_SELECTORS: &[&str] = &[
    "iframe[src*=\"recaptcha\"]",
    "iframe[src*=\"hcaptcha\"]",
    "iframe[src*=\"turnstile\"]",
    ".g-recaptcha",
    ".h-captcha",
    ".cf-turnstile",
    "[data-sitekey]",
];

fn detect_captcha(doc: &Html) -> bool {
    CAPTCHA_SELECTORS.iter().any(|s| {
        Selector::parse(s)
            .map(|sel| doc.select(&sel).next().is_some())
            .unwrap_or(false)
    })
}

fn find_submit(doc: &Html) -> Option<String> {
    for candidate in ["button[type=\"submit\"]", "input[type=\"submit\"]", "form button"] {
        let sel = Selector::parse(candidate).ok()?;
        if doc.select(&sel).next().is_some() {
            return Some(candidate.to_string());
        }
    }
    None
}
