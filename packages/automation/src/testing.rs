//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the automation
//! library without a real browser or AI provider. All mocks share state
//! through `Arc` so a cloned handle observes mutations made through the
//! trait object.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{BrowserError, BrowserResult, Result};
use crate::traits::ai::{FieldValueAi, FieldValueRequest};
use crate::traits::browser::{Browser, BrowserPage, BrowserProvider};

/// A simulated DOM element registered on a [`MockPage`].
#[derive(Debug, Clone)]
pub struct MockElement {
    kind: MockElementKind,
    value: Option<String>,
    checked: bool,
    clicked: bool,
    uploaded: Option<String>,
    options: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockElementKind {
    Text,
    Checkable,
    Clickable,
    Select,
    File,
}

impl MockElement {
    fn blank(kind: MockElementKind) -> Self {
        Self {
            kind,
            value: None,
            checked: false,
            clicked: false,
            uploaded: None,
            options: Vec::new(),
        }
    }

    /// A text-like input that accepts `set_value`.
    pub fn text_input() -> Self {
        Self::blank(MockElementKind::Text)
    }

    /// A radio or checkbox input that accepts `set_checked`.
    pub fn checkable() -> Self {
        Self::blank(MockElementKind::Checkable)
    }

    /// A button or link that accepts `click`.
    pub fn clickable() -> Self {
        Self::blank(MockElementKind::Clickable)
    }

    /// A select element with (value, visible text) options.
    pub fn select(options: Vec<(&str, &str)>) -> Self {
        let mut element = Self::blank(MockElementKind::Select);
        element.options = options
            .into_iter()
            .map(|(v, t)| (v.to_string(), t.to_string()))
            .collect();
        element
    }

    /// A file input that accepts `upload`.
    pub fn file_input() -> Self {
        Self::blank(MockElementKind::File)
    }
}

/// A mock page holding an in-memory DOM of registered elements.
///
/// Actions against unregistered selectors fail with `SelectorNotFound`,
/// which is exactly how stale recipes and wrong fallback selectors
/// surface against a real page.
#[derive(Default, Clone)]
pub struct MockPage {
    elements: Arc<RwLock<HashMap<String, MockElement>>>,
    html: Arc<RwLock<String>>,
    navigated: Arc<RwLock<Vec<String>>>,
    navigate_error: Arc<RwLock<Option<String>>>,
    crash_selectors: Arc<RwLock<HashSet<String>>>,
    screenshots: Arc<AtomicUsize>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element under a selector.
    pub fn with_element(self, selector: impl Into<String>, element: MockElement) -> Self {
        self.elements
            .write()
            .unwrap()
            .insert(selector.into(), element);
        self
    }

    /// Set the HTML returned by `content`.
    pub fn with_html(self, html: impl Into<String>) -> Self {
        *self.html.write().unwrap() = html.into();
        self
    }

    /// Make every `navigate` fail with a page-load timeout.
    pub fn with_navigate_timeout(self) -> Self {
        *self.navigate_error.write().unwrap() = Some("timeout".to_string());
        self
    }

    /// Make every action against `selector` fail as a browser crash.
    /// The element stays visible to `exists`, so the failure surfaces
    /// mid-interaction rather than as a missing selector.
    pub fn with_crash_on(self, selector: impl Into<String>) -> Self {
        self.crash_selectors.write().unwrap().insert(selector.into());
        self
    }

    /// Current value of an element, if any was set.
    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.elements
            .read()
            .unwrap()
            .get(selector)
            .and_then(|e| e.value.clone())
    }

    /// Whether a checkable element is currently checked.
    pub fn is_checked(&self, selector: &str) -> bool {
        self.elements
            .read()
            .unwrap()
            .get(selector)
            .map(|e| e.checked)
            .unwrap_or(false)
    }

    /// Whether an element was clicked at least once.
    pub fn was_clicked(&self, selector: &str) -> bool {
        self.elements
            .read()
            .unwrap()
            .get(selector)
            .map(|e| e.clicked)
            .unwrap_or(false)
    }

    /// Path last uploaded to a file input.
    pub fn uploaded_to(&self, selector: &str) -> Option<String> {
        self.elements
            .read()
            .unwrap()
            .get(selector)
            .and_then(|e| e.uploaded.clone())
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigated.read().unwrap().clone()
    }

    /// Number of screenshots captured.
    pub fn screenshot_count(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    fn mutate<T>(
        &self,
        selector: &str,
        f: impl FnOnce(&mut MockElement) -> T,
    ) -> BrowserResult<T> {
        if self.crash_selectors.read().unwrap().contains(selector) {
            return Err(BrowserError::Crashed(format!(
                "mock crash interacting with {}",
                selector
            )));
        }
        let mut elements = self.elements.write().unwrap();
        match elements.get_mut(selector) {
            Some(element) => Ok(f(element)),
            None => Err(BrowserError::SelectorNotFound {
                selector: selector.to_string(),
            }),
        }
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        if self.navigate_error.read().unwrap().is_some() {
            return Err(BrowserError::PageLoadTimeout {
                url: url.to_string(),
            });
        }
        self.navigated.write().unwrap().push(url.to_string());
        Ok(())
    }

    async fn content(&self) -> BrowserResult<String> {
        Ok(self.html.read().unwrap().clone())
    }

    async fn exists(&self, selector: &str) -> BrowserResult<bool> {
        Ok(self.elements.read().unwrap().contains_key(selector))
    }

    async fn set_value(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.mutate(selector, |e| e.value = Some(value.to_string()))
    }

    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<bool> {
        self.mutate(selector, |e| {
            if e.kind == MockElementKind::Select && e.options.iter().any(|(v, _)| v == value) {
                e.value = Some(value.to_string());
                true
            } else {
                false
            }
        })
    }

    async fn options_of(&self, selector: &str) -> BrowserResult<Vec<(String, String)>> {
        self.mutate(selector, |e| e.options.clone())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> BrowserResult<()> {
        self.mutate(selector, |e| e.checked = checked)
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.mutate(selector, |e| e.clicked = true)
    }

    async fn upload(&self, selector: &str, path: &str) -> BrowserResult<()> {
        self.mutate(selector, |e| e.uploaded = Some(path.to_string()))
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        // Minimal valid PNG signature is enough for callers that only
        // persist the bytes.
        Ok(vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self
            .navigated
            .read()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }
}

/// A mock browser whose pages all share one [`MockPage`] state, so tests
/// can assert against the page after the code under test dropped its
/// handle.
#[derive(Clone)]
pub struct MockBrowser {
    page: MockPage,
    closed: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl MockBrowser {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Crashed("browser already closed".to_string()));
        }
        Ok(Box::new(self.page.clone()))
    }

    async fn close(&self) -> BrowserResult<()> {
        // Idempotent; only the first close decrements the live count.
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A mock provider that hands out [`MockBrowser`] instances backed by a
/// configured page, tracking how many are live for leak assertions.
#[derive(Default, Clone)]
pub struct MockBrowserProvider {
    page: Arc<RwLock<MockPage>>,
    active: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
    launch_error: Arc<AtomicBool>,
}

impl MockBrowserProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back every acquired browser with this page.
    pub fn with_page(self, page: MockPage) -> Self {
        *self.page.write().unwrap() = page;
        self
    }

    /// Make every `acquire` fail with a launch error.
    pub fn failing_launch(self) -> Self {
        self.launch_error.store(true, Ordering::SeqCst);
        self
    }

    /// Total number of successful acquisitions.
    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserProvider for MockBrowserProvider {
    async fn acquire(&self) -> BrowserResult<Box<dyn Browser>> {
        if self.launch_error.load(Ordering::SeqCst) {
            return Err(BrowserError::Launch("mock launch failure".to_string()));
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBrowser {
            page: self.page.read().unwrap().clone(),
            closed: Arc::new(AtomicBool::new(false)),
            active: Arc::clone(&self.active),
        }))
    }

    fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// A mock AI implementation for field-value generation.
///
/// Returns predefined answers keyed by field name and tracks calls for
/// assertions about batching.
#[derive(Default, Clone)]
pub struct MockFieldAi {
    answers: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    failure: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<Vec<String>>>>,
}

impl MockFieldAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined answer for a field name.
    pub fn with_answer(self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.answers.write().unwrap().insert(field.into(), value);
        self
    }

    /// Make every call fail as an AI service error.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.write().unwrap() = Some(message.into());
        self
    }

    /// Number of `answer_fields` calls made.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Field names requested per call, in order.
    pub fn requested_fields(&self) -> Vec<Vec<String>> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl FieldValueAi for MockFieldAi {
    async fn answer_fields(
        &self,
        request: FieldValueRequest<'_>,
    ) -> Result<HashMap<String, serde_json::Value>> {
        self.calls
            .write()
            .unwrap()
            .push(request.fields.iter().map(|f| f.name.clone()).collect());

        if let Some(message) = self.failure.read().unwrap().clone() {
            return Err(crate::error::AutomationError::Ai(message.into()));
        }

        let answers = self.answers.read().unwrap();
        Ok(request
            .fields
            .iter()
            .filter_map(|f| answers.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_selector_fails_actions_but_not_exists() {
        let page = MockPage::new();
        assert!(!page.exists("#nope").await.unwrap());
        assert!(matches!(
            page.set_value("#nope", "x").await,
            Err(BrowserError::SelectorNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn select_option_only_matches_exact_values() {
        let page = MockPage::new()
            .with_element("#s", MockElement::select(vec![("a", "Alpha"), ("b", "Beta")]));
        assert!(page.select_option("#s", "b").await.unwrap());
        assert!(!page.select_option("#s", "Beta").await.unwrap());
        assert_eq!(page.value_of("#s").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn provider_counts_live_browsers() {
        let provider = MockBrowserProvider::new();
        let browser = provider.acquire().await.unwrap();
        assert_eq!(provider.active_count(), 1);

        browser.close().await.unwrap();
        browser.close().await.unwrap();
        assert_eq!(provider.active_count(), 0);
        assert_eq!(provider.acquire_count(), 1);
    }

    #[tokio::test]
    async fn mock_ai_returns_only_requested_fields() {
        use crate::types::field::{ExtractedField, FieldKind};

        let ai = MockFieldAi::new()
            .with_answer("email", serde_json::json!("a@b.c"))
            .with_answer("extra", serde_json::json!("unused"));
        let fields = vec![ExtractedField::new("email", "Email", FieldKind::Email)];
        let answers = ai
            .answer_fields(FieldValueRequest {
                fields: &fields,
                job_description: "",
                profile_summary: "",
            })
            .await
            .unwrap();

        assert_eq!(answers.len(), 1);
        assert_eq!(ai.call_count(), 1);
        assert_eq!(ai.requested_fields(), vec![vec!["email".to_string()]]);
    }
}
