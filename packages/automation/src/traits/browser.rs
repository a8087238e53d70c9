//! Browser runtime trait seam.
//!
//! The automation runtime (CDP, WebDriver, a remote browser server) sits
//! behind these traits. Every action is an async operation returning a
//! typed result so the error classifier has one normalized input shape;
//! nothing in the library ever touches a concrete browser type.

use async_trait::async_trait;

use crate::error::BrowserResult;

/// One live page within a browser session.
///
/// A page handle is owned by exactly one job execution and must not
/// outlive it.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// Full HTML content of the current document (including frames the
    /// runtime has flattened in).
    async fn content(&self) -> BrowserResult<String>;

    /// Whether a selector resolves to a live DOM node.
    async fn exists(&self, selector: &str) -> BrowserResult<bool>;

    /// Set an input/textarea value by direct property assignment and
    /// dispatch synthetic `input` and `change` events so framework-bound
    /// listeners observe the change.
    async fn set_value(&self, selector: &str, value: &str) -> BrowserResult<()>;

    /// Select an option by value; returns false when no option matched.
    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<bool>;

    /// Option (value, visible text) pairs of a select element.
    async fn options_of(&self, selector: &str) -> BrowserResult<Vec<(String, String)>>;

    /// Check a radio/checkbox input and dispatch `input`/`change`.
    async fn set_checked(&self, selector: &str, checked: bool) -> BrowserResult<()>;

    /// Click an element.
    async fn click(&self, selector: &str) -> BrowserResult<()>;

    /// Attach a local file to a file input.
    async fn upload(&self, selector: &str, path: &str) -> BrowserResult<()>;

    /// Capture a PNG screenshot of the viewport.
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;

    /// Current page URL (after redirects).
    async fn current_url(&self) -> BrowserResult<String>;
}

/// A browser instance capable of opening pages.
///
/// Each worker owns at most one `Browser` at a time, for the duration of
/// one job; `close` must be called on every exit path. Implementations
/// should make `close` idempotent.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh page.
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>>;

    /// Tear the instance down gracefully. Implementations fall back to a
    /// force-kill when graceful close fails.
    async fn close(&self) -> BrowserResult<()>;
}

/// Launches or connects browser instances for workers.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn acquire(&self) -> BrowserResult<Box<dyn Browser>>;

    /// Number of live instances attributable to this provider.
    /// Used by resource-leak accounting in tests.
    fn active_count(&self) -> usize;
}
