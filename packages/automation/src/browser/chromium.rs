//! Chromium implementation of the browser traits via CDP.
//!
//! Drives a headless Chromium either launched locally or connected over
//! a websocket to a remote browser server. DOM mutations go through
//! evaluated JavaScript so synthetic `input`/`change` events fire and
//! framework-bound forms (React, Vue) observe the values.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{BrowserError, BrowserResult};
use crate::traits::browser::{Browser, BrowserPage, BrowserProvider};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// One CDP-backed page.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    fn js_string(value: &str) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }

    async fn eval(&self, expression: String) -> BrowserResult<serde_json::Value> {
        let result = tokio::time::timeout(ACTION_TIMEOUT, self.page.evaluate(expression))
            .await
            .map_err(|_| BrowserError::NetworkTimeout("script evaluation".to_string()))?
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    /// Evaluate a snippet that returns false when the selector matched
    /// nothing, mapping that to `SelectorNotFound`.
    async fn eval_on(&self, selector: &str, expression: String) -> BrowserResult<serde_json::Value> {
        match self.eval(expression).await? {
            serde_json::Value::Null => Err(BrowserError::SelectorNotFound {
                selector: selector.to_string(),
            }),
            value => Ok(value),
        }
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        tokio::time::timeout(NAVIGATION_TIMEOUT, async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::Network(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::Network(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|_| BrowserError::PageLoadTimeout {
            url: url.to_string(),
        })?
    }

    async fn content(&self) -> BrowserResult<String> {
        tokio::time::timeout(ACTION_TIMEOUT, self.page.content())
            .await
            .map_err(|_| BrowserError::NetworkTimeout("page content".to_string()))?
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn exists(&self, selector: &str) -> BrowserResult<bool> {
        let expr = format!(
            "document.querySelector({}) !== null",
            Self::js_string(selector)
        );
        Ok(self.eval(expr).await?.as_bool().unwrap_or(false))
    }

    async fn set_value(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const proto = el instanceof HTMLTextAreaElement
                    ? HTMLTextAreaElement.prototype
                    : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                setter.call(el, {val});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = Self::js_string(selector),
            val = Self::js_string(value),
        );
        self.eval_on(selector, expr).await.map(|_| ())
    }

    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<bool> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const option = Array.from(el.options).find(o => o.value === {val});
                if (!option) return false;
                el.value = option.value;
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = Self::js_string(selector),
            val = Self::js_string(value),
        );
        Ok(self
            .eval_on(selector, expr)
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn options_of(&self, selector: &str) -> BrowserResult<Vec<(String, String)>> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el || !el.options) return null;
                return Array.from(el.options).map(o => [o.value, o.textContent.trim()]);
            }})()"#,
            sel = Self::js_string(selector),
        );
        let value = self.eval_on(selector, expr).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> BrowserResult<()> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const setter = Object.getOwnPropertyDescriptor(
                    HTMLInputElement.prototype, 'checked').set;
                setter.call(el, {checked});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = Self::js_string(selector),
        );
        self.eval_on(selector, expr).await.map(|_| ())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let element = tokio::time::timeout(ACTION_TIMEOUT, self.page.find_element(selector))
            .await
            .map_err(|_| BrowserError::NetworkTimeout("find element".to_string()))?
            .map_err(|_| BrowserError::SelectorNotFound {
                selector: selector.to_string(),
            })?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        Ok(())
    }

    async fn upload(&self, selector: &str, path: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound {
                selector: selector.to_string(),
            })?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(BrowserError::Evaluation)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
            .map(|u| u.unwrap_or_else(|| "about:blank".to_string()))
    }
}

/// One Chromium instance and its CDP event loop.
pub struct ChromiumBrowser {
    browser: Mutex<Option<CdpBrowser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| BrowserError::Crashed("browser already closed".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> BrowserResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "graceful browser close failed, killing process");
                browser.kill().await;
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        debug!("browser instance closed");
        Ok(())
    }
}

/// Launches local headless Chromium instances, or connects to a remote
/// browser server when a websocket URL is configured.
pub struct ChromiumProvider {
    ws_url: Option<String>,
    active: Arc<AtomicUsize>,
}

impl ChromiumProvider {
    /// Provider that launches a local headless instance per acquire.
    pub fn local() -> Self {
        Self {
            ws_url: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Provider that connects to a remote browser over CDP websocket.
    pub fn remote(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: Some(ws_url.into()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl BrowserProvider for ChromiumProvider {
    async fn acquire(&self) -> BrowserResult<Box<dyn Browser>> {
        let (browser, mut handler) = match &self.ws_url {
            Some(ws_url) => CdpBrowser::connect(ws_url.clone())
                .await
                .map_err(|e| BrowserError::Launch(e.to_string()))?,
            None => {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .build()
                    .map_err(BrowserError::Launch)?;
                CdpBrowser::launch(config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?
            }
        };

        // The handler stream must be driven for the CDP connection to
        // make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChromiumBrowser {
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            closed: AtomicBool::new(false),
            active: Arc::clone(&self.active),
        }))
    }

    fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
