//! Browser runtime implementations.

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumBrowser, ChromiumPage, ChromiumProvider};
