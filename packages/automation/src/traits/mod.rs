//! Core trait abstractions (browser runtime, field-value AI).

pub mod ai;
pub mod browser;

pub use ai::{FieldValueAi, FieldValueRequest};
pub use browser::{Browser, BrowserPage, BrowserProvider};
