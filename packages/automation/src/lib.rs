//! Job Application Automation Library
//!
//! Drives a browser through third-party application forms: validates and
//! classifies the target URL, extracts form structure from the live page,
//! generates field values from the candidate profile (pre-answered first,
//! one batched LLM call for the rest), and fills and submits the form.
//! Successful AI-path runs can be recorded as recipes and replayed as the
//! cheaper strategy for the same platform.
//!
//! # Usage
//!
//! ```rust,ignore
//! use automation::{FormExtractor, FormFiller, FieldValueGenerator, UrlValidator};
//! use automation::testing::{MockBrowserProvider, MockFieldAi};
//!
//! let validated = UrlValidator::new().validate(url)?;
//! let page = provider.acquire().await?.new_page().await?;
//! page.navigate(validated.url.as_str()).await?;
//!
//! let form = FormExtractor::new().extract(page.as_ref()).await?;
//! let values = FieldValueGenerator::new(ai)
//!     .generate(&form.fields, &profile, &job_description)
//!     .await?;
//! let result = FormFiller::new().fill(page.as_ref(), &form.fields, &values).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (browser runtime, field-value AI)
//! - [`types`] - Domain types (forms, profiles, recipes, fill results)
//! - [`validator`] - URL validation, SSRF protection, ATS detection
//! - [`extractor`] - Form structure extraction from live pages
//! - [`generator`] - Field-value generation with validation
//! - [`filler`] - DOM filling with ordered selector fallback
//! - [`engine`] - Recipe replay
//! - [`classify`] - Error classification and retry policy
//! - [`testing`] - Mock implementations for testing

pub mod classify;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod filler;
pub mod generator;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validator;

pub mod ai;
pub mod browser;

// Re-export core types at crate root
pub use classify::{backoff_delay_ms, classify, policy_for, ErrorPolicy, FailureKind};
pub use engine::RecipeEngine;
pub use error::{AutomationError, BrowserError, Result, SecurityError};
pub use extractor::FormExtractor;
pub use filler::FormFiller;
pub use generator::FieldValueGenerator;
pub use traits::{
    ai::{FieldValueAi, FieldValueRequest},
    browser::{Browser, BrowserPage, BrowserProvider},
};
pub use types::{
    ats::AtsType,
    field::{ExtractedField, ExtractedForm, FieldKind, FieldOption},
    fill::{FieldOutcome, FieldValue, FieldValues, FillResult},
    profile::{PreAnswered, UserProfile},
    recipe::{Recipe, RecipeExecution, RecipeStep, ReplayOutcome, StepAction},
};
pub use validator::{UrlValidator, ValidatedUrl};
