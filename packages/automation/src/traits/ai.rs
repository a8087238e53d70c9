//! AI trait for field-value generation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::field::ExtractedField;

/// One batched field-value request.
///
/// All fields that survived pre-answered lookup go out in a single call;
/// the provider returns a JSON object keyed by field name.
#[derive(Debug, Clone)]
pub struct FieldValueRequest<'a> {
    /// Fields needing values
    pub fields: &'a [ExtractedField],
    /// Job description for context
    pub job_description: &'a str,
    /// Short profile summary for context
    pub profile_summary: &'a str,
}

/// Provider-agnostic LLM seam for answering application form fields.
///
/// Implementations wrap a specific provider and handle prompting and
/// response parsing; the generator validates everything that comes back
/// before it is ever written to a form.
#[async_trait]
pub trait FieldValueAi: Send + Sync {
    /// Answer a batch of fields. Keys of the returned map are field names;
    /// values are strings, or for checkbox groups a JSON array serialized
    /// to a string by the provider and split by the generator.
    async fn answer_fields(
        &self,
        request: FieldValueRequest<'_>,
    ) -> Result<HashMap<String, serde_json::Value>>;
}

#[async_trait]
impl<T: FieldValueAi + ?Sized> FieldValueAi for std::sync::Arc<T> {
    async fn answer_fields(
        &self,
        request: FieldValueRequest<'_>,
    ) -> Result<HashMap<String, serde_json::Value>> {
        (**self).answer_fields(request).await
    }
}
