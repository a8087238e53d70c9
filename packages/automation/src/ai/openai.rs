//! OpenAI implementation of the field-value AI trait.
//!
//! One chat completion per batch with `json_object` response format;
//! the generator validates everything in the returned object before it
//! is written to a form.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AutomationError, Result};
use crate::generator::format_answer_prompt;
use crate::traits::ai::{FieldValueAi, FieldValueRequest};

const SYSTEM_PROMPT: &str =
    "You answer job application form fields from a candidate profile. \
     Respond with a single JSON object and nothing else.";

/// OpenAI-based field-value provider.
#[derive(Clone)]
pub struct OpenAi {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAi {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AutomationError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn chat_json(&self, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AutomationError::Ai(e.to_string().into()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AutomationError::RateLimited);
        }
        if status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutomationError::Server(format!(
                "OpenAI {}: {}",
                status, error_text
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutomationError::Ai(
                format!("OpenAI API error: {}", error_text).into(),
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AutomationError::Ai(e.to_string().into()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AutomationError::Ai("no response from OpenAI".into()))
    }
}

#[async_trait]
impl FieldValueAi for OpenAi {
    async fn answer_fields(
        &self,
        request: FieldValueRequest<'_>,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let prompt = format_answer_prompt(&request);
        let raw = self.chat_json(&prompt).await?;

        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        match parsed {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(AutomationError::Ai(
                format!("expected a JSON object, got {}", other).into(),
            )),
        }
    }
}
