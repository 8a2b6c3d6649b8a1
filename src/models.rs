// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Opaque generation payload handed to the broker. Unset fields take the upstream defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Self::default()
        }
    }
}

/// Which producer answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    Primary,
    Secondary,
    Placeholder,
}

impl CompletionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a logical request. `degraded` is set whenever no primary key answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub degraded: bool,
    pub source: CompletionSource,
}

impl Completion {
    pub fn primary(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            degraded: false,
            source: CompletionSource::Primary,
        }
    }

    pub fn degraded(
        content: impl Into<String>,
        model: impl Into<String>,
        source: CompletionSource,
    ) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            degraded: true,
            source,
        }
    }
}

/// OpenAI-compatible chat completion request body.
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if the body carries one.
    pub fn into_content(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_are_omitted() {
        let json = serde_json::to_value(GenerationRequest::from_prompt("hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"messages": [{"role": "user", "content": "hi"}]})
        );
    }

    #[test]
    fn test_completion_content_extraction() {
        let body: ChatCompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_content().as_deref(), Some("hello"));

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.into_content().is_none());
    }

    #[test]
    fn test_degraded_completion_serializes_source() {
        let c = Completion::degraded("text", "gpt-3.5-turbo", CompletionSource::Secondary);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["degraded"], true);
        assert_eq!(json["source"], "secondary");
    }
}
