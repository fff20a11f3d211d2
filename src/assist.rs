//! Prompt polishing and reverse-engineering through an OpenAI-compatible
//! chat completions endpoint. One POST per call, no streaming, no retry.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::ModelConfig;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("model configuration is incomplete: base URL, API key and model name are required")]
    IncompleteConfig,

    #[error("request timed out, check the network connection and try again")]
    Timeout,

    #[error("API request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("API returned an unexpected response format")]
    MalformedResponse,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistTask {
    /// Rewrite a prompt to be clearer and more effective.
    Polish,
    /// Guess the prompt that produced a piece of AI output.
    Reverse,
}

impl AssistTask {
    fn system_prompt(&self) -> &'static str {
        match self {
            AssistTask::Polish => {
                "You are a professional prompt optimization assistant. Improve the prompt the user \
                 provides so it is clearer, more professional and more effective. Keep the original \
                 intent while improving wording, structure and logic."
            }
            AssistTask::Reverse => {
                "You are a prompt analysis expert. Given content produced by an AI, infer the prompt \
                 most likely to have produced it. Consider the user's probable intent, format \
                 requirements and keywords, then give the complete inferred prompt. Reply with the \
                 prompt only, without extra explanation."
            }
        }
    }

    fn user_message(&self, content: &str) -> String {
        match self {
            AssistTask::Polish => format!(
                "Please optimize the following prompt to make it more professional and effective:\n\n{}",
                content
            ),
            AssistTask::Reverse => format!(
                "Analyze the following AI-generated content and infer the prompt most likely to have \
                 produced it:\n\n{}\n\nReply with the inferred prompt only.",
                content
            ),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AssistTask::Polish => "polish",
            AssistTask::Reverse => "reverse",
        }
    }
}

/// `<base>/chat/completions`, tolerating a trailing slash on the base URL.
pub fn endpoint(base_url: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}chat/completions", base_url)
    } else {
        format!("{}/chat/completions", base_url)
    }
}

pub fn request_body(task: AssistTask, model_name: &str, content: &str) -> Value {
    json!({
        "model": model_name,
        "messages": [
            { "role": "system", "content": task.system_prompt() },
            { "role": "user", "content": task.user_message(content) }
        ],
        "temperature": 0.7,
        "top_p": 0.9,
        "stream": false
    })
}

/// Best human-readable message from a failed response body.
pub fn error_message(status: u16, body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or_else(|_| json!({ "message": body }));
    parsed
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed: {}", status))
}

/// `choices[0].message.content`, trimmed.
pub fn extract_content(body: &Value) -> Result<String, AssistError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or(AssistError::MalformedResponse)
}

#[derive(Debug, Clone)]
pub struct AssistClient {
    http: reqwest::Client,
}

impl AssistClient {
    pub fn new(timeout: Duration) -> Result<Self, AssistError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub async fn polish(&self, config: &ModelConfig, content: &str) -> Result<String, AssistError> {
        self.run(AssistTask::Polish, config, content).await
    }

    pub async fn reverse(&self, config: &ModelConfig, content: &str) -> Result<String, AssistError> {
        self.run(AssistTask::Reverse, config, content).await
    }

    pub async fn run(&self, task: AssistTask, config: &ModelConfig, content: &str) -> Result<String, AssistError> {
        if !config.is_complete() {
            return Err(AssistError::IncompleteConfig);
        }
        let url = endpoint(config.base_url.trim());
        debug!(task = task.label(), url = %url, model = %config.model_name, api_key_len = config.api_key.len(), "sending assist request");

        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", config.api_key.trim()))
            .json(&request_body(task, config.model_name.trim(), content))
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(map_transport)?;
        if !status.is_success() {
            let message = error_message(status.as_u16(), &text);
            error!(task = task.label(), status = status.as_u16(), reason = %message, "assist request rejected");
            return Err(AssistError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| AssistError::MalformedResponse)?;
        let result = extract_content(&body)?;
        info!(task = task.label(), chars = result.chars().count(), "assist request succeeded");
        Ok(result)
    }
}

fn map_transport(e: reqwest::Error) -> AssistError {
    if e.is_timeout() {
        AssistError::Timeout
    } else {
        AssistError::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_endpoint_joins_with_single_slash() {
        assert_eq!(endpoint("https://api.x.ai/v1"), "https://api.x.ai/v1/chat/completions");
        assert_eq!(endpoint("https://api.x.ai/v1/"), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = request_body(AssistTask::Polish, "deepseek-chat", "write a poem");
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"].as_str().unwrap().ends_with("write a poem"));
    }

    #[test]
    fn test_error_message_preference() {
        assert_eq!(error_message(401, r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message(400, r#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message(502, "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(500, ""), "request failed: 500");
    }

    #[test]
    fn test_extract_content() {
        let body = json!({"choices": [{"message": {"content": "  polished  "}}]});
        assert_eq!(extract_content(&body).unwrap(), "polished");
        assert!(matches!(
            extract_content(&json!({"choices": []})),
            Err(AssistError::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn test_incomplete_config_fails_before_request() {
        let client = AssistClient::new(Duration::from_secs(1)).unwrap();
        let config = ModelConfig {
            id: "1".into(),
            base_url: "https://api.example.com".into(),
            api_key: " ".into(),
            model_name: "m".into(),
            name: "Model 1".into(),
            active: true,
            created_at: Utc::now(),
        };
        assert!(matches!(
            client.polish(&config, "text").await,
            Err(AssistError::IncompleteConfig)
        ));
    }
}
