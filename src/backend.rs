//! AI backend client
//!
//! One pooled reqwest client for both external calls: the health probe
//! (`GET {base}/status`) and the enhancement pass (`POST {base}/chat`).
//! Both are trait seams so the monitor and the pipeline can be tested
//! without a live backend.

use crate::error::AssistantError;
use crate::session::{ConversationTurn, TurnRole};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Most recent turns forwarded as chat context.
const MAX_HISTORY_TURNS: usize = 5;

/// Parsed payload of a successful health probe.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status: String,
    pub models: Vec<String>,
}

/// Single availability check against the backend.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeReport>;
}

/// Best-effort generative rewording of a grounded draft.
#[async_trait]
pub trait EnhancementBackend: Send + Sync {
    async fn enhance(
        &self,
        draft: &str,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<String>;
}

/// Reusable backend client (connection-pooled).
pub struct BackendClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl HealthProbe for BackendClient {
    async fn probe(&self) -> Result<ProbeReport> {
        let url = format!("{}/status", self.base_url);

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AssistantError::ProbeError(format!("status request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AssistantError::Unauthorized(format!(
                    "status endpoint rejected credentials ({})",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(AssistantError::ProbeError(format!(
                    "status endpoint returned {}",
                    status
                )));
            }
            _ => {}
        }

        let payload: StatusResponse = response.json().await.map_err(|e| {
            error!("Failed to parse status response: {}", e);
            AssistantError::ProbeError(format!("status parse error: {}", e))
        })?;

        Ok(ProbeReport {
            status: payload.status,
            models: payload.models.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl EnhancementBackend for BackendClient {
    async fn enhance(
        &self,
        draft: &str,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<String> {
        let url = format!("{}/chat", self.base_url);

        let request = ChatRequest {
            message: query.to_string(),
            context: format!(
                "Reword the draft answer below for a university student. \
                 Preserve every factual statement exactly; do not add facts.\n\n\
                 Draft answer:\n{}",
                draft
            ),
            conversation_history: history_payload(history),
        };

        info!("Calling enhancement endpoint");

        let response = self
            .with_auth(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::EnhancementError(format!("chat request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AssistantError::Unauthorized(format!(
                    "chat endpoint rejected credentials ({})",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                error!("Enhancement error response: {}", body);
                return Err(AssistantError::EnhancementError(format!(
                    "chat endpoint returned {}",
                    status
                )));
            }
            _ => {}
        }

        let payload: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat response: {}", e);
            AssistantError::EnhancementError(format!("chat parse error: {}", e))
        })?;

        if payload.response.trim().is_empty() {
            return Err(AssistantError::EnhancementError(
                "chat endpoint returned an empty response".to_string(),
            ));
        }

        Ok(payload.response)
    }
}

/// Truncate to the newest turns and strip everything but role + content.
fn history_payload(history: &[ConversationTurn]) -> Vec<HistoryEntry> {
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    history[skip..]
        .iter()
        .map(|turn| HistoryEntry {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            },
            content: turn.content.clone(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    message: String,
    context: String,
    conversation_history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
    #[allow(dead_code)]
    suggestions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    models: Option<Vec<String>>,
    #[allow(dead_code)]
    metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            message: "what's my grade in CS101".to_string(),
            context: "Preserve every factual statement.".to_string(),
            conversation_history: vec![HistoryEntry {
                role: "user",
                content: "hello".to_string(),
            }],
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("conversation_history"));
        assert!(json.contains("what's my grade in CS101"));
    }

    #[test]
    fn test_history_payload_caps_at_five_newest() {
        let turns: Vec<ConversationTurn> = (0..8)
            .map(|i| ConversationTurn::user(format!("turn {}", i)))
            .collect();

        let payload = history_payload(&turns);
        assert_eq!(payload.len(), 5);
        assert_eq!(payload[0].content, "turn 3");
        assert_eq!(payload[4].content, "turn 7");
    }

    #[test]
    fn test_status_response_parsing_tolerates_missing_fields() {
        let payload: StatusResponse =
            serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert_eq!(payload.status, "ok");
        assert!(payload.models.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = BackendClient::new("http://localhost:9000/", None);
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
