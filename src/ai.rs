//! AI Tailoring Service client.
//!
//! The service takes the whole transcript (each message carrying the resume it
//! refers to) and answers with a full replacement document plus an optional
//! assistant reply.

use crate::api::ApiClient;
use crate::error::Result;
use crate::types::{ChatMessage, ResumeDocument};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TailorRequest {
    pub messages: Vec<ChatMessage>,
    /// Text extracted from an uploaded resume file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TailorReply {
    pub resume_json: ResumeDocument,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
pub trait TailoringService: Send + Sync {
    async fn tailor(&self, request: &TailorRequest) -> Result<TailorReply>;
}

pub struct HttpTailoringService {
    api: ApiClient,
}

impl HttpTailoringService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TailoringService for HttpTailoringService {
    async fn tailor(&self, request: &TailorRequest) -> Result<TailorReply> {
        tracing::debug!(
            messages = request.messages.len(),
            has_file = request.file_content.is_some(),
            "sending chat request"
        );
        let http = self.api.request(Method::POST, "/api/chat").json(request);
        let reply: TailorReply = self.api.send_json(http).await?;
        tracing::debug!(has_reply = reply.response.is_some(), "chat reply received");
        Ok(reply)
    }
}
