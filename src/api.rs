//! Shared HTTP plumbing for the backend clients.

use crate::error::{Result, TailorError};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Base URL plus a pooled `reqwest` client, shared by every endpoint client.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send and decode a JSON body, mapping non-2xx statuses to `TailorError`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a request whose success body is ignored (204 deletes).
    pub async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        check_status(response).await?;
        Ok(())
    }

    /// Like `send_json`, but a 404 becomes `Ok(None)`.
    pub async fn send_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    if status == StatusCode::NOT_FOUND {
        return Err(TailorError::NotFound(message));
    }
    Err(TailorError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Human-readable text for a failed response: the body's `detail` or
/// `message` when present, otherwise a status-based fallback.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            Some(serde_json::Value::String(detail)) if !detail.is_empty() => return detail,
            // FastAPI validation errors carry a list of {msg, ...} objects.
            Some(serde_json::Value::Array(items)) => {
                let joined = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return joined;
                }
            }
            _ => {}
        }
        if let Some(message) = parsed.message
            && !message.is_empty()
        {
            return message;
        }
    }
    format!("Request failed with status {}", status.as_u16())
}
