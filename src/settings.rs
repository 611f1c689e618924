//! Setting Store clients and the typed records kept in it.

use crate::api::ApiClient;
use crate::error::{Result, TailorError};
use crate::storage::KvStore;
use crate::types::{ResumeDocument, Setting};
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;

pub const DEFAULT_RESUME_SETTING: &str = "default_resume_id";
pub const CURRENT_RESUME_SETTING: &str = "current_resume";

#[async_trait]
pub trait SettingStore: Send + Sync {
    /// `Ok(None)` when no setting has that name.
    async fn get(&self, name: &str) -> Result<Option<Setting>>;
    /// Create or overwrite.
    async fn set(&self, name: &str, value: &str) -> Result<Setting>;
    /// Removing a missing setting succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
}

// ============================================
// Remote store
// ============================================

pub struct HttpSettingStore {
    api: ApiClient,
}

#[derive(Serialize)]
struct CreateSetting<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct UpdateSetting<'a> {
    value: &'a str,
}

impl HttpSettingStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SettingStore for HttpSettingStore {
    async fn get(&self, name: &str) -> Result<Option<Setting>> {
        let request = self
            .api
            .request(Method::GET, &format!("/api/settings/name/{name}"));
        self.api.send_optional(request).await
    }

    async fn set(&self, name: &str, value: &str) -> Result<Setting> {
        let request = match self.get(name).await? {
            Some(existing) => self
                .api
                .request(Method::PUT, &format!("/api/settings/{}", existing.id))
                .json(&UpdateSetting { value }),
            None => self
                .api
                .request(Method::POST, "/api/settings")
                .json(&CreateSetting { name, value }),
        };
        let setting: Setting = self.api.send_json(request).await?;
        tracing::debug!(name, "setting stored");
        Ok(setting)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let Some(existing) = self.get(name).await? else {
            return Ok(());
        };
        let request = self
            .api
            .request(Method::DELETE, &format!("/api/settings/{}", existing.id));
        match self.api.send_empty(request).await {
            // Someone else removed it between the lookup and the delete.
            Err(TailorError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

// ============================================
// Local store
// ============================================

/// Settings kept on this device, for builds without a settings backend.
pub struct LocalSettingStore {
    store: Arc<dyn KvStore>,
}

impl LocalSettingStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn next_id(&self) -> i64 {
        self.store
            .keys()
            .iter()
            .filter_map(|key| self.store.get(key))
            .filter_map(|raw| serde_json::from_str::<Setting>(&raw).ok())
            .map(|setting| setting.id)
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl SettingStore for LocalSettingStore {
    async fn get(&self, name: &str) -> Result<Option<Setting>> {
        match self.store.get(name) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, name: &str, value: &str) -> Result<Setting> {
        let now = OffsetDateTime::now_utc();
        let setting = match self.get(name).await? {
            Some(existing) => Setting {
                value: value.to_string(),
                updated_at: now,
                ..existing
            },
            None => Setting {
                id: self.next_id(),
                name: name.to_string(),
                value: value.to_string(),
                created_at: now,
                updated_at: now,
            },
        };
        self.store.set(name, &serde_json::to_string(&setting)?)?;
        Ok(setting)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store.delete(name)
    }
}

// ============================================
// Typed views
// ============================================

/// The single "open on load" resume reference.
#[derive(Clone)]
pub struct DefaultPointer {
    settings: Arc<dyn SettingStore>,
}

impl DefaultPointer {
    pub fn new(settings: Arc<dyn SettingStore>) -> Self {
        Self { settings }
    }

    pub async fn get(&self) -> Result<Option<i64>> {
        let Some(setting) = self.settings.get(DEFAULT_RESUME_SETTING).await? else {
            return Ok(None);
        };
        match setting.value.trim().parse::<i64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!(value = %setting.value, "ignoring malformed default resume id");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, resume_id: i64) -> Result<()> {
        self.settings
            .set(DEFAULT_RESUME_SETTING, &resume_id.to_string())
            .await?;
        tracing::info!(resume_id, "default resume set");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.settings.delete(DEFAULT_RESUME_SETTING).await?;
        tracing::info!("default resume cleared");
        Ok(())
    }
}

/// The serialized single resume kept before named resumes existed.
#[derive(Clone)]
pub struct LegacySnapshot {
    settings: Arc<dyn SettingStore>,
}

impl LegacySnapshot {
    pub fn new(settings: Arc<dyn SettingStore>) -> Self {
        Self { settings }
    }

    pub async fn load(&self) -> Result<Option<ResumeDocument>> {
        let Some(setting) = self.settings.get(CURRENT_RESUME_SETTING).await? else {
            return Ok(None);
        };
        if setting.value.trim().is_empty() {
            return Ok(None);
        }
        // Either `{"resume_json": <doc>}` and nothing else, or the bare document.
        let document = match serde_json::from_str::<Value>(&setting.value)? {
            Value::Object(mut fields) if fields.len() == 1 && fields.contains_key("resume_json") => {
                fields.remove("resume_json").unwrap_or_default()
            }
            other => other,
        };
        if document.is_null() {
            return Ok(None);
        }
        Ok(Some(ResumeDocument::new(document)))
    }
}
