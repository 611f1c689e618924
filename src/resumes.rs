//! Resume Store client.
//!
//! `HttpResumeStore` speaks the `/api/resumes` contract. `CachedResumeStore`
//! layers a read cache on any store and drops affected entries after each
//! successful mutation, so the next read always refetches.

use crate::api::ApiClient;
use crate::error::Result;
use crate::types::{Resume, ResumeDocument};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Largest page the backend will serve.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ResumeQuery {
    /// Case-insensitive substring of the resume name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl ResumeQuery {
    pub fn named(filter: impl Into<String>) -> Self {
        Self {
            name: Some(filter.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewResume {
    pub name: String,
    pub resume_json: ResumeDocument,
}

/// Partial update; `None` fields are left untouched by the server.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResumePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_json: Option<ResumeDocument>,
}

impl ResumePatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            resume_json: None,
        }
    }

    pub fn content(content: ResumeDocument) -> Self {
        Self {
            name: None,
            resume_json: Some(content),
        }
    }
}

#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn list(&self, query: &ResumeQuery) -> Result<Vec<Resume>>;
    async fn get(&self, id: i64) -> Result<Resume>;
    async fn create(&self, resume: NewResume) -> Result<Resume>;
    async fn update(&self, id: i64, patch: ResumePatch) -> Result<Resume>;
    async fn delete(&self, id: i64) -> Result<()>;
}

// ============================================
// HTTP implementation
// ============================================

pub struct HttpResumeStore {
    api: ApiClient,
}

#[derive(Deserialize)]
struct ResumesListResponse {
    resumes: Vec<Resume>,
}

impl HttpResumeStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResumeStore for HttpResumeStore {
    async fn list(&self, query: &ResumeQuery) -> Result<Vec<Resume>> {
        let request = self.api.request(Method::GET, "/api/resumes").query(query);
        let body: ResumesListResponse = self.api.send_json(request).await?;
        Ok(body.resumes)
    }

    async fn get(&self, id: i64) -> Result<Resume> {
        let request = self.api.request(Method::GET, &format!("/api/resumes/{id}"));
        self.api.send_json(request).await
    }

    async fn create(&self, resume: NewResume) -> Result<Resume> {
        let request = self.api.request(Method::POST, "/api/resumes").json(&resume);
        let created: Resume = self.api.send_json(request).await?;
        tracing::info!(id = created.id, name = %created.name, "resume created");
        Ok(created)
    }

    async fn update(&self, id: i64, patch: ResumePatch) -> Result<Resume> {
        let request = self
            .api
            .request(Method::PUT, &format!("/api/resumes/{id}"))
            .json(&patch);
        let updated: Resume = self.api.send_json(request).await?;
        tracing::info!(id, "resume updated");
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let request = self
            .api
            .request(Method::DELETE, &format!("/api/resumes/{id}"));
        self.api.send_empty(request).await?;
        tracing::info!(id, "resume deleted");
        Ok(())
    }
}

// ============================================
// Read cache
// ============================================

#[derive(Default)]
struct CacheEntries {
    by_id: HashMap<i64, Resume>,
    lists: HashMap<ResumeQuery, Vec<Resume>>,
}

pub struct CachedResumeStore<S> {
    inner: S,
    entries: Mutex<CacheEntries>,
}

impl<S: ResumeStore> CachedResumeStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    /// Forget everything known about `id` plus every cached list.
    pub fn invalidate(&self, id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.by_id.remove(&id);
            entries.lists.clear();
        }
    }

    fn cached_list(&self, query: &ResumeQuery) -> Option<Vec<Resume>> {
        self.entries.lock().ok()?.lists.get(query).cloned()
    }

    fn cached_get(&self, id: i64) -> Option<Resume> {
        self.entries.lock().ok()?.by_id.get(&id).cloned()
    }
}

#[async_trait]
impl<S: ResumeStore> ResumeStore for CachedResumeStore<S> {
    async fn list(&self, query: &ResumeQuery) -> Result<Vec<Resume>> {
        if let Some(hit) = self.cached_list(query) {
            tracing::debug!(?query, "resume list served from cache");
            return Ok(hit);
        }
        let resumes = self.inner.list(query).await?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.lists.insert(query.clone(), resumes.clone());
        }
        Ok(resumes)
    }

    async fn get(&self, id: i64) -> Result<Resume> {
        if let Some(hit) = self.cached_get(id) {
            tracing::debug!(id, "resume served from cache");
            return Ok(hit);
        }
        let resume = self.inner.get(id).await?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.by_id.insert(id, resume.clone());
        }
        Ok(resume)
    }

    async fn create(&self, resume: NewResume) -> Result<Resume> {
        let created = self.inner.create(resume).await?;
        self.invalidate(created.id);
        Ok(created)
    }

    async fn update(&self, id: i64, patch: ResumePatch) -> Result<Resume> {
        let updated = self.inner.update(id, patch).await?;
        self.invalidate(id);
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.inner.delete(id).await?;
        self.invalidate(id);
        Ok(())
    }
}

/// Every resume whose name matches `name`, fetched page by page until the
/// store returns a short page.
pub async fn list_all(store: &dyn ResumeStore, name: Option<String>) -> Result<Vec<Resume>> {
    let mut resumes = Vec::new();
    let mut seen = HashSet::new();
    let mut page = 1;
    loop {
        let query = ResumeQuery {
            name: name.clone(),
            page: Some(page),
            page_size: Some(MAX_PAGE_SIZE),
        };
        let batch = store.list(&query).await?;
        let fetched = batch.len();
        let before = resumes.len();
        resumes.extend(batch.into_iter().filter(|resume| seen.insert(resume.id)));
        // A store that ignores paging repeats itself; stop once nothing is new.
        if fetched < MAX_PAGE_SIZE as usize || resumes.len() == before {
            break;
        }
        page += 1;
    }
    tracing::debug!(count = resumes.len(), pages = page, "resumes listed");
    Ok(resumes)
}

/// Default resume first, then most recently updated.
pub fn sort_for_display(resumes: &mut [Resume], default_id: Option<i64>) {
    resumes.sort_by(|a, b| {
        let a_default = Some(a.id) == default_id;
        let b_default = Some(b.id) == default_id;
        b_default
            .cmp(&a_default)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.id.cmp(&a.id))
    });
}
