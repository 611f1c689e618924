//! In-memory collaborators for driving the reconciler in tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tailor::ai::{TailorReply, TailorRequest, TailoringService};
use tailor::resumes::{NewResume, ResumePatch, ResumeQuery, ResumeStore};
use tailor::settings::{LocalSettingStore, SettingStore};
use tailor::storage::{KvStore, MemoryStore};
use tailor::transcript::TranscriptCache;
use tailor::types::{Resume, ResumeDocument, Setting};
use tailor::{Collaborators, Reconciler, Result, TailorError};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Notify;

// ============================================
// Resume store
// ============================================

struct StoreState {
    next_id: i64,
    clock: OffsetDateTime,
    resumes: BTreeMap<i64, Resume>,
    fail_next: Option<(u16, String)>,
}

/// Resume store over a map. With a gate set, each `get` waits for `release()`.
pub struct MemoryResumeStore {
    state: Mutex<StoreState>,
    gate: Option<Arc<Notify>>,
    pub fetching: Arc<Notify>,
}

impl Default for MemoryResumeStore {
    fn default() -> Self {
        Self {
            gate: None,
            fetching: Arc::new(Notify::new()),
            state: Mutex::new(StoreState {
                next_id: 1,
                clock: datetime!(2025-01-01 00:00 UTC),
                resumes: BTreeMap::new(),
                fail_next: None,
            }),
        }
    }
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Insert directly, bypassing failure injection.
    pub fn seed(&self, name: &str, content: Value) -> Resume {
        let mut state = self.state.lock().unwrap();
        insert(&mut state, name.to_string(), ResumeDocument::new(content))
    }

    /// Make the next call fail with an API error.
    pub fn fail_next(&self, status: u16, message: &str) {
        self.state.lock().unwrap().fail_next = Some((status, message.to_string()));
    }

    pub fn stored(&self, id: i64) -> Option<Resume> {
        self.state.lock().unwrap().resumes.get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().resumes.len()
    }

    fn check_failure(&self) -> Result<()> {
        match self.state.lock().unwrap().fail_next.take() {
            Some((status, message)) => Err(TailorError::Api { status, message }),
            None => Ok(()),
        }
    }
}

fn insert(state: &mut StoreState, name: String, content: ResumeDocument) -> Resume {
    state.clock += time::Duration::seconds(1);
    let resume = Resume {
        id: state.next_id,
        name,
        resume_json: content,
        ttl: None,
        created_at: state.clock,
        updated_at: state.clock,
    };
    state.next_id += 1;
    state.resumes.insert(resume.id, resume.clone());
    resume
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn list(&self, query: &ResumeQuery) -> Result<Vec<Resume>> {
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        let needle = query.name.as_deref().map(str::to_lowercase);
        let matching = state.resumes.values().filter(|r| match &needle {
            Some(n) => r.name.to_lowercase().contains(n),
            None => true,
        });
        let size = query.page_size.unwrap_or(u32::MAX) as usize;
        let skip = (query.page.unwrap_or(1) as usize - 1).saturating_mul(size);
        Ok(matching.skip(skip).take(size).cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Resume> {
        self.fetching.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        state
            .resumes
            .get(&id)
            .cloned()
            .ok_or_else(|| TailorError::NotFound(format!("Resume with id {id} not found")))
    }

    async fn create(&self, resume: NewResume) -> Result<Resume> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        if state.resumes.values().any(|r| r.name == resume.name) {
            return Err(TailorError::Api {
                status: 400,
                message: format!("Resume '{}' already exists", resume.name),
            });
        }
        Ok(insert(&mut state, resume.name, resume.resume_json))
    }

    async fn update(&self, id: i64, patch: ResumePatch) -> Result<Resume> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        state.clock += time::Duration::seconds(1);
        let now = state.clock;
        let resume = state
            .resumes
            .get_mut(&id)
            .ok_or_else(|| TailorError::NotFound(format!("Resume with id {id} not found")))?;
        if let Some(name) = patch.name {
            resume.name = name;
        }
        if let Some(content) = patch.resume_json {
            resume.resume_json = content;
        }
        resume.updated_at = now;
        Ok(resume.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        state
            .resumes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| TailorError::NotFound(format!("Resume with id {id} not found")))
    }
}

// ============================================
// Tailoring service
// ============================================

/// Replies from a queue. With a gate set, each call waits for `release()`.
#[derive(Default)]
pub struct ScriptedTailor {
    replies: Mutex<VecDeque<std::result::Result<TailorReply, (u16, String)>>>,
    requests: Mutex<Vec<TailorRequest>>,
    gate: Option<Arc<Notify>>,
    pub started: Arc<Notify>,
}

impl ScriptedTailor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::default()
        }
    }

    pub fn reply(&self, content: Value, text: Option<&str>) {
        self.replies.lock().unwrap().push_back(Ok(TailorReply {
            resume_json: ResumeDocument::new(content),
            response: text.map(str::to_string),
            message: "Resume generated successfully".to_string(),
        }));
    }

    pub fn fail(&self, status: u16, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err((status, message.to_string())));
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<TailorRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TailoringService for ScriptedTailor {
    async fn tailor(&self, request: &TailorRequest) -> Result<TailorReply> {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err((status, message))) => Err(TailorError::Api { status, message }),
            None => Err(TailorError::Api {
                status: 503,
                message: "no scripted reply".to_string(),
            }),
        }
    }
}

// ============================================
// Storage that always fails
// ============================================

pub struct BrokenStore;

impl KvStore for BrokenStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(TailorError::Storage("quota exceeded".to_string()))
    }
    fn delete(&self, _key: &str) -> Result<()> {
        Err(TailorError::Storage("quota exceeded".to_string()))
    }
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================
// Setting store with a held read
// ============================================

/// Local settings whose `get` waits for `release()`.
pub struct GatedSettings {
    inner: LocalSettingStore,
    gate: Notify,
    pub reading: Notify,
}

impl GatedSettings {
    pub fn new() -> Self {
        Self {
            inner: LocalSettingStore::new(Arc::new(MemoryStore::new())),
            gate: Notify::new(),
            reading: Notify::new(),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SettingStore for GatedSettings {
    async fn get(&self, name: &str) -> Result<Option<Setting>> {
        self.reading.notify_one();
        self.gate.notified().await;
        self.inner.get(name).await
    }

    async fn set(&self, name: &str, value: &str) -> Result<Setting> {
        self.inner.set(name, value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name).await
    }
}

// ============================================
// Harness
// ============================================

pub struct Harness {
    pub reconciler: Arc<Reconciler>,
    pub store: Arc<MemoryResumeStore>,
    pub settings: Arc<dyn SettingStore>,
    pub transcripts: TranscriptCache,
    pub tailor: Arc<ScriptedTailor>,
}

pub struct HarnessBuilder {
    store: Arc<MemoryResumeStore>,
    settings: Arc<dyn SettingStore>,
    kv: Arc<dyn KvStore>,
    tailor: Arc<ScriptedTailor>,
    query: Option<String>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryResumeStore::new()),
            settings: Arc::new(LocalSettingStore::new(Arc::new(MemoryStore::new()))),
            kv: Arc::new(MemoryStore::new()),
            tailor: Arc::new(ScriptedTailor::new()),
            query: None,
        }
    }

    pub fn store(mut self, store: Arc<MemoryResumeStore>) -> Self {
        self.store = store;
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn transcripts(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn tailor(mut self, tailor: ScriptedTailor) -> Self {
        self.tailor = Arc::new(tailor);
        self
    }

    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn build(self) -> Harness {
        let transcripts = TranscriptCache::new(self.kv);
        let reconciler = Reconciler::new(
            Collaborators {
                resumes: self.store.clone(),
                settings: self.settings.clone(),
                transcripts: transcripts.clone(),
                tailor: self.tailor.clone(),
            },
            self.query,
        );
        Harness {
            reconciler: Arc::new(reconciler),
            store: self.store,
            settings: self.settings,
            transcripts,
            tailor: self.tailor,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}
