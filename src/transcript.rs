use crate::error::Result;
use crate::storage::KvStore;
use crate::types::ChatMessage;
use std::sync::Arc;

pub const DEFAULT_TRANSCRIPT_PREFIX: &str = "resume_chat_";

/// Per-resume chat history kept on this device only.
#[derive(Clone)]
pub struct TranscriptCache {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl TranscriptCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_prefix(store, DEFAULT_TRANSCRIPT_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, resume_id: i64) -> String {
        format!("{}{}", self.prefix, resume_id)
    }

    /// Missing or unreadable transcripts load as empty.
    pub fn load(&self, resume_id: i64) -> Vec<ChatMessage> {
        let Some(raw) = self.store.get(&self.key(resume_id)) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(resume_id, "discarding unreadable transcript: {err}");
                Vec::new()
            }
        }
    }

    pub fn save(&self, resume_id: i64, messages: &[ChatMessage]) -> Result<()> {
        let raw = serde_json::to_string(messages)?;
        self.store.set(&self.key(resume_id), &raw)?;
        tracing::debug!(resume_id, count = messages.len(), "transcript cached");
        Ok(())
    }

    pub fn delete(&self, resume_id: i64) -> Result<()> {
        self.store.delete(&self.key(resume_id))
    }
}
