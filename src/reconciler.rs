//! Resume Draft Reconciler.
//!
//! Owns the in-memory draft behind the resume builder and keeps it consistent
//! with the Resume Store, the default-resume pointer, the local transcript
//! cache and the navigational query parameter.
//!
//! Every operation takes `&self`. State sits behind a mutex that is only held
//! between awaits, so a `NewDraft` can land while an AI request is in flight;
//! the late response is then recognised by its ticket and dropped.

use crate::ai::{TailorReply, TailorRequest, TailoringService};
use crate::error::{Result, TailorError, validate_name};
use crate::resumes::{NewResume, ResumePatch, ResumeQuery, ResumeStore, list_all, sort_for_display};
use crate::settings::{DefaultPointer, LegacySnapshot, SettingStore};
use crate::transcript::TranscriptCache;
use crate::types::{ChatMessage, Resume, ResumeDocument};
use std::sync::{Arc, Mutex, MutexGuard};

pub const SELECTED_RESUME_PARAM: &str = "selectedResume";

/// Everything the reconciler talks to.
pub struct Collaborators {
    pub resumes: Arc<dyn ResumeStore>,
    pub settings: Arc<dyn SettingStore>,
    pub transcripts: TranscriptCache,
    pub tailor: Arc<dyn TailoringService>,
}

/// Identifies one outstanding AI request and the selection it was issued under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AiTicket {
    epoch: u64,
    request: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    Updated(Resume),
    /// The draft has never been saved; prompt for a name and call `save_as_new`.
    NeedsName,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AiOutcome {
    Applied { reply: Option<String> },
    /// The selection changed while the request was in flight.
    Superseded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResumeListing {
    pub resumes: Vec<Resume>,
    pub default_id: Option<i64>,
}

/// Read-only view of the reconciler for display.
#[derive(Clone, Debug, PartialEq)]
pub struct DraftSnapshot {
    pub selected_resume_id: Option<i64>,
    pub content: Option<ResumeDocument>,
    pub transcript: Vec<ChatMessage>,
    pub initialized: bool,
    pub loading: bool,
    pub dirty: bool,
    pub ai_pending: bool,
}

#[derive(Default)]
struct DraftState {
    selected_resume_id: Option<i64>,
    content: Option<ResumeDocument>,
    transcript: Vec<ChatMessage>,
    /// Content last fetched from (or confirmed by) the Resume Store.
    persisted: Option<ResumeDocument>,
    initialized: bool,
    loading: bool,
    epoch: u64,
    requests_issued: u64,
    pending: Option<AiTicket>,
}

impl DraftState {
    fn begin_context(&mut self) {
        self.epoch += 1;
        self.pending = None;
        self.loading = false;
        self.persisted = None;
    }

    fn reset(&mut self) {
        self.begin_context();
        self.selected_resume_id = None;
        self.content = None;
        self.transcript.clear();
    }

    fn dirty(&self) -> bool {
        compute_dirty(
            self.selected_resume_id,
            self.content.as_ref(),
            self.persisted.as_ref(),
        )
    }
}

/// Unsaved drafts are dirty once they hold anything; saved ones when their
/// content differs structurally from the persisted copy.
pub fn compute_dirty(
    selected_resume_id: Option<i64>,
    content: Option<&ResumeDocument>,
    persisted: Option<&ResumeDocument>,
) -> bool {
    match selected_resume_id {
        None => content.is_some(),
        Some(_) => content != persisted,
    }
}

/// Pull `selectedResume=<id>` out of a query string (leading `?` optional).
pub fn parse_selected_resume(query: &str) -> Option<i64> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == SELECTED_RESUME_PARAM)
        .and_then(|(_, value)| value.trim().parse().ok())
}

pub struct Reconciler {
    resumes: Arc<dyn ResumeStore>,
    default_pointer: DefaultPointer,
    legacy: LegacySnapshot,
    transcripts: TranscriptCache,
    tailor: Arc<dyn TailoringService>,
    initial_query: Option<String>,
    state: Mutex<DraftState>,
}

impl Reconciler {
    pub fn new(collaborators: Collaborators, initial_query: Option<String>) -> Self {
        let Collaborators {
            resumes,
            settings,
            transcripts,
            tailor,
        } = collaborators;
        Self {
            resumes,
            default_pointer: DefaultPointer::new(settings.clone()),
            legacy: LegacySnapshot::new(settings),
            transcripts,
            tailor,
            initial_query,
            state: Mutex::new(DraftState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DraftState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---------------
    // Observation
    // ---------------

    pub fn snapshot(&self) -> DraftSnapshot {
        let state = self.state();
        DraftSnapshot {
            selected_resume_id: state.selected_resume_id,
            content: state.content.clone(),
            transcript: state.transcript.clone(),
            initialized: state.initialized,
            loading: state.loading,
            dirty: state.dirty(),
            ai_pending: state.pending.is_some(),
        }
    }

    pub fn selected_resume_id(&self) -> Option<i64> {
        self.state().selected_resume_id
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty()
    }

    pub fn is_ai_pending(&self) -> bool {
        self.state().pending.is_some()
    }

    pub fn can_save(&self) -> bool {
        let state = self.state();
        state.pending.is_none() && state.content.is_some() && !state.loading
    }

    /// Current value of the navigational query string; empty for a new draft.
    pub fn query_string(&self) -> String {
        match self.selected_resume_id() {
            Some(id) => format!("{SELECTED_RESUME_PARAM}={id}"),
            None => String::new(),
        }
    }

    // ---------------
    // Selection
    // ---------------

    /// Pick the resume to open on load: the query parameter wins, then the
    /// default pointer. Runs once; later calls return the current selection.
    /// A selection made while the pointer is being read is kept.
    pub async fn initialize(&self) -> Result<Option<i64>> {
        let epoch = {
            let mut state = self.state();
            if state.initialized {
                return Ok(state.selected_resume_id);
            }
            state.initialized = true;
            state.epoch
        };

        let from_query = self
            .initial_query
            .as_deref()
            .and_then(parse_selected_resume);
        let target = match from_query {
            Some(id) => Some(id),
            None => match self.default_pointer.get().await {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!("could not read default resume, starting empty: {err}");
                    None
                }
            },
        };

        {
            let state = self.state();
            if state.epoch != epoch || state.selected_resume_id.is_some() {
                tracing::debug!("draft changed during startup; default not applied");
                return Ok(state.selected_resume_id);
            }
        }

        match target {
            Some(id) => {
                tracing::info!(id, from_query = from_query.is_some(), "initial resume");
                self.select_resume(id).await?;
                Ok(self.selected_resume_id())
            }
            None => Ok(None),
        }
    }

    /// Switch to a persisted resume. The transcript comes from the local
    /// cache right away; content arrives once the store fetch resolves.
    pub async fn select_resume(&self, id: i64) -> Result<()> {
        let transcript = self.transcripts.load(id);
        let epoch = {
            let mut state = self.state();
            state.begin_context();
            state.selected_resume_id = Some(id);
            state.content = None;
            state.transcript = transcript;
            state.loading = true;
            state.epoch
        };
        tracing::info!(id, "resume selected");

        let fetched = self.resumes.get(id).await;
        let mut state = self.state();
        if state.epoch != epoch {
            tracing::debug!(id, ok = fetched.is_ok(), "dropping fetch for superseded selection");
            return Ok(());
        }
        match fetched {
            Ok(resume) => {
                state.content = Some(resume.resume_json.clone());
                state.persisted = Some(resume.resume_json);
                state.loading = false;
                Ok(())
            }
            Err(err) => {
                state.loading = false;
                if matches!(err, TailorError::NotFound(_)) {
                    tracing::warn!(id, "selected resume no longer exists");
                    state.reset();
                }
                Err(err)
            }
        }
    }

    pub fn new_draft(&self) {
        self.state().reset();
        tracing::info!("new draft");
    }

    /// Start an unsaved draft seeded from `resume` ("Tailor Resume").
    pub fn duplicate_as_new_draft(&self, resume: &Resume) {
        let mut state = self.state();
        state.reset();
        state.content = Some(resume.resume_json.clone());
        tracing::info!(source = resume.id, "draft duplicated from resume");
    }

    /// Fetch `id` and start an unsaved copy of it.
    pub async fn duplicate_resume(&self, id: i64) -> Result<Resume> {
        let resume = self.resumes.get(id).await?;
        self.duplicate_as_new_draft(&resume);
        Ok(resume)
    }

    /// Seed a new draft from the pre-named-resume snapshot, if one exists.
    pub async fn restore_legacy_snapshot(&self) -> Result<bool> {
        let Some(document) = self.legacy.load().await? else {
            return Ok(false);
        };
        let mut state = self.state();
        state.reset();
        state.content = Some(document);
        tracing::info!("draft restored from legacy snapshot");
        Ok(true)
    }

    // ---------------
    // AI tailoring
    // ---------------

    /// Record the user's turn and mark an AI request outstanding.
    pub fn begin_ai_request(
        &self,
        text: &str,
        file_content: Option<String>,
    ) -> Result<(AiTicket, TailorRequest)> {
        let text = text.trim();
        if text.is_empty() && file_content.is_none() {
            return Err(TailorError::Validation(
                "Message cannot be empty".to_string(),
            ));
        }
        let mut state = self.state();
        if state.pending.is_some() {
            return Err(TailorError::AiPending);
        }
        let message = ChatMessage::user(text, state.content.clone());
        state.transcript.push(message);
        state.requests_issued += 1;
        let ticket = AiTicket {
            epoch: state.epoch,
            request: state.requests_issued,
        };
        state.pending = Some(ticket);
        let request = TailorRequest {
            messages: state.transcript.clone(),
            file_content,
        };
        Ok((ticket, request))
    }

    /// Replace the draft with the service's document. Returns `false` when the
    /// ticket is stale, in which case nothing changes.
    pub fn apply_ai_update(
        &self,
        ticket: AiTicket,
        content: ResumeDocument,
        reply: Option<String>,
    ) -> bool {
        let (selected, transcript) = {
            let mut state = self.state();
            if state.pending != Some(ticket) || state.epoch != ticket.epoch {
                tracing::debug!(?ticket, "dropping stale AI response");
                return false;
            }
            state.pending = None;
            if let Some(text) = reply {
                state
                    .transcript
                    .push(ChatMessage::assistant(text, Some(content.clone())));
            }
            state.content = Some(content);
            (state.selected_resume_id, state.transcript.clone())
        };
        if let Some(id) = selected {
            self.cache_transcript(id, &transcript);
        }
        true
    }

    /// Give up on an outstanding request without touching the draft.
    pub fn abandon_ai_request(&self, ticket: AiTicket) {
        let mut state = self.state();
        if state.pending == Some(ticket) {
            state.pending = None;
        }
    }

    /// Full chat turn: record, call the service, apply unless superseded.
    pub async fn send_message(
        &self,
        text: &str,
        file_content: Option<String>,
    ) -> Result<AiOutcome> {
        let (ticket, request) = self.begin_ai_request(text, file_content)?;
        let reply = match self.tailor.tailor(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.abandon_ai_request(ticket);
                return Err(err);
            }
        };
        let TailorReply {
            resume_json,
            response,
            ..
        } = reply;
        if self.apply_ai_update(ticket, resume_json, response.clone()) {
            Ok(AiOutcome::Applied { reply: response })
        } else {
            Ok(AiOutcome::Superseded)
        }
    }

    // ---------------
    // Persistence
    // ---------------

    pub async fn save(&self) -> Result<SaveOutcome> {
        let (id, content, transcript, epoch) = {
            let state = self.state();
            if state.pending.is_some() {
                return Err(TailorError::AiPending);
            }
            let Some(content) = state.content.clone() else {
                return Err(TailorError::Validation("Nothing to save yet".to_string()));
            };
            let Some(id) = state.selected_resume_id else {
                return Ok(SaveOutcome::NeedsName);
            };
            (id, content, state.transcript.clone(), state.epoch)
        };

        let updated = self.resumes.update(id, ResumePatch::content(content)).await?;
        {
            let mut state = self.state();
            if state.epoch == epoch {
                state.persisted = Some(updated.resume_json.clone());
            }
        }
        self.cache_transcript(id, &transcript);
        Ok(SaveOutcome::Updated(updated))
    }

    /// Create a resume from the draft. The very first resume also becomes
    /// the default.
    pub async fn save_as_new(&self, name: &str) -> Result<Resume> {
        let name = validate_name(name)?;
        let (content, transcript, epoch) = {
            let state = self.state();
            if state.pending.is_some() {
                return Err(TailorError::AiPending);
            }
            let Some(content) = state.content.clone() else {
                return Err(TailorError::Validation("Nothing to save yet".to_string()));
            };
            (content, state.transcript.clone(), state.epoch)
        };

        let first_page = ResumeQuery {
            page: Some(1),
            page_size: Some(1),
            ..ResumeQuery::default()
        };
        let existing = self.resumes.list(&first_page).await?;
        let created = self
            .resumes
            .create(NewResume {
                name,
                resume_json: content,
            })
            .await?;

        // Best-effort: not transactional with the create.
        if existing.is_empty()
            && let Err(err) = self.default_pointer.set(created.id).await
        {
            tracing::warn!(id = created.id, "could not mark first resume as default: {err}");
        }
        self.cache_transcript(created.id, &transcript);

        let mut state = self.state();
        if state.epoch == epoch {
            state.selected_resume_id = Some(created.id);
            state.persisted = Some(created.resume_json.clone());
        } else {
            tracing::debug!(id = created.id, "draft changed while saving; selection kept");
        }
        Ok(created)
    }

    /// Change only the name; draft content and dirty state are untouched.
    pub async fn rename(&self, id: i64, new_name: &str) -> Result<Resume> {
        let name = validate_name(new_name)?;
        self.resumes.update(id, ResumePatch::name(name)).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.resumes.delete(id).await?;

        match self.default_pointer.get().await {
            Ok(Some(default_id)) if default_id == id => {
                if let Err(err) = self.default_pointer.clear().await {
                    tracing::warn!(id, "could not clear default pointer: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(id, "could not read default pointer: {err}"),
        }
        if let Err(err) = self.transcripts.delete(id) {
            tracing::warn!(id, "could not remove cached transcript: {err}");
        }

        let mut state = self.state();
        if state.selected_resume_id == Some(id) {
            state.reset();
        }
        Ok(())
    }

    pub async fn set_default(&self, id: i64) -> Result<()> {
        if self.default_pointer.get().await? == Some(id) {
            return Ok(());
        }
        self.default_pointer.set(id).await
    }

    pub async fn default_resume_id(&self) -> Result<Option<i64>> {
        self.default_pointer.get().await
    }

    /// Resumes ordered default-first, then most recently updated.
    pub async fn list_resumes(&self, filter: Option<&str>) -> Result<ResumeListing> {
        let name = filter.map(str::to_string).filter(|f| !f.trim().is_empty());
        let (mut resumes, default_id) = futures::try_join!(
            list_all(self.resumes.as_ref(), name),
            self.default_pointer.get()
        )?;
        sort_for_display(&mut resumes, default_id);
        Ok(ResumeListing {
            resumes,
            default_id,
        })
    }

    fn cache_transcript(&self, id: i64, transcript: &[ChatMessage]) {
        if let Err(err) = self.transcripts.save(id, transcript) {
            tracing::warn!(id, "could not cache transcript: {err}");
        }
    }
}
