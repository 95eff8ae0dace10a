//! Session records and the state machine they move through.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ChatId, FaceId, MediaRef, MessageId, TargetMedia, UserId};

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque session identifier, safe to embed in callback data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Build an id from the trigger id and a microsecond timestamp, plus a
    /// process-wide sequence so two triggers in the same microsecond differ.
    pub fn generate(prefix: char, trigger_id: u64, now: DateTime<Utc>) -> Self {
        let micros = now.timestamp_micros().max(0) as u64;
        let sequence = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{prefix}{}-{}{}",
            to_base36(trigger_id),
            to_base36(micros),
            to_base36(sequence % 1296)
        ))
    }

    /// Accept an id decoded from callback data; only `[a-z0-9-]` is valid
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 40
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Externally observable state of a session
///
/// ```text
/// Created -> AwaitingSelection -> (FaceChosen | AwaitingUpload) -> Submitting -> Polling -> Delivered
///                                                                                      \-> Failed
/// Created .. FaceChosen -> Cancelled
/// any non-terminal -> Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    AwaitingSelection,
    FaceChosen,
    AwaitingUpload,
    Submitting,
    Polling,
    Delivered,
    Failed,
    Cancelled,
    Expired,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Delivered
                | SessionState::Failed
                | SessionState::Cancelled
                | SessionState::Expired
        )
    }

    /// Cancellation is honored only before submission starts
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            SessionState::Created
                | SessionState::AwaitingSelection
                | SessionState::FaceChosen
                | SessionState::AwaitingUpload
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Expired | Failed => true,
            Cancelled => self.is_cancellable(),
            AwaitingSelection => matches!(self, Created | AwaitingUpload),
            AwaitingUpload => matches!(self, Created | AwaitingSelection),
            FaceChosen => matches!(self, AwaitingSelection | AwaitingUpload),
            Submitting => matches!(self, FaceChosen | AwaitingUpload),
            Polling => self == Submitting,
            // Search sessions complete straight from selection
            Delivered => matches!(self, Polling | AwaitingSelection),
            Created => false,
        }
    }
}

/// Common surface the session store needs from a record
pub trait SessionRecord: Clone + Send + Sync + fmt::Debug + 'static {
    type Patch: Clone + Send + Sync + fmt::Debug;

    fn id(&self) -> &SessionId;
    fn owner_id(&self) -> UserId;
    fn state(&self) -> SessionState;
    fn last_touched(&self) -> DateTime<Utc>;
    fn touch(&mut self, now: DateTime<Utc>);
    fn apply(&mut self, patch: &Self::Patch);
    /// True when every field set in `patch` holds the patched value
    fn reflects(&self, patch: &Self::Patch) -> bool;
    /// State named by the patch, if it moves the state machine
    fn patch_state(patch: &Self::Patch) -> Option<SessionState>;
    /// Patch that only moves the state machine
    fn state_patch(state: SessionState) -> Self::Patch;
}

/// A single GIF search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub preview_url: String,
}

/// Paged GIF search session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: SessionId,
    pub query: String,
    pub results: Vec<GifResult>,
    pub page_size: usize,
    pub current_page: usize,
    pub owner_id: UserId,
    pub chat_id: ChatId,
    pub message_id: Option<MessageId>,
    pub language_code: Option<String>,
    pub selected: Option<usize>,
    pub state: SessionState,
    pub last_touched: DateTime<Utc>,
}

impl SearchSession {
    /// `results` must be non-empty; callers report empty searches instead
    pub fn new(
        id: SessionId,
        query: impl Into<String>,
        results: Vec<GifResult>,
        page_size: usize,
        owner_id: UserId,
        chat_id: ChatId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            query: query.into(),
            results,
            page_size: page_size.max(1),
            current_page: 0,
            owner_id,
            chat_id,
            message_id: None,
            language_code: None,
            selected: None,
            state: SessionState::Created,
            last_touched: now,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.results.len().div_ceil(self.page_size).max(1)
    }

    /// Index range of the results on the current page
    pub fn page_range(&self) -> std::ops::Range<usize> {
        let start = (self.current_page * self.page_size).min(self.results.len());
        let end = (start + self.page_size).min(self.results.len());
        start..end
    }

    pub fn page_results(&self) -> &[GifResult] {
        &self.results[self.page_range()]
    }

    /// Page after `step`, clamped to the valid range
    pub fn page_after(&self, step: PageStep) -> usize {
        match step {
            PageStep::Next => (self.current_page + 1).min(self.total_pages() - 1),
            PageStep::Prev => self.current_page.saturating_sub(1),
        }
    }

    pub fn selected_result(&self) -> Option<&GifResult> {
        self.selected.and_then(|index| self.results.get(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStep {
    Next,
    Prev,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPatch {
    pub state: Option<SessionState>,
    pub current_page: Option<usize>,
    pub selected: Option<usize>,
    pub message_id: Option<MessageId>,
}

impl SessionRecord for SearchSession {
    type Patch = SearchPatch;

    fn id(&self) -> &SessionId {
        &self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_touched = now;
    }

    fn apply(&mut self, patch: &SearchPatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(page) = patch.current_page {
            self.current_page = page.min(self.total_pages() - 1);
        }
        if let Some(index) = patch.selected {
            if index < self.results.len() {
                self.selected = Some(index);
            }
        }
        if let Some(message_id) = patch.message_id {
            self.message_id = Some(message_id);
        }
    }

    fn reflects(&self, patch: &SearchPatch) -> bool {
        patch.state.is_none_or(|state| self.state == state)
            && patch
                .current_page
                .is_none_or(|page| self.current_page == page)
            && patch
                .selected
                .is_none_or(|index| self.selected == Some(index))
            && patch
                .message_id
                .is_none_or(|message_id| self.message_id == Some(message_id))
    }

    fn patch_state(patch: &SearchPatch) -> Option<SessionState> {
        patch.state
    }

    fn state_patch(state: SessionState) -> SearchPatch {
        SearchPatch {
            state: Some(state),
            ..Default::default()
        }
    }
}

/// Face picked for a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceSelection {
    Saved { face_id: FaceId, media: MediaRef },
    Uploaded { media: MediaRef },
}

impl FaceSelection {
    pub fn media(&self) -> &MediaRef {
        match self {
            FaceSelection::Saved { media, .. } | FaceSelection::Uploaded { media } => media,
        }
    }

    pub fn face_id(&self) -> Option<FaceId> {
        match self {
            FaceSelection::Saved { face_id, .. } => Some(*face_id),
            FaceSelection::Uploaded { .. } => None,
        }
    }
}

/// Where the choice prompt of a session was posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Single-shot face-swap session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSession {
    pub id: SessionId,
    pub target: TargetMedia,
    pub owner_id: UserId,
    pub origin_chat_id: ChatId,
    pub origin_message_id: MessageId,
    pub language_code: Option<String>,
    pub face: Option<FaceSelection>,
    pub prompt: Option<PromptRef>,
    pub upload_open: bool,
    pub job_id: Option<String>,
    pub state: SessionState,
    pub last_touched: DateTime<Utc>,
}

impl SwapSession {
    pub fn new(
        id: SessionId,
        target: TargetMedia,
        owner_id: UserId,
        origin_chat_id: ChatId,
        origin_message_id: MessageId,
        language_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target,
            owner_id,
            origin_chat_id,
            origin_message_id,
            language_code,
            face: None,
            prompt: None,
            upload_open: false,
            job_id: None,
            state: SessionState::Created,
            last_touched: now,
        }
    }

    /// Chat where user-facing prompts of this session live
    pub fn prompt_chat_id(&self) -> ChatId {
        self.prompt.map_or(self.origin_chat_id, |prompt| prompt.chat_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapPatch {
    pub state: Option<SessionState>,
    pub face: Option<FaceSelection>,
    pub prompt: Option<PromptRef>,
    pub upload_open: Option<bool>,
    pub job_id: Option<String>,
}

impl SwapPatch {
    pub fn state(state: SessionState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

impl SessionRecord for SwapSession {
    type Patch = SwapPatch;

    fn id(&self) -> &SessionId {
        &self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_touched = now;
    }

    fn apply(&mut self, patch: &SwapPatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(face) = &patch.face {
            self.face = Some(face.clone());
        }
        if let Some(prompt) = patch.prompt {
            self.prompt = Some(prompt);
        }
        if let Some(open) = patch.upload_open {
            self.upload_open = open;
        }
        if let Some(job_id) = &patch.job_id {
            self.job_id = Some(job_id.clone());
        }
    }

    fn reflects(&self, patch: &SwapPatch) -> bool {
        patch.state.is_none_or(|state| self.state == state)
            && patch
                .face
                .as_ref()
                .is_none_or(|face| self.face.as_ref() == Some(face))
            && patch.prompt.is_none_or(|prompt| self.prompt == Some(prompt))
            && patch.upload_open.is_none_or(|open| self.upload_open == open)
            && patch
                .job_id
                .as_ref()
                .is_none_or(|job_id| self.job_id.as_ref() == Some(job_id))
    }

    fn patch_state(patch: &SwapPatch) -> Option<SessionState> {
        patch.state
    }

    fn state_patch(state: SessionState) -> SwapPatch {
        SwapPatch::state(state)
    }
}
