//! Common test utilities: in-process fakes for every orchestrator
//! collaborator and a harness wiring them together.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use faceswap_bot::clock::ManualClock;
use faceswap_bot::config::{OrchestratorConfig, RateLimitConfig, RecoveryConfig};
use faceswap_bot::errors::{BotError, BotResult};
use faceswap_bot::media::MediaFormat;
use faceswap_bot::model::{
    Attachment, ChatId, InboundMessage, MediaKind, MediaRef, MessageId, NewFace, SavedFace,
    UserId,
};
use faceswap_bot::orchestrator::{Collaborators, Orchestrator, Sleeper, Trigger};
use faceswap_bot::persistence::{FaceStore, Persistence};
use faceswap_bot::presentation::Prompt;
use faceswap_bot::providers::{
    FaceSwapProvider, GifSearchPage, GifSearchProvider, JobHandle, JobKind, JobStatus,
};
use faceswap_bot::session::{GifResult, SearchSession, SessionStore, SwapSession};
use faceswap_bot::transport::{ChatTransport, OutgoingMedia};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00";

pub const USER: UserId = 1001;
pub const OTHER_USER: UserId = 2002;
pub const GROUP_CHAT: ChatId = -100_500;

/// Everything the fake transport was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Prompt {
        chat_id: ChatId,
        message_id: MessageId,
        prompt: Prompt,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        prompt: Prompt,
    },
    Media {
        chat_id: ChatId,
        format: MediaFormat,
        caption: Option<String>,
        reply_to: Option<MessageId>,
    },
}

#[derive(Default)]
pub struct FakeTransport {
    next_message_id: AtomicI32,
    sent: Mutex<Vec<Sent>>,
    unreachable_chats: Mutex<HashSet<ChatId>>,
}

impl FakeTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every send to `chat_id` fail, like a user who never opened a
    /// private chat with the bot
    pub fn make_unreachable(&self, chat_id: ChatId) {
        self.unreachable_chats.lock().unwrap().insert(chat_id);
    }

    pub fn prompts(&self) -> Vec<(ChatId, MessageId, Prompt)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Prompt {
                    chat_id,
                    message_id,
                    prompt,
                } => Some((chat_id, message_id, prompt)),
                _ => None,
            })
            .collect()
    }

    pub fn last_prompt(&self) -> Option<(ChatId, MessageId, Prompt)> {
        self.prompts().pop()
    }

    pub fn edits(&self) -> Vec<(MessageId, Prompt)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Edit {
                    message_id, prompt, ..
                } => Some((message_id, prompt)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn media_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|sent| matches!(sent, Sent::Media { .. }))
            .count()
    }

    fn check_reachable(&self, chat_id: ChatId) -> BotResult<()> {
        if self.unreachable_chats.lock().unwrap().contains(&chat_id) {
            return Err(BotError::Transport(format!("chat {chat_id} unreachable")));
        }
        Ok(())
    }

    fn next_id(&self) -> MessageId {
        self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> BotResult<MessageId> {
        self.check_reachable(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.next_id())
    }

    async fn send_prompt(&self, chat_id: ChatId, prompt: &Prompt) -> BotResult<MessageId> {
        self.check_reachable(chat_id)?;
        let message_id = self.next_id();
        self.sent.lock().unwrap().push(Sent::Prompt {
            chat_id,
            message_id,
            prompt: prompt.clone(),
        });
        Ok(message_id)
    }

    async fn edit_prompt(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        prompt: &Prompt,
    ) -> BotResult<()> {
        self.check_reachable(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            prompt: prompt.clone(),
        });
        Ok(())
    }

    async fn send_media(&self, chat_id: ChatId, media: OutgoingMedia) -> BotResult<MessageId> {
        self.check_reachable(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Media {
            chat_id,
            format: media.format,
            caption: media.caption,
            reply_to: media.reply_to,
        });
        Ok(self.next_id())
    }

    async fn fetch_media(&self, _media: &MediaRef) -> BotResult<Vec<u8>> {
        Ok(PNG_BYTES.to_vec())
    }
}

/// Face-swap provider that reports `pending` a scripted number of times
/// before its final status
pub struct FakeFaceSwap {
    pending_polls: u32,
    final_status: Option<JobStatus>,
    fail_submission: bool,
    polls: AtomicU32,
    staged: AtomicU32,
    submitted: Mutex<Vec<JobKind>>,
}

impl FakeFaceSwap {
    /// Completes on the first poll
    pub fn completing() -> Self {
        Self::pending_then(0, Some(JobStatus::complete("https://cdn.example/result.gif", Some(3))))
    }

    /// `pending` for `polls` attempts, then `final_status` (or pending
    /// forever when `None`)
    pub fn pending_then(polls: u32, final_status: Option<JobStatus>) -> Self {
        Self {
            pending_polls: polls,
            final_status,
            fail_submission: false,
            polls: AtomicU32::new(0),
            staged: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_submission() -> Self {
        Self {
            fail_submission: true,
            ..Self::completing()
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn staged(&self) -> u32 {
        self.staged.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<JobKind> {
        self.submitted.lock().unwrap().clone()
    }

    fn submit(&self, kind: JobKind) -> BotResult<JobHandle> {
        if self.fail_submission {
            return Err(BotError::Provider("insufficient credits".to_string()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(kind);
        Ok(JobHandle {
            id: format!("job-{}", submitted.len()),
            kind,
        })
    }
}

#[async_trait]
impl FaceSwapProvider for FakeFaceSwap {
    async fn stage_asset(&self, _bytes: Vec<u8>, kind: MediaKind) -> BotResult<String> {
        let n = self.staged.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("api-assets/{}-{n}", kind.as_str()))
    }

    async fn submit_image_job(&self, _source: &str, _target: &str) -> BotResult<JobHandle> {
        self.submit(JobKind::Image)
    }

    async fn submit_media_job(
        &self,
        _source: &str,
        _target: &str,
        _max_duration_secs: u32,
    ) -> BotResult<JobHandle> {
        self.submit(JobKind::Media)
    }

    async fn get_job_status(&self, _job: &JobHandle) -> BotResult<JobStatus> {
        let attempt = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.pending_polls {
            return Ok(JobStatus::pending());
        }
        Ok(self.final_status.clone().unwrap_or_else(JobStatus::pending))
    }

    async fn fetch_result(&self, _url: &str) -> BotResult<Vec<u8>> {
        Ok(GIF_BYTES.to_vec())
    }
}

/// Search provider over a fixed result list
pub struct FakeGifSearch {
    results: Vec<GifResult>,
}

impl FakeGifSearch {
    pub fn with_results(count: usize) -> Self {
        Self {
            results: gif_results(count),
        }
    }
}

#[async_trait]
impl GifSearchProvider for FakeGifSearch {
    async fn search(
        &self,
        _query: &str,
        limit: usize,
        _cursor: Option<&str>,
    ) -> BotResult<GifSearchPage> {
        Ok(GifSearchPage {
            results: self.results.iter().take(limit).cloned().collect(),
            next_cursor: None,
        })
    }
}

pub fn gif_results(count: usize) -> Vec<GifResult> {
    (0..count)
        .map(|i| GifResult {
            id: format!("gif-{i}"),
            title: format!("Excited {i}"),
            url: format!("https://media.tenor.com/{i}.gif"),
            preview_url: format!("https://media.tenor.com/{i}-tiny.gif"),
        })
        .collect()
}

/// Sleeper that returns immediately and counts calls
#[derive(Default)]
pub struct NoopSleeper {
    sleeps: AtomicU32,
}

impl NoopSleeper {
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

/// Orchestrator wired to fakes
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub transport: Arc<FakeTransport>,
    pub face_swap: Arc<FakeFaceSwap>,
    pub persistence: Persistence,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<NoopSleeper>,
}

pub struct HarnessBuilder {
    config: OrchestratorConfig,
    rate_limits: RateLimitConfig,
    face_swap: FakeFaceSwap,
    search_results: usize,
    swaps: Option<SessionStore<SwapSession>>,
    searches: Option<SessionStore<SearchSession>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn face_swap(mut self, face_swap: FakeFaceSwap) -> Self {
        self.face_swap = face_swap;
        self
    }

    pub fn search_results(mut self, count: usize) -> Self {
        self.search_results = count;
        self
    }

    /// Use a caller-built swap store (e.g. over a recording backend)
    pub fn swaps(mut self, swaps: SessionStore<SwapSession>) -> Self {
        self.swaps = Some(swaps);
        self
    }

    /// Use a caller-built search store
    pub fn searches(mut self, searches: SessionStore<SearchSession>) -> Self {
        self.searches = Some(searches);
        self
    }

    pub fn build_with_clock(self, clock: Arc<ManualClock>) -> Harness {
        let transport = Arc::new(FakeTransport::default());
        let face_swap = Arc::new(self.face_swap);
        let sleeper = Arc::new(NoopSleeper::default());
        let persistence = Persistence::in_memory();

        let deps = Collaborators {
            persistence: persistence.clone(),
            face_swap: face_swap.clone(),
            gif_search: Arc::new(FakeGifSearch::with_results(self.search_results)),
            transport: transport.clone(),
            clock: clock.clone(),
            sleeper: sleeper.clone(),
        };
        let searches = self.searches.unwrap_or_else(|| {
            SessionStore::in_memory(clock.clone(), self.config.sessions.search_ttl)
        });
        let swaps = self.swaps.unwrap_or_else(|| {
            SessionStore::in_memory(clock.clone(), self.config.sessions.swap_ttl)
        });
        let orchestrator = Orchestrator::with_stores(
            self.config,
            self.rate_limits,
            RecoveryConfig::default(),
            deps,
            searches,
            swaps,
        );

        Harness {
            orchestrator,
            transport,
            face_swap,
            persistence,
            clock,
            sleeper,
        }
    }

    pub fn build(self) -> Harness {
        self.build_with_clock(Arc::new(ManualClock::new(Utc::now())))
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: OrchestratorConfig::default(),
            rate_limits: RateLimitConfig::default(),
            face_swap: FakeFaceSwap::completing(),
            search_results: 23,
            swaps: None,
            searches: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub async fn save_face(&self, owner_id: UserId, name: &str) -> SavedFace {
        self.persistence
            .faces
            .insert_face(NewFace {
                owner_id,
                name: name.to_string(),
                locator: format!("tg:face-{name}"),
                thumbnail: None,
            })
            .await
            .unwrap()
    }

    /// Wait until a background flow has opened its upload wait
    pub async fn until_collecting(&self, user_id: UserId, chat_id: ChatId) {
        for _ in 0..200 {
            if self.orchestrator.is_collecting(user_id, chat_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("upload wait never opened for user {user_id} in chat {chat_id}");
    }
}

pub fn trigger(user_id: UserId, chat_id: ChatId, message_id: MessageId) -> Trigger {
    Trigger {
        user_id,
        chat_id,
        message_id,
        language_code: None,
    }
}

pub fn gif_target() -> faceswap_bot::model::TargetMedia {
    faceswap_bot::model::TargetMedia {
        media: MediaRef::Url("https://media.tenor.com/dance.gif".to_string()),
        kind: MediaKind::Gif,
    }
}

pub fn image_target() -> faceswap_bot::model::TargetMedia {
    faceswap_bot::model::TargetMedia {
        media: MediaRef::Url("https://example.com/portrait.png".to_string()),
        kind: MediaKind::Image,
    }
}

pub fn photo_message(
    user_id: UserId,
    chat_id: ChatId,
    message_id: MessageId,
    content_type: &str,
) -> InboundMessage {
    InboundMessage {
        message_id,
        chat_id,
        user_id,
        language_code: None,
        text: None,
        attachments: vec![Attachment {
            media: MediaRef::ChatFile(format!("photo-{message_id}")),
            kind: MediaKind::Image,
            content_type: Some(content_type.to_string()),
            size: Some(2048),
            thumbnail: None,
        }],
    }
}

pub fn animation_message(user_id: UserId, chat_id: ChatId, message_id: MessageId) -> InboundMessage {
    InboundMessage {
        message_id,
        chat_id,
        user_id,
        language_code: None,
        text: None,
        attachments: vec![Attachment {
            media: MediaRef::ChatFile(format!("anim-{message_id}")),
            kind: MediaKind::Gif,
            content_type: Some("video/mp4".to_string()),
            size: Some(40_000),
            thumbnail: None,
        }],
    }
}
