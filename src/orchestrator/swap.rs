use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{FlowTask, Orchestrator, Trigger};
use crate::collector::{has_image, CollectOutcome};
use crate::config::{PromptDelivery, UploadConfig};
use crate::errors::{BotError, BotResult};
use crate::localization::{t_args_lang, t_lang};
use crate::model::{FaceId, InboundMessage, MediaRef, TargetMedia};
use crate::presentation::{build_face_choices, build_upload_request, Prompt};
use crate::rate_limiter::ActionKind;
use crate::session::{
    FaceSelection, Guard, PromptRef, SessionId, SessionState, SwapPatch, SwapSession,
};

/// Where a swap flow was started from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOrigin {
    /// `/swap` sent as a reply to a message
    Command,
    /// GIF noticed in chat by auto-detection
    Detected,
    /// Picked from a search result page
    Search,
}

/// A freshly created swap session
#[derive(Debug)]
pub struct SwapStarted {
    pub session_id: SessionId,
    /// Upload collection, when the user had no saved faces
    pub upload: Option<FlowTask>,
}

/// Check an uploaded face image against the accepted types and size
pub fn validate_upload(message: &InboundMessage, config: &UploadConfig) -> BotResult<MediaRef> {
    let attachment = message
        .first_image()
        .ok_or_else(|| BotError::user_input("input-no-image"))?;

    if let Some(content_type) = attachment.content_type.as_deref() {
        if !config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
        {
            return Err(BotError::user_input("input-unsupported-type"));
        }
    }
    if attachment.size.is_some_and(|size| size > config.max_size) {
        return Err(BotError::user_input("input-file-too-large"));
    }
    Ok(attachment.media.clone())
}

impl Orchestrator {
    /// Create a swap session for `target` and present face choices, or go
    /// straight to upload collection when the user has no saved faces.
    pub async fn start_swap(
        &self,
        trigger: &Trigger,
        target: TargetMedia,
        origin: SwapOrigin,
    ) -> BotResult<SwapStarted> {
        let inner = &self.inner;
        inner
            .rate_limiter
            .check(trigger.user_id, ActionKind::Swap)
            .await?
            .into_result()?;

        let session = SwapSession::new(
            SessionId::generate('w', trigger.user_id, inner.clock.now()),
            target,
            trigger.user_id,
            trigger.chat_id,
            trigger.message_id,
            trigger.language_code.clone(),
            inner.clock.now(),
        );
        let session = inner.swaps.create(session).await?;
        info!(
            session_id = %session.id,
            user_id = trigger.user_id,
            origin = ?origin,
            kind = session.target.kind.as_str(),
            "Swap session created"
        );

        match self.present_swap(&session, origin).await {
            Ok(upload) => Ok(SwapStarted {
                session_id: session.id,
                upload,
            }),
            Err(e) => {
                self.end_session(&inner.swaps, &session.id, SessionState::Failed)
                    .await;
                Err(e)
            }
        }
    }

    async fn present_swap(
        &self,
        session: &SwapSession,
        origin: SwapOrigin,
    ) -> BotResult<Option<FlowTask>> {
        let inner = &self.inner;
        let language_code = session.language_code.as_deref();
        let faces = inner.persistence.faces.list_faces(session.owner_id).await?;
        let preferences = inner
            .persistence
            .preferences
            .get_preferences(session.owner_id)
            .await?;
        let choices = build_face_choices(
            &session.id,
            &faces,
            preferences.default_face_id,
            language_code,
        );

        if choices.upload_only() {
            inner
                .swaps
                .transition(
                    &session.id,
                    Guard::from_states(&[SessionState::Created]),
                    &SwapPatch {
                        state: Some(SessionState::AwaitingUpload),
                        upload_open: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            let prompt = build_upload_request(
                &session.id,
                inner.config.uploads.inline_window.as_secs(),
                true,
                language_code,
            );
            self.post_swap_prompt(session, origin, &prompt).await?;
            Ok(Some(self.spawn_upload_collection(session.id.clone())))
        } else {
            inner
                .swaps
                .update(
                    &session.id,
                    &SwapPatch::state(SessionState::AwaitingSelection),
                )
                .await?;
            self.post_swap_prompt(session, origin, &choices.to_prompt(language_code))
                .await?;
            Ok(None)
        }
    }

    /// Post the swap prompt according to the delivery policy and remember
    /// where it went
    async fn post_swap_prompt(
        &self,
        session: &SwapSession,
        origin: SwapOrigin,
        prompt: &Prompt,
    ) -> BotResult<PromptRef> {
        let inner = &self.inner;
        let direct = origin == SwapOrigin::Detected
            && inner.config.prompt_delivery == PromptDelivery::Direct;

        let mut posted = None;
        if direct {
            let private_chat = session.owner_id as i64;
            match inner.transport.send_prompt(private_chat, prompt).await {
                Ok(message_id) => {
                    posted = Some(PromptRef {
                        chat_id: private_chat,
                        message_id,
                    })
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Direct prompt failed, using origin chat");
                }
            }
        }
        let prompt_ref = match posted {
            Some(prompt_ref) => prompt_ref,
            None => PromptRef {
                chat_id: session.origin_chat_id,
                message_id: inner
                    .transport
                    .send_prompt(session.origin_chat_id, prompt)
                    .await?,
            },
        };

        inner
            .swaps
            .update(
                &session.id,
                &SwapPatch {
                    prompt: Some(prompt_ref),
                    ..Default::default()
                },
            )
            .await?;
        Ok(prompt_ref)
    }

    /// Use a saved face; starts the job in the background
    pub async fn select_face(
        &self,
        actor: &Trigger,
        id: &SessionId,
        face_id: FaceId,
    ) -> BotResult<FlowTask> {
        let inner = &self.inner;
        let session = inner.swaps.get(id).await?;
        if session.owner_id != actor.user_id {
            return Err(BotError::Ownership {
                actor: actor.user_id,
            });
        }

        let face = inner
            .persistence
            .faces
            .get_face(face_id)
            .await?
            .filter(|face| face.owner_id == actor.user_id)
            .ok_or_else(|| BotError::user_input("input-face-not-found"))?;

        let session = inner
            .swaps
            .transition(
                id,
                Guard::from_states(&[SessionState::AwaitingSelection]).with_actor(actor.user_id),
                &SwapPatch {
                    state: Some(SessionState::FaceChosen),
                    face: Some(FaceSelection::Saved {
                        face_id,
                        media: face.media(),
                    }),
                    ..Default::default()
                },
            )
            .await;
        let session = self.distrust_swap(id, session).await?;
        debug!(session_id = %id, face_id, "Saved face chosen");

        let text = t_args_lang(
            "swap-processing",
            &[("name", face.name.as_str())],
            session.language_code.as_deref(),
        );
        self.close_prompt(
            session.prompt_chat_id(),
            session.prompt.map(|prompt| prompt.message_id),
            &text,
        )
        .await;

        let orchestrator = self.clone();
        let id = id.clone();
        Ok(tokio::spawn(async move { orchestrator.drive_job(id).await }))
    }

    /// Switch a session from face choices to collecting an uploaded face
    pub async fn request_upload(&self, actor: &Trigger, id: &SessionId) -> BotResult<FlowTask> {
        let inner = &self.inner;
        let session = inner
            .swaps
            .transition(
                id,
                Guard::from_states(&[SessionState::AwaitingSelection]).with_actor(actor.user_id),
                &SwapPatch {
                    state: Some(SessionState::AwaitingUpload),
                    upload_open: Some(true),
                    ..Default::default()
                },
            )
            .await;
        let session = self.distrust_swap(id, session).await?;

        if let Some(prompt_ref) = session.prompt {
            let prompt = build_upload_request(
                id,
                inner.config.uploads.inline_window.as_secs(),
                false,
                session.language_code.as_deref(),
            );
            if let Err(e) = inner
                .transport
                .edit_prompt(prompt_ref.chat_id, prompt_ref.message_id, &prompt)
                .await
            {
                warn!(session_id = %id, error = %e, "Failed to show upload prompt");
            }
        }

        Ok(self.spawn_upload_collection(id.clone()))
    }

    fn spawn_upload_collection(&self, id: SessionId) -> FlowTask {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.collect_upload(id).await })
    }

    /// Wait for the owner's face upload in the prompt chat. Invalid images
    /// are reported and the wait continues until the window closes.
    async fn collect_upload(&self, id: SessionId) {
        let inner = &self.inner;
        let Ok(session) = inner.swaps.get(&id).await else {
            return;
        };
        let chat_id = session.prompt_chat_id();
        let language_code = session.language_code.as_deref();
        let deadline = Instant::now() + inner.config.uploads.inline_window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = inner
                .collector
                .wait_for(session.owner_id, chat_id, has_image, remaining)
                .await;

            match outcome {
                CollectOutcome::Received(message) => {
                    let media = match validate_upload(&message, &inner.config.uploads) {
                        Ok(media) => media,
                        Err(e) => {
                            self.notify_error(chat_id, language_code, &e).await;
                            continue;
                        }
                    };

                    let patch = SwapPatch {
                        state: Some(SessionState::Submitting),
                        face: Some(FaceSelection::Uploaded { media }),
                        upload_open: Some(false),
                        ..Default::default()
                    };
                    let guard = Guard::from_states(&[SessionState::AwaitingUpload])
                        .with_actor(session.owner_id);
                    match inner.swaps.transition(&id, guard, &patch).await {
                        Ok(_) => {
                            debug!(session_id = %id, "Face upload received");
                            self.drive_job(id).await;
                        }
                        Err(e) => self.fail_swap(&id, e).await,
                    }
                    return;
                }
                CollectOutcome::TimedOut => {
                    if let Some(ended) = self
                        .end_session(&inner.swaps, &id, SessionState::Expired)
                        .await
                    {
                        info!(session_id = %id, "Face upload window closed");
                        self.close_prompt(
                            ended.prompt_chat_id(),
                            ended.prompt.map(|prompt| prompt.message_id),
                            &t_lang("swap-upload-timeout", language_code),
                        )
                        .await;
                    }
                    return;
                }
                CollectOutcome::Closed => {
                    // Replaced by another wait; a cancelled session is already gone
                    if let Some(ended) = self
                        .end_session(&inner.swaps, &id, SessionState::Cancelled)
                        .await
                    {
                        self.close_prompt(
                            ended.prompt_chat_id(),
                            ended.prompt.map(|prompt| prompt.message_id),
                            &t_lang("swap-cancelled", language_code),
                        )
                        .await;
                    }
                    return;
                }
            }
        }
    }

    /// Cancel a swap before submission
    pub async fn cancel_swap(&self, actor: &Trigger, id: &SessionId) -> BotResult<()> {
        let inner = &self.inner;
        let cancelled = inner
            .swaps
            .transition(
                id,
                Guard::owner(actor.user_id),
                &SwapPatch::state(SessionState::Cancelled),
            )
            .await;
        self.distrust_swap(id, cancelled).await?;

        if let Some(ended) = self
            .end_session(&inner.swaps, id, SessionState::Cancelled)
            .await
        {
            if ended.upload_open {
                inner.collector.cancel(ended.owner_id, ended.prompt_chat_id());
            }
            self.close_prompt(
                ended.prompt_chat_id(),
                ended.prompt.map(|prompt| prompt.message_id),
                &t_lang("swap-cancelled", ended.language_code.as_deref()),
            )
            .await;
        }
        Ok(())
    }

    /// A swap whose write could not be read back is failed and removed;
    /// other errors pass through untouched
    async fn distrust_swap<T>(&self, id: &SessionId, result: BotResult<T>) -> BotResult<T> {
        if let Err(error @ BotError::VerificationFailed(_)) = &result {
            self.fail_swap(id, error.clone()).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, MediaKind};

    fn upload(content_type: Option<&str>, size: Option<u64>) -> InboundMessage {
        InboundMessage {
            message_id: 5,
            chat_id: -100,
            user_id: 7,
            language_code: None,
            text: None,
            attachments: vec![Attachment {
                media: MediaRef::ChatFile("face".into()),
                kind: MediaKind::Image,
                content_type: content_type.map(str::to_string),
                size,
                thumbnail: None,
            }],
        }
    }

    #[test]
    fn test_upload_validation() {
        let config = UploadConfig::default();
        assert!(validate_upload(&upload(Some("image/png"), Some(1024)), &config).is_ok());
        assert!(validate_upload(&upload(None, None), &config).is_ok());

        let err = validate_upload(&upload(Some("image/gif"), Some(1024)), &config).unwrap_err();
        assert!(matches!(err, BotError::UserInput(ref key) if key == "input-unsupported-type"));

        let err =
            validate_upload(&upload(Some("image/jpeg"), Some(config.max_size + 1)), &config)
                .unwrap_err();
        assert!(matches!(err, BotError::UserInput(ref key) if key == "input-file-too-large"));
    }
}
