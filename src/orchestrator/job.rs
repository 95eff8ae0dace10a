use tracing::{debug, info, warn};

use super::poller::{poll_job, PollPolicy};
use super::Orchestrator;
use crate::errors::{BotError, BotResult};
use crate::localization::t_lang;
use crate::media::detect_media_format;
use crate::model::{MediaKind, SwapRecord};
use crate::providers::JobHandle;
use crate::rate_limiter::ActionKind;
use crate::session::{FaceSelection, Guard, SessionId, SessionState, SwapPatch, SwapSession};
use crate::transport::OutgoingMedia;

impl Orchestrator {
    /// Run a swap job to completion, converting any failure into the
    /// session's single failure notice
    pub(super) async fn drive_job(&self, id: SessionId) {
        if let Err(e) = self.run_job(&id).await {
            self.fail_swap(&id, e).await;
        }
    }

    async fn run_job(&self, id: &SessionId) -> BotResult<()> {
        let inner = &self.inner;

        let mut session = inner.swaps.get(id).await?;
        if session.state == SessionState::FaceChosen {
            session = inner
                .swaps
                .transition(
                    id,
                    Guard::from_states(&[SessionState::FaceChosen]),
                    &SwapPatch::state(SessionState::Submitting),
                )
                .await?;
        }
        if session.state != SessionState::Submitting {
            return Err(BotError::InvalidTransition {
                from: session.state,
            });
        }
        let face = session
            .face
            .clone()
            .ok_or_else(|| BotError::user_input("input-face-not-found"))?;

        inner
            .rate_limiter
            .check_and_record(session.owner_id, ActionKind::Swap)
            .await?;

        let job = self.submit(&session, &face).await?;
        inner
            .swaps
            .transition(
                id,
                Guard::from_states(&[SessionState::Submitting]),
                &SwapPatch {
                    state: Some(SessionState::Polling),
                    job_id: Some(job.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        // Touching on every attempt keeps a long job clear of the idle sweep
        let swaps = &inner.swaps;
        let status = poll_job(
            inner.face_swap.as_ref(),
            &job,
            PollPolicy::for_job(&inner.config.polling, job.kind),
            inner.sleeper.as_ref(),
            move |_| swaps.touch(id),
        )
        .await?;

        let result_url = status
            .result_url
            .clone()
            .ok_or_else(|| BotError::Provider(String::new()))?;
        let bytes = inner.face_swap.fetch_result(&result_url).await?;
        let format = detect_media_format(&bytes);
        debug!(session_id = %id, format = ?format, size = bytes.len(), "Result fetched");

        let record = SwapRecord {
            user_id: session.owner_id,
            chat_id: session.origin_chat_id,
            target_locator: session.target.media.locator(),
            face_id: face.face_id(),
            job_id: job.id.clone(),
            result_url,
            credits_charged: status.credits_charged,
            media_kind: format.media_kind(),
            created_at: inner.clock.now(),
        };
        if let Err(e) = inner.persistence.history.insert_swap(&record).await {
            warn!(session_id = %id, error = %e, "Failed to record swap history");
        }
        if let Some(face_id) = face.face_id() {
            if let Err(e) = inner.persistence.faces.increment_usage(face_id).await {
                warn!(session_id = %id, face_id, error = %e, "Failed to bump face usage");
            }
        }

        let language_code = session.language_code.as_deref();
        inner
            .transport
            .send_media(
                session.origin_chat_id,
                OutgoingMedia {
                    bytes,
                    format,
                    caption: Some(t_lang("swap-result-caption", language_code)),
                    reply_to: (session.origin_message_id > 0).then_some(session.origin_message_id),
                },
            )
            .await?;

        inner
            .swaps
            .transition(
                id,
                Guard::from_states(&[SessionState::Polling]),
                &SwapPatch::state(SessionState::Delivered),
            )
            .await?;
        if let Some(ended) = self
            .end_session(&inner.swaps, id, SessionState::Delivered)
            .await
        {
            info!(session_id = %id, job_id = %job.id, credits = ?status.credits_charged, "Swap delivered");
            self.close_prompt(
                ended.prompt_chat_id(),
                ended.prompt.map(|prompt| prompt.message_id),
                &t_lang("swap-delivered", language_code),
            )
            .await;
        }
        Ok(())
    }

    /// Fetch both assets, stage them with the provider and submit the job.
    /// Provider calls go through the circuit breaker.
    async fn submit(&self, session: &SwapSession, face: &FaceSelection) -> BotResult<JobHandle> {
        let inner = &self.inner;

        let face_bytes = inner.transport.fetch_media(face.media()).await?;
        let target_bytes = inner.transport.fetch_media(&session.target.media).await?;

        if inner.breaker.is_open() {
            warn!(session_id = %session.id, "Circuit breaker open, not submitting");
            return Err(BotError::Provider(String::new()));
        }

        let submitted = async {
            let source = inner
                .face_swap
                .stage_asset(face_bytes, MediaKind::Image)
                .await?;
            let target = inner
                .face_swap
                .stage_asset(target_bytes, session.target.kind)
                .await?;
            if session.target.kind.is_animated() {
                inner
                    .face_swap
                    .submit_media_job(
                        &source,
                        &target,
                        inner.config.polling.max_media_duration_secs,
                    )
                    .await
            } else {
                inner.face_swap.submit_image_job(&source, &target).await
            }
        }
        .await;

        match &submitted {
            Ok(job) => {
                inner.breaker.record_success();
                info!(session_id = %session.id, job_id = %job.id, kind = ?job.kind, "Swap job submitted");
            }
            Err(_) => inner.breaker.record_failure(),
        }
        submitted
    }

    /// End a swap as failed and send its one failure message. A session
    /// that is already gone was reported by whoever removed it.
    pub(super) async fn fail_swap(&self, id: &SessionId, error: BotError) {
        warn!(session_id = %id, kind = error.kind(), error = %error, "Swap flow failed");

        let Some(ended) = self
            .end_session(&self.inner.swaps, id, SessionState::Failed)
            .await
        else {
            return;
        };
        let text = error.user_message(ended.language_code.as_deref());
        self.close_prompt(
            ended.prompt_chat_id(),
            ended.prompt.map(|prompt| prompt.message_id),
            &text,
        )
        .await;
    }
}
