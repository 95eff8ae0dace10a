use tracing::{debug, info, warn};

use super::{Orchestrator, SwapOrigin, SwapStarted, Trigger};
use crate::errors::{BotError, BotResult};
use crate::localization::{t_args_lang, t_lang};
use crate::model::{MediaKind, MediaRef, TargetMedia};
use crate::presentation::build_result_page;
use crate::rate_limiter::ActionKind;
use crate::session::{Guard, PageStep, SearchPatch, SearchSession, SessionId, SessionState};

impl Orchestrator {
    /// Run a GIF search and post the first result page. Returns `None`
    /// when the query matched nothing.
    pub async fn start_search(
        &self,
        trigger: &Trigger,
        query: &str,
    ) -> BotResult<Option<SessionId>> {
        let inner = &self.inner;
        let query = query.trim();
        if query.is_empty() {
            return Err(BotError::user_input("input-empty-query"));
        }

        inner
            .rate_limiter
            .check_and_record(trigger.user_id, ActionKind::Search)
            .await?;

        let max_results = inner.config.sessions.max_results;
        let mut results = inner
            .gif_search
            .search(query, max_results, None)
            .await?
            .results;
        results.truncate(max_results);

        if results.is_empty() {
            inner
                .transport
                .send_text(
                    trigger.chat_id,
                    &t_args_lang("search-no-results", &[("query", query)], trigger.lang()),
                )
                .await?;
            return Ok(None);
        }

        let now = inner.clock.now();
        let mut session = SearchSession::new(
            SessionId::generate('s', trigger.user_id, now),
            query,
            results,
            inner.config.sessions.page_size,
            trigger.user_id,
            trigger.chat_id,
            now,
        );
        session.language_code = trigger.language_code.clone();
        let session = inner.searches.create(session).await?;
        info!(
            session_id = %session.id,
            user_id = trigger.user_id,
            results = session.results.len(),
            "Search session created"
        );

        match self.present_search(&session).await {
            Ok(()) => Ok(Some(session.id)),
            Err(e) => {
                self.end_session(&inner.searches, &session.id, SessionState::Failed)
                    .await;
                Err(e)
            }
        }
    }

    async fn present_search(&self, session: &SearchSession) -> BotResult<()> {
        let inner = &self.inner;
        let session = inner
            .searches
            .update(
                &session.id,
                &SearchPatch {
                    state: Some(SessionState::AwaitingSelection),
                    ..Default::default()
                },
            )
            .await?;

        let prompt = build_result_page(&session).to_prompt();
        let message_id = inner.transport.send_prompt(session.chat_id, &prompt).await?;
        inner
            .searches
            .update(
                &session.id,
                &SearchPatch {
                    message_id: Some(message_id),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Move one page back or forward. Paging past either end leaves the
    /// page unchanged.
    pub async fn navigate(
        &self,
        actor: &Trigger,
        id: &SessionId,
        step: PageStep,
    ) -> BotResult<SearchSession> {
        let inner = &self.inner;
        let session = inner.searches.get(id).await?;
        let page = session.page_after(step);

        let updated = inner
            .searches
            .transition(
                id,
                Guard::from_states(&[SessionState::AwaitingSelection]).with_actor(actor.user_id),
                &SearchPatch {
                    current_page: Some(page),
                    ..Default::default()
                },
            )
            .await;
        let updated = self.distrust_search(id, updated).await?;

        if page == session.current_page {
            debug!(session_id = %id, page, "Page unchanged");
            return Ok(updated);
        }
        if let Some(message_id) = updated.message_id {
            let prompt = build_result_page(&updated).to_prompt();
            if let Err(e) = inner
                .transport
                .edit_prompt(updated.chat_id, message_id, &prompt)
                .await
            {
                warn!(session_id = %id, error = %e, "Failed to render result page");
            }
        }
        Ok(updated)
    }

    /// Pick a result and hand it to a new swap session. The search session
    /// completes as delivered.
    pub async fn select_result(
        &self,
        actor: &Trigger,
        id: &SessionId,
        index: usize,
    ) -> BotResult<SwapStarted> {
        let inner = &self.inner;
        let session = inner.searches.get(id).await?;
        if session.owner_id != actor.user_id {
            return Err(BotError::Ownership {
                actor: actor.user_id,
            });
        }
        let result = session
            .results
            .get(index)
            .cloned()
            .ok_or_else(|| BotError::user_input("input-result-not-found"))?;

        // Refuse before the search is consumed
        inner
            .rate_limiter
            .check(actor.user_id, ActionKind::Swap)
            .await?
            .into_result()?;

        let selected = inner
            .searches
            .transition(
                id,
                Guard::from_states(&[SessionState::AwaitingSelection]).with_actor(actor.user_id),
                &SearchPatch {
                    state: Some(SessionState::Delivered),
                    selected: Some(index),
                    ..Default::default()
                },
            )
            .await;
        let selected = self.distrust_search(id, selected).await?;
        self.end_session(&inner.searches, id, SessionState::Delivered)
            .await;

        let title = if result.title.is_empty() {
            (index + 1).to_string()
        } else {
            result.title.clone()
        };
        self.close_prompt(
            selected.chat_id,
            selected.message_id,
            &t_args_lang(
                "search-selected",
                &[("title", title.as_str())],
                selected.language_code.as_deref(),
            ),
        )
        .await;

        let trigger = Trigger {
            user_id: actor.user_id,
            chat_id: selected.chat_id,
            message_id: selected.message_id.unwrap_or(actor.message_id),
            language_code: selected.language_code.clone(),
        };
        let target = TargetMedia {
            media: MediaRef::Url(result.url),
            kind: MediaKind::Gif,
        };
        self.start_swap(&trigger, target, SwapOrigin::Search).await
    }

    pub async fn cancel_search(&self, actor: &Trigger, id: &SessionId) -> BotResult<()> {
        let inner = &self.inner;
        let cancelled = inner
            .searches
            .transition(
                id,
                Guard::owner(actor.user_id),
                &SearchPatch {
                    state: Some(SessionState::Cancelled),
                    ..Default::default()
                },
            )
            .await;
        self.distrust_search(id, cancelled).await?;

        if let Some(ended) = self
            .end_session(&inner.searches, id, SessionState::Cancelled)
            .await
        {
            self.close_prompt(
                ended.chat_id,
                ended.message_id,
                &t_lang("search-cancelled", ended.language_code.as_deref()),
            )
            .await;
        }
        Ok(())
    }

    /// A search whose write could not be read back is ended as failed;
    /// other errors pass through untouched
    async fn distrust_search<T>(&self, id: &SessionId, result: BotResult<T>) -> BotResult<T> {
        if let Err(error @ BotError::VerificationFailed(_)) = &result {
            warn!(session_id = %id, error = %error, "Search write not verified, invalidating");
            if let Some(ended) = self
                .end_session(&self.inner.searches, id, SessionState::Failed)
                .await
            {
                self.close_prompt(
                    ended.chat_id,
                    ended.message_id,
                    &error.user_message(ended.language_code.as_deref()),
                )
                .await;
            }
        }
        result
    }
}
