use tokio::time::Instant;
use tracing::{info, warn};

use super::swap::validate_upload;
use super::{FlowTask, Orchestrator, Trigger};
use crate::collector::{has_image, CollectOutcome};
use crate::config::FaceConfig;
use crate::errors::{BotError, BotResult};
use crate::localization::{t_args_lang, t_lang};
use crate::model::{ChatId, FaceId, InboundMessage, NewFace, SavedFace, UserId};
use crate::presentation::{build_face_list, build_history};

const HISTORY_LIMIT: usize = 10;

/// Trim and check a face name against the owner's existing faces
pub fn validate_face_name(
    name: &str,
    existing: &[SavedFace],
    config: &FaceConfig,
) -> BotResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BotError::user_input("input-face-name-empty"));
    }
    if name.chars().count() > config.max_name_length {
        return Err(BotError::user_input("input-face-name-too-long"));
    }
    if existing
        .iter()
        .any(|face| face.name.to_lowercase() == name.to_lowercase())
    {
        return Err(BotError::user_input("input-face-name-taken"));
    }
    Ok(name.to_string())
}

impl Orchestrator {
    /// Validate the name and limit, then wait for the face photo in the
    /// background
    pub async fn save_face(&self, trigger: &Trigger, name: &str) -> BotResult<FlowTask> {
        let inner = &self.inner;
        let existing = inner.persistence.faces.list_faces(trigger.user_id).await?;
        if existing.len() >= inner.config.faces.max_saved {
            return Err(BotError::user_input("input-face-limit"));
        }
        let name = validate_face_name(name, &existing, &inner.config.faces)?;

        let minutes = inner.config.uploads.save_window.as_secs().div_ceil(60).max(1);
        inner
            .transport
            .send_text(
                trigger.chat_id,
                &t_args_lang(
                    "face-send-photo",
                    &[("name", name.as_str()), ("minutes", &minutes.to_string())],
                    trigger.lang(),
                ),
            )
            .await?;

        let orchestrator = self.clone();
        let trigger = trigger.clone();
        Ok(tokio::spawn(async move {
            orchestrator.collect_face(trigger, name).await
        }))
    }

    async fn collect_face(&self, trigger: Trigger, name: String) {
        let inner = &self.inner;
        let deadline = Instant::now() + inner.config.uploads.save_window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = inner
                .collector
                .wait_for(trigger.user_id, trigger.chat_id, has_image, remaining)
                .await;

            match outcome {
                CollectOutcome::Received(message) => {
                    if let Err(e) = validate_upload(&message, &inner.config.uploads) {
                        self.notify_error(trigger.chat_id, trigger.lang(), &e).await;
                        continue;
                    }
                    match self.store_face(trigger.user_id, &name, &message).await {
                        Ok(face) => {
                            info!(user_id = trigger.user_id, face_id = face.id, "Face saved");
                            self.send_quietly(
                                trigger.chat_id,
                                &t_args_lang(
                                    "face-saved",
                                    &[("name", face.name.as_str())],
                                    trigger.lang(),
                                ),
                            )
                            .await;
                        }
                        Err(e) => self.notify_error(trigger.chat_id, trigger.lang(), &e).await,
                    }
                    return;
                }
                CollectOutcome::TimedOut => {
                    self.send_quietly(trigger.chat_id, &t_lang("face-save-timeout", trigger.lang()))
                        .await;
                    return;
                }
                CollectOutcome::Closed => return,
            }
        }
    }

    /// Insert the face after re-checking limit and name, which may have
    /// changed while the upload window was open
    async fn store_face(
        &self,
        owner_id: UserId,
        name: &str,
        message: &InboundMessage,
    ) -> BotResult<SavedFace> {
        let inner = &self.inner;
        let attachment = message
            .first_image()
            .ok_or_else(|| BotError::user_input("input-no-image"))?;

        let existing = inner.persistence.faces.list_faces(owner_id).await?;
        if existing.len() >= inner.config.faces.max_saved {
            return Err(BotError::user_input("input-face-limit"));
        }
        let name = validate_face_name(name, &existing, &inner.config.faces)?;

        inner
            .persistence
            .faces
            .insert_face(NewFace {
                owner_id,
                name,
                locator: attachment.media.locator(),
                thumbnail: attachment.thumbnail.as_ref().map(|thumb| thumb.locator()),
            })
            .await
    }

    pub async fn show_faces(&self, trigger: &Trigger) -> BotResult<()> {
        let inner = &self.inner;
        let faces = inner.persistence.faces.list_faces(trigger.user_id).await?;
        let preferences = inner
            .persistence
            .preferences
            .get_preferences(trigger.user_id)
            .await?;
        let prompt = build_face_list(
            &faces,
            preferences.default_face_id,
            inner.config.faces.max_saved,
            trigger.lang(),
        );
        inner.transport.send_prompt(trigger.chat_id, &prompt).await?;
        Ok(())
    }

    async fn owned_face(&self, user_id: UserId, face_id: FaceId) -> BotResult<SavedFace> {
        let face = self
            .inner
            .persistence
            .faces
            .get_face(face_id)
            .await?
            .ok_or_else(|| BotError::user_input("input-face-not-found"))?;
        if face.owner_id != user_id {
            return Err(BotError::Ownership { actor: user_id });
        }
        Ok(face)
    }

    pub async fn delete_face(&self, actor: &Trigger, face_id: FaceId) -> BotResult<()> {
        let inner = &self.inner;
        let face = self.owned_face(actor.user_id, face_id).await?;
        if !inner
            .persistence
            .faces
            .delete_face(actor.user_id, face_id)
            .await?
        {
            return Err(BotError::user_input("input-face-not-found"));
        }

        let mut preferences = inner
            .persistence
            .preferences
            .get_preferences(actor.user_id)
            .await?;
        if preferences.default_face_id == Some(face_id) {
            preferences.default_face_id = None;
            inner
                .persistence
                .preferences
                .set_preferences(actor.user_id, &preferences)
                .await?;
        }

        info!(user_id = actor.user_id, face_id, "Face deleted");
        inner
            .transport
            .send_text(
                actor.chat_id,
                &t_args_lang("face-deleted", &[("name", face.name.as_str())], actor.lang()),
            )
            .await?;
        Ok(())
    }

    pub async fn set_default_face(&self, actor: &Trigger, face_id: FaceId) -> BotResult<()> {
        let inner = &self.inner;
        let face = self.owned_face(actor.user_id, face_id).await?;

        let mut preferences = inner
            .persistence
            .preferences
            .get_preferences(actor.user_id)
            .await?;
        preferences.default_face_id = Some(face_id);
        inner
            .persistence
            .preferences
            .set_preferences(actor.user_id, &preferences)
            .await?;

        inner
            .transport
            .send_text(
                actor.chat_id,
                &t_args_lang("face-default-set", &[("name", face.name.as_str())], actor.lang()),
            )
            .await?;
        Ok(())
    }

    pub async fn set_auto_detect(&self, trigger: &Trigger, enabled: bool) -> BotResult<()> {
        let inner = &self.inner;
        let mut preferences = inner
            .persistence
            .preferences
            .get_preferences(trigger.user_id)
            .await?;
        preferences.auto_detect_gifs = enabled;
        inner
            .persistence
            .preferences
            .set_preferences(trigger.user_id, &preferences)
            .await?;

        let key = if enabled {
            "autodetect-on"
        } else {
            "autodetect-off"
        };
        inner
            .transport
            .send_text(trigger.chat_id, &t_lang(key, trigger.lang()))
            .await?;
        Ok(())
    }

    pub async fn show_history(&self, trigger: &Trigger) -> BotResult<()> {
        let inner = &self.inner;
        let records = inner
            .persistence
            .history
            .recent_swaps(trigger.user_id, HISTORY_LIMIT)
            .await?;
        inner
            .transport
            .send_text(trigger.chat_id, &build_history(&records, trigger.lang()))
            .await?;
        Ok(())
    }

    async fn send_quietly(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.inner.transport.send_text(chat_id, text).await {
            warn!(chat_id, error = %e, "Failed to send message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn saved(name: &str) -> SavedFace {
        SavedFace {
            id: 1,
            owner_id: 7,
            name: name.to_string(),
            locator: "tg:x".into(),
            thumbnail: None,
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_face_name_rules() {
        let config = FaceConfig::default();
        assert_eq!(
            validate_face_name("  Me  ", &[], &config).unwrap(),
            "Me".to_string()
        );
        assert!(validate_face_name("   ", &[], &config).is_err());
        assert!(validate_face_name(&"x".repeat(33), &[], &config).is_err());
        assert!(validate_face_name(&"é".repeat(32), &[], &config).is_ok());
        assert!(validate_face_name("me", &[saved("Me")], &config).is_err());
    }
}
