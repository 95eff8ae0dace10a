//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::callback::CallbackAction;
use crate::orchestrator::{Orchestrator, Trigger};

/// Decode the button data, run the action and answer the query. Failures
/// are shown as an alert on the pressed button.
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    orchestrator: Orchestrator,
) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");
    let mut answer = bot.answer_callback_query(q.id.clone());

    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        debug!(user_id = %q.from.id, "Ignoring callback query without data or message");
        answer.await?;
        return Ok(());
    };

    match CallbackAction::decode(data) {
        Ok(action) => {
            let actor = Trigger {
                user_id: q.from.id.0,
                chat_id: message.chat().id.0,
                message_id: message.id().0,
                language_code: q.from.language_code.clone(),
            };
            debug!(user_id = actor.user_id, action = %action, "Dispatching callback action");
            if let Err(e) = orchestrator.handle_action(&actor, action).await {
                warn!(user_id = actor.user_id, kind = e.kind(), error = %e, "Callback action failed");
                answer = answer
                    .text(e.user_message(actor.lang()))
                    .show_alert(true);
            }
        }
        Err(e) => warn!(user_id = %q.from.id, data, error = %e, "Undecodable callback data"),
    }

    // Answer the callback query to remove the loading state
    answer.await?;

    Ok(())
}
