//! Command Handler module for slash commands

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::{BotError, BotResult};
use crate::gif_detection::detect_target;
use crate::localization::t_lang;
use crate::orchestrator::{Orchestrator, SwapOrigin, Trigger};

use super::commands::{parse_toggle, Command};
use super::message_handler::to_inbound;

/// Handle a parsed slash command
pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    orchestrator: Orchestrator,
) -> Result<()> {
    let Some(inbound) = to_inbound(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring command without sender");
        return Ok(());
    };
    let trigger = Trigger::from_message(&inbound);
    debug!(user_id = trigger.user_id, command = ?cmd, "Received command");

    let outcome = match cmd {
        Command::Start => reply(&bot, &trigger, "welcome").await,
        Command::Help => reply(&bot, &trigger, "help").await,
        Command::Search(query) => orchestrator
            .start_search(&trigger, &query)
            .await
            .map(|session| {
                if let Some(session_id) = session {
                    info!(user_id = trigger.user_id, session_id = %session_id, "Search started");
                }
            }),
        Command::Swap => swap_replied(&msg, &trigger, &orchestrator).await,
        // The save flow keeps running after the handler returns
        Command::SaveFace(name) => orchestrator.save_face(&trigger, &name).await.map(|_| ()),
        Command::Faces => orchestrator.show_faces(&trigger).await,
        Command::History => orchestrator.show_history(&trigger).await,
        Command::Autodetect(arg) => match parse_toggle(&arg) {
            Some(enabled) => orchestrator.set_auto_detect(&trigger, enabled).await,
            None => reply(&bot, &trigger, "autodetect-usage").await,
        },
        Command::Cancel => orchestrator.cancel_all(&trigger).await.map(|_| ()),
    };

    if let Err(e) = outcome {
        warn!(user_id = trigger.user_id, kind = e.kind(), error = %e, "Command failed");
        orchestrator
            .notify_error(trigger.chat_id, trigger.lang(), &e)
            .await;
    }

    Ok(())
}

/// `/swap` sent as a reply: the replied message holds the target
async fn swap_replied(msg: &Message, trigger: &Trigger, orchestrator: &Orchestrator) -> BotResult<()> {
    let target = msg
        .reply_to_message()
        .and_then(to_inbound)
        .and_then(|replied| detect_target(&replied).map(|target| (replied.message_id, target)));
    let Some((target_message_id, target)) = target else {
        return Err(BotError::user_input("input-no-target"));
    };

    let trigger = Trigger {
        message_id: target_message_id,
        ..trigger.clone()
    };
    orchestrator
        .start_swap(&trigger, target, SwapOrigin::Command)
        .await
        .map(|_| ())
}

async fn reply(bot: &Bot, trigger: &Trigger, key: &str) -> BotResult<()> {
    bot.send_message(ChatId(trigger.chat_id), t_lang(key, trigger.lang()))
        .await
        .map_err(|e| BotError::Transport(e.to_string()))?;
    Ok(())
}
