//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `commands`: Slash command definitions
//! - `command_handler`: Routes commands to the orchestrator
//! - `message_handler`: Converts incoming messages and feeds uploads and GIF detection
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Renders prompts as inline keyboards
//! - `transport`: Telegram implementation of the chat transport

pub mod callback_handler;
pub mod command_handler;
pub mod commands;
pub mod message_handler;
pub mod transport;
pub mod ui_builder;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

pub use callback_handler::callback_handler;
pub use command_handler::command_handler;
pub use commands::Command;
pub use message_handler::{message_handler, to_inbound};
pub use transport::TelegramTransport;

/// Update routing: commands first, then plain messages, then button presses
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler))
}
