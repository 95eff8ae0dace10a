//! UI Builder module for rendering prompts as inline keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::presentation::{Button, ButtonTarget, Prompt};

fn keyboard_button(button: &Button) -> Option<InlineKeyboardButton> {
    match &button.target {
        ButtonTarget::Callback(action) => Some(InlineKeyboardButton::callback(
            button.label.clone(),
            action.encode(),
        )),
        ButtonTarget::Link(url) => match reqwest::Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
            Err(e) => {
                warn!(url = %url, error = %e, "Dropping link button with invalid URL");
                None
            }
        },
    }
}

/// Convert a prompt's button grid; an empty grid yields an empty markup,
/// which removes the keyboard when editing
pub fn prompt_keyboard(prompt: &Prompt) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = prompt
        .keyboard
        .iter()
        .map(|row| row.iter().filter_map(keyboard_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}
