//! Slash commands understood by the bot

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "search GIFs, e.g. /search happy dance")]
    Search(String),
    #[command(description = "reply to a GIF or photo to swap a face into it")]
    Swap,
    #[command(description = "save a face for reuse, e.g. /saveface Me")]
    SaveFace(String),
    #[command(description = "list and manage saved faces")]
    Faces,
    #[command(description = "show your latest swaps")]
    History,
    #[command(description = "turn GIF detection in chat on or off")]
    Autodetect(String),
    #[command(description = "cancel whatever is in progress")]
    Cancel,
}

/// Interpret the `/autodetect` argument. An empty argument yields `None`.
pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Some(true),
        "off" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("/search happy dance", "faceswap_bot").unwrap(),
            Command::Search("happy dance".to_string())
        );
        assert_eq!(
            Command::parse("/saveface Me", "faceswap_bot").unwrap(),
            Command::SaveFace("Me".to_string())
        );
        assert_eq!(Command::parse("/swap", "faceswap_bot").unwrap(), Command::Swap);
    }

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle(" ON "), Some(true));
        assert_eq!(parse_toggle("off"), Some(false));
        assert_eq!(parse_toggle(""), None);
    }
}
