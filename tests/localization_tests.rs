//! # Localization Tests
//!
//! Message retrieval, argument formatting and language fallback for the
//! embedded catalogs.

use faceswap_bot::errors::BotError;
use faceswap_bot::localization::{t_args_lang, t_lang, LocalizationManager};
use std::collections::HashMap;

const EN_CATALOG: &str = include_str!("../locales/en/main.ftl");
const FR_CATALOG: &str = include_str!("../locales/fr/main.ftl");

fn message_keys(catalog: &str) -> Vec<&str> {
    catalog
        .lines()
        .filter(|line| !line.starts_with([' ', '#']))
        .filter_map(|line| line.split_once(" ="))
        .map(|(key, _)| key.trim())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help", "en", None);
        assert!(message.contains("Commands"));
        assert!(message.contains("/search"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert_eq!(message, "Missing translation: nonexistent-key");
    }

    #[test]
    fn test_unsupported_language_falls_back_to_english() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help", "de", None);
        assert!(message.contains("Commands"));
    }

    #[test]
    fn test_regional_tag_resolves_to_primary_language() {
        let manager = setup_localization();

        assert_eq!(manager.resolve_language(Some("fr-CA")), "fr");
        assert_eq!(manager.resolve_language(Some("en_US")), "en");
        assert_eq!(manager.resolve_language(Some("pt-BR")), "en");
        assert_eq!(manager.resolve_language(None), "en");
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("query", "happy dance");
        args.insert("page", "2");
        args.insert("total", "5");

        let message = manager.get_message_in_language("search-results-header", "en", Some(&args));
        assert_eq!(message, "🔎 Results for \"happy dance\" (page 2/5):");
    }

    #[test]
    fn test_arguments_are_not_bidi_isolated() {
        let message = t_args_lang("search-selected", &[("title", "Dance")], Some("fr"));
        assert_eq!(message, "✅ Sélectionné : Dance");
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_catalogs_define_the_same_keys() {
        let mut en = message_keys(EN_CATALOG);
        let mut fr = message_keys(FR_CATALOG);
        en.sort_unstable();
        fr.sort_unstable();
        assert!(!en.is_empty());
        assert_eq!(en, fr);
    }

    #[test]
    fn test_every_error_has_a_translation() {
        let errors = [
            BotError::user_input("input-no-image"),
            BotError::Ownership { actor: 1 },
            BotError::SessionExpired("s1".into()),
            BotError::Provider("quota".into()),
            BotError::Provider(String::new()),
            BotError::ProviderTimeout { attempts: 60 },
            BotError::VerificationFailed("s1".into()),
            BotError::RateLimited {
                retry_after_minutes: 3,
            },
            BotError::InvalidTransition {
                from: faceswap_bot::session::SessionState::Polling,
            },
            BotError::Storage("down".into()),
            BotError::Transport("down".into()),
        ];
        for language in [Some("en"), Some("fr")] {
            for error in &errors {
                let message = error.user_message(language);
                assert!(
                    !message.contains("Missing translation"),
                    "{} has no {:?} message",
                    error.kind(),
                    language
                );
            }
        }
    }

    #[test]
    fn test_user_input_reason_is_embedded() {
        let reason = t_lang("input-file-too-large", None);
        let message = BotError::user_input("input-file-too-large").user_message(None);
        assert!(message.contains(&reason));
    }
}
