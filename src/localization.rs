//! # Localization Module
//!
//! Fluent-based message catalog. Resources are embedded at compile time so
//! the bot does not depend on its working directory.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use lazy_static::lazy_static;
use tracing::warn;
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "en";

const RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("fr", include_str!("../locales/fr/main.ftl")),
];

/// Localization manager holding one bundle per supported language
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every embedded language loaded
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();
        for (code, source) in RESOURCES {
            let locale: LanguageIdentifier = code.parse()?;
            bundles.insert(code.to_string(), Self::create_bundle(locale, source)?);
        }
        Ok(Self { bundles })
    }

    fn create_bundle(
        locale: LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Chat clients render the bidi isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid resource for {locale}: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate messages for {locale}: {errors:?}"))?;
        Ok(bundle)
    }

    /// Reduce a platform language tag ("fr-CA", "en_US") to a supported code
    pub fn resolve_language<'a>(&self, language_code: Option<&'a str>) -> &'a str {
        let Some(code) = language_code else {
            return DEFAULT_LANGUAGE;
        };
        let primary = code.split(['-', '_']).next().unwrap_or(DEFAULT_LANGUAGE);
        if self.bundles.contains_key(primary) {
            primary
        } else {
            DEFAULT_LANGUAGE
        }
    }

    /// Get a localized message in the given language, falling back to English
    pub fn get_message_in_language(
        &self,
        key: &str,
        language_code: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let language = self.resolve_language(Some(language_code));
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None if language != DEFAULT_LANGUAGE => {
                return self.get_message_in_language(key, DEFAULT_LANGUAGE, args)
            }
            None => return format!("Missing translation: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting reported errors");
        }
        value.into_owned()
    }
}

lazy_static! {
    static ref LOCALIZATION_MANAGER: Option<LocalizationManager> = match LocalizationManager::new()
    {
        Ok(manager) => Some(manager),
        Err(e) => {
            warn!(error = %e, "Failed to load localization resources");
            None
        }
    };
}

/// Force loading of the embedded resources, reporting parse failures early
pub fn init_localization() -> Result<()> {
    LOCALIZATION_MANAGER
        .as_ref()
        .map(|_| ())
        .ok_or_else(|| anyhow!("Localization resources failed to load"))
}

/// Get a localized message for the user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => manager.get_message_in_language(
            key,
            language_code.unwrap_or(DEFAULT_LANGUAGE),
            None,
        ),
        None => format!("Missing translation: {key}"),
    }
}

/// Get a localized message with arguments for the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => manager.get_message_in_language(
            key,
            language_code.unwrap_or(DEFAULT_LANGUAGE),
            Some(&args_map),
        ),
        None => format!("Missing translation: {key}"),
    }
}
