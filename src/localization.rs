//! # Localization Module
//!
//! Fluent-based translations for every user-facing string. Russian is the
//! default language; English is selected from the Telegram `language_code`.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "ru";
pub const SUPPORTED_LANGUAGES: &[&str] = &["ru", "en"];

const RU_RESOURCES: &str = include_str!("../locales/ru/main.ftl");
const EN_RESOURCES: &str = include_str!("../locales/en/main.ftl");

/// Localization manager for the clinic assistant
#[derive(Default)]
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a manager with all bundled languages loaded
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();
        bundles.insert("ru".to_string(), Self::create_bundle("ru", RU_RESOURCES)?);
        bundles.insert("en".to_string(), Self::create_bundle("en", EN_RESOURCES)?);
        Ok(Self { bundles })
    }

    fn create_bundle(language: &str, source: &str) -> Result<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = language.parse()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Unicode isolation marks around placeables confuse Telegram clients
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid {language} resource: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate {language} messages: {errors:?}"))?;

        Ok(bundle)
    }

    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Get a message in a specific language, falling back to Russian
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
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
        bundle
            .format_pattern(pattern, fluent_args.as_ref(), &mut errors)
            .into_owned()
    }
}

static LOCALIZATION: LazyLock<LocalizationManager> = LazyLock::new(|| {
    LocalizationManager::new().unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to load translations");
        LocalizationManager::default()
    })
});

/// Get the shared localization manager
pub fn get_localization_manager() -> &'static LocalizationManager {
    &LOCALIZATION
}

/// Map a Telegram language code onto a supported language
pub fn detect_language(language_code: Option<&str>) -> &'static str {
    let primary = language_code
        .and_then(|code| code.split(['-', '_']).next())
        .map(str::to_lowercase);

    match primary.as_deref() {
        Some(code) => SUPPORTED_LANGUAGES
            .iter()
            .copied()
            .find(|supported| *supported == code)
            .unwrap_or(DEFAULT_LANGUAGE),
        None => DEFAULT_LANGUAGE,
    }
}

/// Localized message for a Telegram language code
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    get_localization_manager().get_message_in_language(key, detect_language(language_code), None)
}

/// Localized message with arguments for a Telegram language code
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    get_localization_manager().get_message_in_language(key, detect_language(language_code), Some(&args_map))
}

/// Every translation of a key, used to recognize button presses in any language
pub fn all_translations(key: &str) -> Vec<String> {
    SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| get_localization_manager().get_message_in_language(key, lang, None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Some("en")), "en");
        assert_eq!(detect_language(Some("en-US")), "en");
        assert_eq!(detect_language(Some("RU")), "ru");
        assert_eq!(detect_language(Some("de")), DEFAULT_LANGUAGE);
        assert_eq!(detect_language(None), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_resources_parse() {
        let manager = LocalizationManager::new().unwrap();
        assert!(manager.is_language_supported("ru"));
        assert!(manager.is_language_supported("en"));
        assert!(!manager.is_language_supported("fr"));
    }

    #[test]
    fn test_no_isolation_marks() {
        let text = t_args_lang("booking-name-accepted", &[("name", "Анна")], Some("ru"));
        assert!(text.contains("Приятно познакомиться, Анна!"));
        assert!(!text.contains('\u{2068}'));
    }

    #[test]
    fn test_all_translations_of_button() {
        let labels = all_translations("btn-book");
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&"📅 Записаться на консультацию".to_string()));
        assert!(labels.contains(&"📅 Book a consultation".to_string()));
    }
}
