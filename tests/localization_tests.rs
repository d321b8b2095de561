//! # Localization Tests
//!
//! Message retrieval, argument formatting and fallbacks for the bundled
//! Russian and English resources.

use clinic_assistant::localization::{
    all_translations, detect_language, t_args_lang, t_lang, LocalizationManager, DEFAULT_LANGUAGE,
};
use std::collections::{BTreeSet, HashMap};

fn setup_localization() -> LocalizationManager {
    LocalizationManager::new().expect("Failed to create localization manager")
}

fn message_keys(source: &str) -> BTreeSet<String> {
    source
        .lines()
        .filter(|line| !line.starts_with([' ', '#']) && !line.is_empty())
        .filter_map(|line| line.split_once(" =").map(|(key, _)| key.to_string()))
        .collect()
}

#[test]
fn test_get_message_existing_key() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("help", "en", None);
    assert!(message.contains("Available commands"));
    assert!(message.contains("/cancel"));

    let message = manager.get_message_in_language("help", "ru", None);
    assert!(message.contains("Доступные команды"));
}

#[test]
fn test_get_message_nonexistent_key() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("nonexistent-key", "en", None);
    assert_eq!(message, "Missing translation: nonexistent-key");
}

#[test]
fn test_unsupported_language_falls_back_to_russian() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("cancelled", "de", None);
    let russian = manager.get_message_in_language("cancelled", DEFAULT_LANGUAGE, None);
    assert_eq!(message, russian);
    assert!(message.contains("Действие отменено"));
}

#[test]
fn test_get_message_with_args() {
    let manager = setup_localization();

    let mut args = HashMap::new();
    args.insert("id", "42");
    args.insert("status", "Contacted");

    let message = manager.get_message_in_language("admin-status-updated", "en", Some(&args));
    assert_eq!(message, "Request #42: status «Contacted»");
}

#[test]
fn test_get_message_missing_args() {
    let manager = setup_localization();

    // Unresolved placeables are rendered, not dropped
    let message = manager.get_message_in_language("admin-status-updated", "en", None);
    assert!(message.starts_with("Request #"));
}

#[test]
fn test_convenience_functions() {
    assert_eq!(t_lang("btn-cancel", Some("en")), "❌ Cancel");
    assert_eq!(t_lang("btn-cancel", Some("ru-RU")), "❌ Отмена");
    assert_eq!(t_lang("btn-cancel", None), t_lang("btn-cancel", Some("ru")));

    let text = t_args_lang("booking-name-accepted", &[("name", "Anna")], Some("en"));
    assert!(text.starts_with("✅ Nice to meet you, Anna!"));
}

#[test]
fn test_language_detection() {
    assert_eq!(detect_language(Some("en_GB")), "en");
    assert_eq!(detect_language(Some("uk")), "ru");
    assert_eq!(detect_language(Some("")), "ru");
}

#[test]
fn test_menu_labels_differ_between_languages() {
    for key in ["btn-service-info", "btn-prices", "btn-book", "btn-faq"] {
        let labels = all_translations(key);
        assert_eq!(labels.len(), 2, "{key}");
        assert_ne!(labels[0], labels[1], "{key}");
    }
}

#[test]
fn test_resources_define_the_same_keys() {
    let ru = message_keys(include_str!("../locales/ru/main.ftl"));
    let en = message_keys(include_str!("../locales/en/main.ftl"));

    assert!(ru.contains("welcome"));
    assert_eq!(ru, en);
}
