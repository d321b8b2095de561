//! Keyword-matched canned answers, used when the language model is unavailable.

use rand::seq::SliceRandom;

use crate::localization::t_lang;

/// Question topic recognized by keyword
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Price,
    Duration,
    Recovery,
    Risk,
    Preparation,
}

/// Checked in order; the first topic with a matching keyword wins.
const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Price,
        &["цена", "цены", "цену", "ценам", "стоимост", "сколько стоит", "price", "cost", "how much"],
    ),
    (
        Topic::Duration,
        &["длительност", "сколько длится", "как долго", "duration", "how long"],
    ),
    (
        Topic::Recovery,
        &["реабилитац", "восстановлен", "recovery", "rehab", "healing"],
    ),
    (
        Topic::Risk,
        &["риск", "осложнен", "опасно", "risk", "complication", "dangerous"],
    ),
    (
        Topic::Preparation,
        &["подготовк", "подготовит", "анализы", "prepar"],
    ),
];

impl Topic {
    /// Detect the topic of a question by keyword
    pub fn detect(question: &str) -> Option<Topic> {
        let lowered = question.to_lowercase();
        TOPIC_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
            .map(|(topic, _)| *topic)
    }

    /// Translation keys of the canned replies for this topic
    pub fn reply_keys(&self) -> &'static [&'static str] {
        match self {
            Topic::Price => &["fallback-price-1", "fallback-price-2"],
            Topic::Duration => &["fallback-duration-1", "fallback-duration-2"],
            Topic::Recovery => &["fallback-recovery-1", "fallback-recovery-2"],
            Topic::Risk => &["fallback-risk-1", "fallback-risk-2"],
            Topic::Preparation => &["fallback-preparation-1", "fallback-preparation-2"],
        }
    }
}

/// Random canned reply for the question's topic, if one matches
pub fn fallback_reply(question: &str, language_code: Option<&str>) -> Option<String> {
    let topic = Topic::detect(question)?;
    let key = topic.reply_keys().choose(&mut rand::thread_rng())?;
    Some(t_lang(key, language_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_topics() {
        assert_eq!(Topic::detect("Какая цена операции?"), Some(Topic::Price));
        assert_eq!(Topic::detect("Сколько стоит блефаропластика"), Some(Topic::Price));
        assert_eq!(Topic::detect("Какова длительность операции?"), Some(Topic::Duration));
        assert_eq!(Topic::detect("Как проходит реабилитация"), Some(Topic::Recovery));
        assert_eq!(Topic::detect("Есть ли РИСКИ?"), Some(Topic::Risk));
        assert_eq!(Topic::detect("Нужна ли подготовка?"), Some(Topic::Preparation));
        assert_eq!(Topic::detect("How long is the recovery?"), Some(Topic::Duration));
        assert_eq!(Topic::detect("Добрый день"), None);
    }

    #[test]
    fn test_reply_is_one_of_the_variants() {
        let reply = fallback_reply("какие риски?", Some("ru")).unwrap();
        let variants: Vec<String> = Topic::Risk
            .reply_keys()
            .iter()
            .map(|key| t_lang(key, Some("ru")))
            .collect();
        assert!(variants.contains(&reply));
    }

    #[test]
    fn test_no_reply_without_keyword() {
        assert!(fallback_reply("Привет", None).is_none());
    }

    #[test]
    fn test_english_reply() {
        let reply = fallback_reply("What is the price?", Some("en")).unwrap();
        assert!(reply.contains("rubles") || reply.contains("price"));
    }
}
