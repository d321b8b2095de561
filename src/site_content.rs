//! Cached website excerpts injected into model prompts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::db::NewService;
use crate::site_parser::fetch_service;

/// How long a failed fetch suppresses new attempts for the same page
const FAILURE_COOLDOWN: Duration = Duration::from_secs(600);

/// Question fragments that point at the eyelid surgery page
const EYELID_KEYWORDS: &[&str] = &[
    "блефаропластик",
    "пластика век",
    "пластику век",
    "верхние веки",
    "верхних век",
    "blepharoplasty",
    "eyelid",
];

#[derive(Debug, Clone)]
enum CacheEntry {
    Loaded(NewService),
    Failed(Instant),
}

/// Maps question keywords to clinic pages and caches their parsed content
pub struct SiteContentCache {
    client: reqwest::Client,
    pages: Vec<(String, String)>,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl SiteContentCache {
    /// Cache with the default keyword map pointing at `service_url`
    pub fn new(client: reqwest::Client, service_url: &str) -> Self {
        let pages = EYELID_KEYWORDS
            .iter()
            .map(|keyword| (keyword.to_string(), service_url.to_string()))
            .collect();
        Self::with_pages(client, pages)
    }

    /// Cache with an explicit `(keyword, url)` map
    pub fn with_pages(client: reqwest::Client, pages: Vec<(String, String)>) -> Self {
        Self {
            client,
            pages,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// URL of the page relevant to the question, if any keyword matches
    pub fn page_for(&self, question: &str) -> Option<&str> {
        let lowered = question.to_lowercase();
        self.pages
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, url)| url.as_str())
    }

    /// Parsed page content, fetched at most once per page
    pub async fn content_for_url(&self, url: &str) -> Option<NewService> {
        if let Some(entry) = self.cache.read().await.get(url) {
            match entry {
                CacheEntry::Loaded(service) => return Some(service.clone()),
                CacheEntry::Failed(at) if at.elapsed() < FAILURE_COOLDOWN => return None,
                CacheEntry::Failed(_) => {}
            }
        }

        let entry = match fetch_service(&self.client, url).await {
            Ok(service) => {
                info!(url, "Cached website content");
                CacheEntry::Loaded(service)
            }
            Err(err) => {
                warn!(url, error = %err, "Failed to load website content");
                CacheEntry::Failed(Instant::now())
            }
        };

        let result = match &entry {
            CacheEntry::Loaded(service) => Some(service.clone()),
            CacheEntry::Failed(_) => None,
        };
        self.cache.write().await.insert(url.to_string(), entry);
        result
    }

    /// Prompt-ready excerpt for the question, if it concerns a known page
    pub async fn relevant_content(&self, question: &str) -> Option<String> {
        let url = self.page_for(question)?.to_string();
        debug!(url = %url, "Question matches website page");
        let service = self.content_for_url(&url).await?;
        Some(format_for_prompt(&service))
    }

    /// Warm the cache for every known page
    pub async fn preload(&self) {
        let mut urls: Vec<String> = self.pages.iter().map(|(_, url)| url.clone()).collect();
        urls.sort();
        urls.dedup();
        for url in urls {
            self.content_for_url(&url).await;
        }
    }
}

/// Render parsed page content as a prompt section
pub fn format_for_prompt(service: &NewService) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    format!(
        "ИНФОРМАЦИЯ С САЙТА КЛИНИКИ:\nНазвание услуги: {}\nОписание: {}\nПоказания: {}\nМетодики проведения: {}\nДлительность: {}\nРеабилитация: {}\nСтоимость: {}\nИсточник: {}",
        service.name,
        field(&service.description),
        field(&service.indications),
        field(&service.methods),
        field(&service.duration),
        field(&service.recovery),
        field(&service.price_range),
        field(&service.source_url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lookup_by_keyword() {
        let cache = SiteContentCache::new(reqwest::Client::new(), "https://clinic.test/eyelids");

        assert_eq!(cache.page_for("Сколько стоит блефаропластика?"), Some("https://clinic.test/eyelids"));
        assert_eq!(cache.page_for("Tell me about EYELID surgery"), Some("https://clinic.test/eyelids"));
        assert_eq!(cache.page_for("Где вы находитесь?"), None);
    }

    #[test]
    fn test_format_for_prompt() {
        let service = NewService {
            name: "Блефаропластика".into(),
            price_range: Some("от 50 000".into()),
            ..Default::default()
        };
        let text = format_for_prompt(&service);
        assert!(text.starts_with("ИНФОРМАЦИЯ С САЙТА КЛИНИКИ:"));
        assert!(text.contains("Название услуги: Блефаропластика"));
        assert!(text.contains("Стоимость: от 50 000"));
    }
}
