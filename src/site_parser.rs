//! # Service Page Parser
//!
//! Best-effort extraction of service details from the clinic website, used
//! to seed the services table and to enrich model prompts. Every field has a
//! built-in default, so parsing never fails on odd markup.

use std::time::Duration;

use anyhow::Result;
use scraper::{ElementRef, Html, Node, Selector};
use sqlx::postgres::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{count_services, create_service, NewService};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_NAME: &str = "Блефаропластика верхних век";
const DEFAULT_DESCRIPTION: &str = "Пластика верхних век (блефаропластика) - хирургическая процедура по коррекции возрастных изменений верхних век.";
const DEFAULT_INDICATIONS: &str = "Нависание кожи верхних век, избыточная кожа, мешки под глазами, ухудшение поля зрения, усталый вид глаз.";
const DEFAULT_METHODS: &str = "Хирургическая блефаропластика, трансконъюнктивальная методика, лазерная коррекция.";
const DEFAULT_DURATION: &str = "1-2 часа";
const DEFAULT_RECOVERY: &str = "Реабилитационный период: 7-10 дней - отек и синяки, 2 недели - снятие швов, 1 месяц - возврат к обычной жизни, 3-6 месяцев - окончательный результат.";
const DEFAULT_PRICE: &str = "от 50 000 до 120 000 рублей";

const TITLE_SELECTORS: &[&str] = &["h1", ".service-title", ".page-title", "title"];
const DESCRIPTION_SELECTORS: &[&str] = &[
    ".service-description",
    ".description",
    ".about-service",
    "p:first-of-type",
    ".content p:first-of-type",
];

const INDICATION_KEYWORDS: &[&str] = &["показания", "показан", "рекомендуется"];
const METHOD_KEYWORDS: &[&str] = &["метод", "методика", "техника", "проведение"];
const DURATION_KEYWORDS: &[&str] = &["длительность", "время", "минут", "час"];
const DURATION_MARKERS: &[&str] = &["минут", "час", "длительность"];
const RECOVERY_KEYWORDS: &[&str] = &["реабилитация", "восстановление", "период", "после"];
const PRICE_KEYWORDS: &[&str] = &["цена", "стоимость", "руб", "₽"];
const PRICE_MARKERS: &[&str] = &["руб", "цена", "стоимость"];

/// Recovery sections shorter than this are treated as stray mentions
const MIN_RECOVERY_CHARS: usize = 30;
/// A bare first paragraph must be at least this long to serve as description
const MIN_DESCRIPTION_CHARS: usize = 50;
/// Width of the `VARCHAR(255)` service columns (name, duration, price_range)
pub const SHORT_FIELD_MAX_CHARS: usize = 255;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to fetch service page: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service page returned status {0}")]
    Status(u16),
}

/// Collapse whitespace runs into single spaces
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn select_first_text(document: &Html, selectors: &[&str]) -> Option<(String, String)> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let element = document.select(&selector).next()?;
        let text = element_text(element);
        (!text.is_empty()).then(|| (raw.to_string(), text))
    })
}

fn extract_title(document: &Html) -> Option<String> {
    let (selector, text) = select_first_text(document, TITLE_SELECTORS)?;
    if selector == "title" {
        // "<service> - <clinic>"
        return text.split(" - ").next().map(str::trim).map(str::to_string);
    }
    Some(text)
}

fn extract_description(document: &Html) -> Option<String> {
    if let Some((_, text)) = select_first_text(document, DESCRIPTION_SELECTORS) {
        return Some(text);
    }

    let paragraph = Selector::parse("p").ok()?;
    document
        .select(&paragraph)
        .map(element_text)
        .find(|text| text.chars().count() > MIN_DESCRIPTION_CHARS)
}

/// Text of the first `p`/`ul`/`ol` following a text node that mentions a keyword
///
/// Keywords are tried in order, and for each keyword the document is walked in
/// order. Sections rejected by `accept` are skipped and the walk continues.
fn section_after_keyword<F>(document: &Html, keywords: &[&str], accept: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    for keyword in keywords {
        let mut armed = false;

        for node in document.root_element().descendants() {
            match node.value() {
                Node::Text(text) if !armed => {
                    if text.to_lowercase().contains(keyword) {
                        armed = true;
                    }
                }
                Node::Element(element) if armed && matches!(element.name(), "p" | "ul" | "ol") => {
                    if let Some(section) = ElementRef::wrap(node) {
                        let text = element_text(section);
                        if !text.is_empty() && accept(&text) {
                            return Some(text);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    None
}

/// Text node mentioning a keyword that also satisfies `accept`
fn text_with_keyword<F>(document: &Html, keywords: &[&str], accept: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    for keyword in keywords {
        for node in document.root_element().descendants() {
            if let Node::Text(text) = node.value() {
                let normalized = normalize_text(text);
                if normalized.to_lowercase().contains(keyword) && accept(&normalized) {
                    return Some(normalized);
                }
            }
        }
    }

    None
}

/// Cut to at most `max_chars` characters, marking the cut with an ellipsis
fn clip_field(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.truncate(clipped.trim_end().len());
    clipped.push('…');
    clipped
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    markers.iter().any(|marker| lowered.contains(marker))
}

/// Parse a service page; missing fields get built-in defaults
pub fn parse_service_html(html: &str, url: &str) -> NewService {
    let document = Html::parse_document(html);

    let duration = text_with_keyword(&document, DURATION_KEYWORDS, |text| contains_any(text, DURATION_MARKERS));
    let price = text_with_keyword(&document, PRICE_KEYWORDS, |text| {
        text.chars().any(|c| c.is_ascii_digit()) && contains_any(text, PRICE_MARKERS)
    });

    NewService {
        name: clip_field(
            extract_title(&document)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            SHORT_FIELD_MAX_CHARS,
        ),
        description: Some(extract_description(&document).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())),
        indications: Some(
            section_after_keyword(&document, INDICATION_KEYWORDS, |_| true)
                .unwrap_or_else(|| DEFAULT_INDICATIONS.to_string()),
        ),
        methods: Some(
            section_after_keyword(&document, METHOD_KEYWORDS, |_| true).unwrap_or_else(|| DEFAULT_METHODS.to_string()),
        ),
        duration: Some(clip_field(
            duration.unwrap_or_else(|| DEFAULT_DURATION.to_string()),
            SHORT_FIELD_MAX_CHARS,
        )),
        recovery: Some(
            section_after_keyword(&document, RECOVERY_KEYWORDS, |text| {
                text.chars().count() > MIN_RECOVERY_CHARS
            })
            .unwrap_or_else(|| DEFAULT_RECOVERY.to_string()),
        ),
        price_range: Some(clip_field(
            price.unwrap_or_else(|| DEFAULT_PRICE.to_string()),
            SHORT_FIELD_MAX_CHARS,
        )),
        source_url: Some(url.to_string()),
    }
}

/// Built-in service used when the website cannot be scraped
pub fn default_service(url: &str) -> NewService {
    NewService {
        name: DEFAULT_NAME.to_string(),
        description: Some(DEFAULT_DESCRIPTION.to_string()),
        indications: Some(DEFAULT_INDICATIONS.to_string()),
        methods: Some(DEFAULT_METHODS.to_string()),
        duration: Some(DEFAULT_DURATION.to_string()),
        recovery: Some(DEFAULT_RECOVERY.to_string()),
        price_range: Some(DEFAULT_PRICE.to_string()),
        source_url: Some(url.to_string()),
    }
}

/// HTTP client configured for scraping the clinic website
pub fn scraper_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()
}

/// Download and parse a service page
pub async fn fetch_service(client: &reqwest::Client, url: &str) -> Result<NewService, ScrapeError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status(status.as_u16()));
    }

    let html = response.text().await?;
    let service = parse_service_html(&html, url);
    info!(url, name = %service.name, "Parsed service page");
    Ok(service)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Services already exist; nothing was inserted
    AlreadySeeded,
    /// Inserted the service scraped from the website
    Scraped,
    /// Scraping failed; inserted the built-in default
    Default,
}

/// Insert a service when the table is empty, preferring scraped data
pub async fn seed_services(pool: &PgPool, client: &reqwest::Client, url: &str) -> Result<SeedOutcome> {
    if count_services(pool).await? > 0 {
        info!("Services already present, skipping seeding");
        return Ok(SeedOutcome::AlreadySeeded);
    }

    match fetch_service(client, url).await {
        Ok(service) => match create_service(pool, &service).await {
            Ok(_) => {
                info!(name = %service.name, "Seeded services table from website");
                return Ok(SeedOutcome::Scraped);
            }
            Err(err) => warn!(url, error = %err, "Could not store scraped service, seeding default service"),
        },
        Err(err) => warn!(url, error = %err, "Could not scrape service page, seeding default service"),
    }

    let service = default_service(url);
    create_service(pool, &service).await?;
    info!(name = %service.name, "Seeded services table with default service");
    Ok(SeedOutcome::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title>Пластика верхних век - Мед-Пластик</title></head>
          <body>
            <h1>  Пластика   верхних век </h1>
            <div class="description">Коррекция формы век за один визит.</div>
            <h2>Показания к операции</h2>
            <ul><li>Нависание века</li><li>Грыжи</li></ul>
            <h2>Методика проведения</h2>
            <p>Классическая хирургическая техника.</p>
            <p>Длительность операции около 40 минут.</p>
            <h2>Реабилитация</h2>
            <p>Коротко.</p>
            <p>Отеки проходят за 7-10 дней, швы снимают на 5 день после операции.</p>
            <p>Стоимость: 75 000 руб.</p>
          </body>
        </html>
    "#;

    #[test]
    fn test_parses_known_sections() {
        let service = parse_service_html(PAGE, "https://clinic.test/eyelids");

        assert_eq!(service.name, "Пластика верхних век");
        assert_eq!(service.description.as_deref(), Some("Коррекция формы век за один визит."));
        assert_eq!(service.indications.as_deref(), Some("Нависание века Грыжи"));
        assert_eq!(service.methods.as_deref(), Some("Классическая хирургическая техника."));
        assert_eq!(service.duration.as_deref(), Some("Длительность операции около 40 минут."));
        assert_eq!(service.price_range.as_deref(), Some("Стоимость: 75 000 руб."));
        assert_eq!(service.source_url.as_deref(), Some("https://clinic.test/eyelids"));
    }

    #[test]
    fn test_recovery_skips_short_sections() {
        let service = parse_service_html(PAGE, "u");
        assert_eq!(
            service.recovery.as_deref(),
            Some("Отеки проходят за 7-10 дней, швы снимают на 5 день после операции.")
        );
    }

    #[test]
    fn test_title_tag_drops_clinic_suffix() {
        let html = "<html><head><title>Блефаропластика - Клиника</title></head><body></body></html>";
        let service = parse_service_html(html, "u");
        assert_eq!(service.name, "Блефаропластика");
    }

    #[test]
    fn test_empty_page_uses_defaults() {
        let service = parse_service_html("<html><body></body></html>", "https://clinic.test");
        assert_eq!(service, default_service("https://clinic.test"));
    }

    #[test]
    fn test_long_sections_fit_short_columns() {
        let sentence = "Длительность операции около 40 минут, но зависит от объема вмешательства. ";
        let html = format!(
            "<html><body><h1>{}</h1><p>{}</p><p>Цена: {} руб.</p></body></html>",
            "Блефаропластика ".repeat(30),
            sentence.repeat(6),
            "50 000 ".repeat(60),
        );

        let service = parse_service_html(&html, "u");

        for field in [
            Some(service.name.as_str()),
            service.duration.as_deref(),
            service.price_range.as_deref(),
        ] {
            let field = field.unwrap();
            assert!(field.chars().count() <= SHORT_FIELD_MAX_CHARS, "{field}");
            assert!(field.ends_with('…'));
        }
        assert!(service.duration.as_deref().unwrap().starts_with("Длительность операции около 40 минут"));
    }

    #[test]
    fn test_clip_field_keeps_short_text() {
        assert_eq!(clip_field("1-2 часа".to_string(), SHORT_FIELD_MAX_CHARS), "1-2 часа");
        assert_eq!(clip_field("абв где".to_string(), 5), "абв…");
    }

    #[tokio::test]
    async fn test_fetch_service() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eyelids"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = scraper_client().unwrap();
        let url = format!("{}/eyelids", server.uri());
        let service = fetch_service(&client, &url).await.unwrap();
        assert_eq!(service.name, "Пластика верхних век");
        assert_eq!(service.source_url.as_deref(), Some(url.as_str()));

        let missing = fetch_service(&client, &format!("{}/missing", server.uri())).await;
        assert!(matches!(missing, Err(ScrapeError::Status(404))));
    }
}
