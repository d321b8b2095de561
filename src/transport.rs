//! # Message Transport Module
//!
//! Keeps outgoing text inside Telegram's limits and retries failed sends.
//! Lengths are counted in characters, which is how Telegram counts them.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{ParseMode, ReplyMarkup};
use teloxide::{ApiError, RequestError};
use tracing::{debug, error, warn};

use crate::config::RecoveryConfig;
use crate::localization::t_lang;

/// Hard limit of a single Telegram text message
pub const TELEGRAM_MAX_LEN: usize = 4096;
/// Length LLM answers are truncated to before splitting
pub const LLM_RESPONSE_MAX_LEN: usize = 3500;
/// Window near the cut point in which a sentence end is preferred
const SENTENCE_END_WINDOW: usize = 100;

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split at a character index
fn split_at_char(text: &str, index: usize) -> (&str, &str) {
    match text.char_indices().nth(index) {
        Some((byte_idx, _)) => text.split_at(byte_idx),
        None => (text, ""),
    }
}

fn push_part(parts: &mut Vec<String>, part: &str) {
    let trimmed = part.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
}

/// Break an oversized piece on whitespace, hard-cutting words longer than `max_len`.
/// Full chunks go to `parts`; the unfinished tail is returned.
fn split_words(piece: &str, max_len: usize, parts: &mut Vec<String>) -> String {
    let mut buffer = String::new();

    for word in piece.split_whitespace() {
        let separator = usize::from(!buffer.is_empty());
        if char_len(&buffer) + separator + char_len(word) <= max_len {
            if separator == 1 {
                buffer.push(' ');
            }
            buffer.push_str(word);
            continue;
        }

        push_part(parts, &buffer);
        buffer.clear();

        let mut rest = word;
        while char_len(rest) > max_len {
            let (head, tail) = split_at_char(rest, max_len);
            push_part(parts, head);
            rest = tail;
        }
        buffer.push_str(rest);
    }

    buffer
}

/// Append `piece` to the part being built, flushing it first if it would overflow
fn append_piece(parts: &mut Vec<String>, current: &mut String, piece: &str, separator: &str, max_len: usize) {
    if piece.trim().is_empty() {
        return;
    }

    if !current.is_empty() {
        if char_len(current) + char_len(separator) + char_len(piece) <= max_len {
            current.push_str(separator);
            current.push_str(piece);
            return;
        }
        push_part(parts, current);
        current.clear();
    }

    if char_len(piece) <= max_len {
        current.push_str(piece);
    } else {
        *current = split_words(piece, max_len, parts);
    }
}

/// Split text into parts of at most `max_len` characters
///
/// Paragraph boundaries (`\n\n`) are preferred, then sentence boundaries
/// (`. `), then whitespace; a single word longer than the limit is cut hard.
/// Blank input yields no parts.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);

    if char_len(text) <= max_len {
        let mut parts = Vec::new();
        push_part(&mut parts, text);
        return parts;
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if char_len(paragraph) <= max_len {
            append_piece(&mut parts, &mut current, paragraph, "\n\n", max_len);
            continue;
        }

        let mut first_sentence = true;
        for sentence in paragraph.split(". ") {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let sentence = if sentence.ends_with(['.', '!', '?', '…']) {
                sentence.to_string()
            } else {
                format!("{sentence}.")
            };
            // the first sentence of a paragraph still needs a paragraph break
            let separator = if first_sentence { "\n\n" } else { " " };
            append_piece(&mut parts, &mut current, &sentence, separator, max_len);
            first_sentence = false;
        }
    }

    push_part(&mut parts, &current);
    parts
}

/// Truncate text to `max_len` characters and append `notice`
///
/// The cut moves back to the last sentence end when one lies within the
/// final hundred characters.
pub fn truncate_message(text: &str, max_len: usize, notice: &str) -> String {
    if char_len(text) <= max_len {
        return text.to_string();
    }

    let (mut truncated, _) = split_at_char(text, max_len);

    if let Some(byte_idx) = truncated.rfind(['.', '!', '?']) {
        let char_idx = char_len(&truncated[..byte_idx]);
        if char_idx > max_len.saturating_sub(SENTENCE_END_WINDOW) {
            truncated = &truncated[..=byte_idx];
        }
    }

    format!("{truncated}...\n\n{notice}")
}

/// How a failed send should be handled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendFailure {
    /// Flood control: wait the given time, then retry
    RetryAfter(Duration),
    /// Network or IO trouble: retry with backoff
    Transient,
    /// Text exceeds the transport limit
    TooLong,
    /// Anything else; retrying will not help
    Fatal,
}

/// Maps a transport error onto a [`SendFailure`]
pub trait ClassifySendError {
    fn classify(&self) -> SendFailure;
}

impl ClassifySendError for RequestError {
    fn classify(&self) -> SendFailure {
        match self {
            RequestError::RetryAfter(seconds) => SendFailure::RetryAfter(seconds.duration()),
            RequestError::Network(_) | RequestError::Io(_) => SendFailure::Transient,
            RequestError::Api(ApiError::MessageIsTooLong) => SendFailure::TooLong,
            RequestError::Api(ApiError::Unknown(description))
                if description.to_lowercase().contains("message is too long") =>
            {
                SendFailure::TooLong
            }
            _ => SendFailure::Fatal,
        }
    }
}

/// Bounded retry policy for outgoing messages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Pause after a part of a multi-part reply failed
    pub part_pause: Duration,
    /// Length a too-long message is cut to before the final attempt
    pub cut_len: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

impl From<&RecoveryConfig> for RetryPolicy {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            part_pause: Duration::from_millis(500),
            cut_len: 4000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff (`base * 2^attempt`) capped at `max_delay`, with up to 10% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() as u64) / 10;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Send `text` through `send`, retrying per `policy`
///
/// Returns the sent value, or `None` once retries are exhausted or the
/// error is not retryable. A message rejected as too long is cut to
/// `policy.cut_len` characters plus `notice` and resent right away; that
/// resend does not count against `policy.max_attempts`.
pub async fn send_with_retry<F, Fut, T, E>(policy: &RetryPolicy, text: &str, notice: &str, mut send: F) -> Option<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifySendError + Display,
{
    let mut text = text.to_string();
    let mut shortened = false;
    let mut attempt = 0;

    loop {
        let err = match send(text.clone()).await {
            Ok(sent) => return Some(sent),
            Err(err) => err,
        };

        let last_attempt = attempt + 1 >= policy.max_attempts;
        match err.classify() {
            SendFailure::TooLong if !shortened && char_len(&text) > policy.cut_len => {
                warn!(length = char_len(&text), "Message too long, cutting it down");
                let (head, _) = split_at_char(&text, policy.cut_len);
                text = format!("{head}...\n\n{notice}");
                shortened = true;
                continue;
            }
            SendFailure::RetryAfter(_) | SendFailure::Transient if last_attempt => {
                error!(attempts = policy.max_attempts, error = %err, "Send failed after all retries");
                return None;
            }
            SendFailure::RetryAfter(wait) => {
                warn!(attempt, wait_secs = wait.as_secs(), "Flood control hit, waiting before retry");
                tokio::time::sleep(wait).await;
            }
            SendFailure::Transient => {
                let delay = policy.backoff(attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "Transient send failure, backing off");
                tokio::time::sleep(delay).await;
            }
            _ => {
                error!(attempt, error = %err, "Send failed permanently");
                return None;
            }
        }

        attempt += 1;
    }
}

/// Send each part in order; returns `true` only if every part was delivered
pub async fn send_parts<F, Fut, T, E>(policy: &RetryPolicy, parts: &[String], notice: &str, mut send: F) -> bool
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifySendError + Display,
{
    let mut all_sent = true;

    for (index, part) in parts.iter().enumerate() {
        if send_with_retry(policy, part, notice, &mut send).await.is_none() {
            warn!(part = index, total = parts.len(), "Failed to deliver message part");
            all_sent = false;
            tokio::time::sleep(policy.part_pause).await;
        }
    }

    all_sent
}

/// Send an HTML message with retries
pub async fn send_html(
    bot: &Bot,
    policy: &RetryPolicy,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
    language_code: Option<&str>,
) -> Option<Message> {
    let notice = t_lang("message-truncated", language_code);
    send_with_retry(policy, text, &notice, |text| {
        let mut request = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
        if let Some(markup) = markup.clone() {
            request = request.reply_markup(markup);
        }
        request.send()
    })
    .await
}

/// Split a long HTML text and send it part by part; the markup goes on the last part
pub async fn send_html_parts(
    bot: &Bot,
    policy: &RetryPolicy,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
    language_code: Option<&str>,
) -> bool {
    let parts = split_message(text, TELEGRAM_MAX_LEN);
    debug!(user_id = %chat_id, parts = parts.len(), "Sending multi-part reply");

    let Some((last, head)) = parts.split_last() else {
        return true;
    };

    let notice = t_lang("message-truncated", language_code);
    let mut all_sent = send_parts(policy, head, &notice, |text| {
        bot.send_message(chat_id, text).parse_mode(ParseMode::Html).send()
    })
    .await;

    if send_html(bot, policy, chat_id, last, markup, language_code).await.is_none() {
        all_sent = false;
    }

    all_sent
}
