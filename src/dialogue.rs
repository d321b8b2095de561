//! Consultation booking dialogue: per-chat state and input validation.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::localization::all_translations;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^(\+7|8)\d{10}$").unwrap();
}

/// Phrases meaning "no preferred date"
const ANY_TIME_PHRASES: &[&str] = &[
    "удобно в любое время",
    "любое время",
    "когда удобно",
    "any time",
    "anytime",
    "whenever",
];

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d.%m.%y", "%d-%m-%Y", "%d-%m-%y"];

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_COMMENT_LEN: usize = 1000;

/// Service picked at the first step of the booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedService {
    pub id: i64,
    pub name: String,
}

/// A completed booking form awaiting confirmation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub service: SelectedService,
    pub name: String,
    pub phone: String,
    pub preferred_date: Option<NaiveDate>,
    /// Date exactly as typed by the user, echoed back in summaries
    pub date_input: String,
    pub comment: String,
}

/// Represents the conversation state for the consultation booking
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsultationState {
    #[default]
    Start,
    ChoosingService,
    EnteringName {
        service: SelectedService,
    },
    EnteringPhone {
        service: SelectedService,
        name: String,
    },
    EnteringDate {
        service: SelectedService,
        name: String,
        phone: String,
    },
    EnteringComment {
        service: SelectedService,
        name: String,
        phone: String,
        preferred_date: Option<NaiveDate>,
        date_input: String,
    },
    Confirming {
        booking: BookingDraft,
    },
}

impl ConsultationState {
    /// Whether a booking is in progress
    pub fn is_active(&self) -> bool {
        !matches!(self, ConsultationState::Start)
    }
}

/// Type alias for our consultation dialogue
pub type ConsultationDialogue = Dialogue<ConsultationState, InMemStorage<ConsultationState>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameError {
    TooShort,
    TooLong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateError {
    /// Matches none of the accepted formats
    Unrecognized,
    /// Parsed, but earlier than today
    InPast,
}

/// Validates a client name
pub fn validate_name(input: &str) -> Result<String, NameError> {
    let trimmed = input.trim();
    let len = trimmed.chars().count();

    if len < MIN_NAME_LEN {
        return Err(NameError::TooShort);
    }

    if len > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }

    Ok(trimmed.to_string())
}

/// Validates a Russian phone number and normalizes it to `+7XXXXXXXXXX`
pub fn validate_phone(input: &str) -> Option<String> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if !PHONE_RE.is_match(&cleaned) {
        return None;
    }

    match cleaned.strip_prefix('8') {
        Some(rest) => Some(format!("+7{rest}")),
        None => Some(cleaned),
    }
}

/// Whether the input means "any time is fine"
pub fn is_any_time(input: &str) -> bool {
    let lowered = input.trim().to_lowercase();
    ANY_TIME_PHRASES.iter().any(|phrase| lowered == *phrase)
}

/// Parse a preferred consultation date
///
/// Returns `Ok(None)` for "any time" answers. Formats are tried in order and
/// the first one yielding a date not earlier than `today` wins.
pub fn parse_preferred_date(input: &str, today: NaiveDate) -> Result<Option<NaiveDate>, DateError> {
    let trimmed = input.trim();

    if is_any_time(trimmed) {
        return Ok(None);
    }

    let mut saw_past_date = false;
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if date >= today {
                return Ok(Some(date));
            }
            saw_past_date = true;
        }
    }

    if saw_past_date {
        Err(DateError::InPast)
    } else {
        Err(DateError::Unrecognized)
    }
}

/// Trim a free-form comment and cap its length
pub fn normalize_comment(input: &str) -> String {
    input.trim().chars().take(MAX_COMMENT_LEN).collect()
}

/// Whether the text is the "Skip" button in any language
pub fn is_skip(text: &str) -> bool {
    let text = text.trim();
    all_translations("btn-skip").iter().any(|label| label == text)
}

/// Reply keyboard to attach to a step's reply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKeyboard {
    /// Leave whatever keyboard the user already has
    Keep,
    Cancel,
    Skip,
    Confirmation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepReply {
    /// Localized message without arguments
    Message(&'static str),
    NameAccepted(String),
    /// Summary of the completed form
    Summary(BookingDraft),
}

/// Outcome of feeding one text message to the booking form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub reply: StepReply,
    pub keyboard: StepKeyboard,
    /// `None` keeps the current state
    pub next: Option<ConsultationState>,
}

impl Step {
    fn stay(key: &'static str) -> Self {
        Self {
            reply: StepReply::Message(key),
            keyboard: StepKeyboard::Keep,
            next: None,
        }
    }

    fn to(reply: StepReply, keyboard: StepKeyboard, next: ConsultationState) -> Self {
        Self {
            reply,
            keyboard,
            next: Some(next),
        }
    }
}

/// Apply a text answer to the current booking step
///
/// Returns `None` when no booking is in progress. Rejected input keeps the
/// state; steps driven by inline buttons only get a reminder.
pub fn advance(state: ConsultationState, text: &str, today: NaiveDate) -> Option<Step> {
    let step = match state {
        ConsultationState::Start => return None,
        ConsultationState::ChoosingService | ConsultationState::Confirming { .. } => Step::stay("booking-use-buttons"),
        ConsultationState::EnteringName { service } => match validate_name(text) {
            Ok(name) => Step::to(
                StepReply::NameAccepted(name.clone()),
                StepKeyboard::Cancel,
                ConsultationState::EnteringPhone { service, name },
            ),
            Err(NameError::TooShort) => Step::stay("booking-name-too-short"),
            Err(NameError::TooLong) => Step::stay("booking-name-too-long"),
        },
        ConsultationState::EnteringPhone { service, name } => match validate_phone(text) {
            Some(phone) => Step::to(
                StepReply::Message("booking-phone-accepted"),
                StepKeyboard::Cancel,
                ConsultationState::EnteringDate { service, name, phone },
            ),
            None => Step::stay("booking-phone-invalid"),
        },
        ConsultationState::EnteringDate { service, name, phone } => match parse_preferred_date(text, today) {
            Ok(preferred_date) => Step::to(
                StepReply::Message("booking-date-accepted"),
                StepKeyboard::Skip,
                ConsultationState::EnteringComment {
                    service,
                    name,
                    phone,
                    preferred_date,
                    date_input: text.trim().to_string(),
                },
            ),
            Err(DateError::Unrecognized) => Step::stay("booking-date-invalid"),
            Err(DateError::InPast) => Step::stay("booking-date-past"),
        },
        ConsultationState::EnteringComment {
            service,
            name,
            phone,
            preferred_date,
            date_input,
        } => {
            let booking = BookingDraft {
                service,
                name,
                phone,
                preferred_date,
                date_input,
                comment: if is_skip(text) { String::new() } else { normalize_comment(text) },
            };
            Step::to(
                StepReply::Summary(booking.clone()),
                StepKeyboard::Confirmation,
                ConsultationState::Confirming { booking },
            )
        }
    };

    Some(step)
}
