//! UI Builder module for creating keyboards and formatting messages
//!
//! All message texts are HTML; user and database values are escaped here.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use teloxide::utils::html::escape;

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import database types
use crate::config::ClinicInfo;
use crate::db::{RequestStatus, Service};
use crate::dialogue::BookingDraft;

use super::routing::{CallbackAction, FaqCategory, MenuAction};

fn menu_button(action: MenuAction, language_code: Option<&str>) -> KeyboardButton {
    KeyboardButton::new(t_lang(action.label_key(), language_code))
}

/// Main menu reply keyboard
pub fn main_menu_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            menu_button(MenuAction::ServiceInfo, language_code),
            menu_button(MenuAction::Prices, language_code),
        ],
        vec![menu_button(MenuAction::Book, language_code)],
        vec![
            menu_button(MenuAction::ContactManager, language_code),
            menu_button(MenuAction::Faq, language_code),
        ],
        vec![menu_button(MenuAction::About, language_code)],
    ])
    .resize_keyboard()
}

/// Ways out of the booking: cancel, or jump back to the main menu
fn exit_row(language_code: Option<&str>) -> Vec<KeyboardButton> {
    vec![
        menu_button(MenuAction::Cancel, language_code),
        menu_button(MenuAction::MainMenu, language_code),
    ]
}

/// Reply keyboard shown while the user types booking details
pub fn cancel_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![exit_row(language_code)]).resize_keyboard()
}

/// Reply keyboard for the optional comment step
pub fn skip_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(t_lang("btn-skip", language_code))],
        exit_row(language_code),
    ])
    .resize_keyboard()
}

/// One button per service, plus a cancel row
pub fn services_keyboard(services: &[Service], language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = services
        .iter()
        .map(|service| {
            vec![InlineKeyboardButton::callback(
                service.name.clone(),
                CallbackAction::SelectService(service.id).callback_data(),
            )]
        })
        .collect();

    rows.push(vec![InlineKeyboardButton::callback(
        t_lang("btn-cancel", language_code),
        CallbackAction::CancelConsultation.callback_data(),
    )]);

    InlineKeyboardMarkup::new(rows)
}

pub fn confirmation_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            t_lang("btn-confirm", language_code),
            CallbackAction::ConfirmRequest.callback_data(),
        ),
        InlineKeyboardButton::callback(
            t_lang("btn-cancel", language_code),
            CallbackAction::CancelConsultation.callback_data(),
        ),
    ]])
}

pub fn faq_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = FaqCategory::ALL
        .iter()
        .map(|category| {
            vec![InlineKeyboardButton::callback(
                t_lang(&category.label_key(), language_code),
                category.callback_data(),
            )]
        })
        .collect();

    rows.push(vec![InlineKeyboardButton::callback(
        t_lang("btn-close", language_code),
        CallbackAction::CloseFaq.callback_data(),
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Status buttons attached to admin notifications
pub fn admin_status_keyboard(request_id: i64) -> InlineKeyboardMarkup {
    let button = |status: RequestStatus| {
        InlineKeyboardButton::callback(
            t_lang(&format!("admin-btn-{status}"), None),
            CallbackAction::SetStatus { status, request_id }.callback_data(),
        )
    };

    InlineKeyboardMarkup::new(vec![
        vec![button(RequestStatus::Contacted), button(RequestStatus::Appointed)],
        vec![button(RequestStatus::Cancelled), button(RequestStatus::Completed)],
    ])
}

/// Escaped field value, or the localized default when it is missing
fn field_or(value: Option<&str>, default_key: &str, language_code: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => escape(value),
        None => t_lang(default_key, language_code),
    }
}

/// Detailed service card
pub fn format_service_card(service: &Service, language_code: Option<&str>) -> String {
    let name = escape(&service.name);
    let description = service.description.as_deref().map(escape).unwrap_or_default();
    let indications = field_or(service.indications.as_deref(), "service-default-indications", language_code);
    let duration = field_or(service.duration.as_deref(), "service-default-duration", language_code);
    let methods = field_or(service.methods.as_deref(), "service-default-methods", language_code);
    let recovery = field_or(service.recovery.as_deref(), "service-default-recovery", language_code);
    let price = field_or(service.price_range.as_deref(), "service-default-price", language_code);

    t_args_lang(
        "service-card",
        &[
            ("name", &name),
            ("description", &description),
            ("indications", &indications),
            ("duration", &duration),
            ("methods", &methods),
            ("recovery", &recovery),
            ("price", &price),
        ],
        language_code,
    )
}

pub fn format_prices_card(service: &Service, language_code: Option<&str>) -> String {
    let name = escape(&service.name);
    let price = field_or(service.price_range.as_deref(), "prices-default", language_code);
    t_args_lang("prices-card", &[("name", &name), ("price", &price)], language_code)
}

pub fn format_about_clinic(clinic: &ClinicInfo, language_code: Option<&str>) -> String {
    t_args_lang(
        "about-clinic",
        &[
            ("clinic", &escape(&clinic.name)),
            ("address", &escape(&clinic.address)),
            ("phone", &escape(&clinic.phone)),
            ("website", &escape(&clinic.website)),
        ],
        language_code,
    )
}

pub fn format_contact_manager(clinic: &ClinicInfo, language_code: Option<&str>) -> String {
    t_args_lang(
        "contact-manager",
        &[
            ("phone", &escape(&clinic.phone)),
            ("email", &escape(&clinic.email)),
            ("hours", &t_lang("working-hours", language_code)),
        ],
        language_code,
    )
}

/// Preferred date as shown to the user
pub fn display_date(booking: &BookingDraft, language_code: Option<&str>) -> String {
    match booking.preferred_date {
        Some(_) => escape(booking.date_input.trim()),
        None => t_lang("booking-date-any", language_code),
    }
}

fn display_comment(comment: &str, language_code: Option<&str>) -> String {
    if comment.trim().is_empty() {
        t_lang("booking-comment-none", language_code)
    } else {
        escape(comment)
    }
}

/// Summary shown before the user confirms a booking
pub fn format_booking_summary(booking: &BookingDraft, language_code: Option<&str>) -> String {
    t_args_lang(
        "booking-summary",
        &[
            ("name", &escape(&booking.name)),
            ("phone", &escape(&booking.phone)),
            ("service", &escape(&booking.service.name)),
            ("date", &display_date(booking, language_code)),
            ("comment", &display_comment(&booking.comment, language_code)),
        ],
        language_code,
    )
}

pub fn format_booking_success(
    request_id: i64,
    booking: &BookingDraft,
    clinic: &ClinicInfo,
    language_code: Option<&str>,
) -> String {
    t_args_lang(
        "booking-success",
        &[
            ("id", &request_id.to_string()),
            ("name", &escape(&booking.name)),
            ("phone", &escape(&booking.phone)),
            ("service", &escape(&booking.service.name)),
            ("hours", &t_lang("working-hours", language_code)),
            ("clinic_phone", &escape(&clinic.phone)),
            ("clinic", &escape(&clinic.name)),
        ],
        language_code,
    )
}

/// Telegram handle, or a dash when the user has none
pub fn display_username(username: Option<&str>) -> String {
    match username {
        Some(username) => escape(&format!("@{username}")),
        None => "-".to_string(),
    }
}

/// Notification sent to the administrator chat about a new request
pub fn format_admin_request(request_id: i64, booking: &BookingDraft, username: Option<&str>) -> String {
    let date = match booking.preferred_date {
        Some(date) => date.format("%d.%m.%Y").to_string(),
        None => t_lang("booking-date-any", None),
    };

    t_args_lang(
        "admin-new-request",
        &[
            ("id", &request_id.to_string()),
            ("name", &escape(&booking.name)),
            ("username", &display_username(username)),
            ("phone", &escape(&booking.phone)),
            ("service", &escape(&booking.service.name)),
            ("date", &date),
            ("comment", &display_comment(&booking.comment, None)),
        ],
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::SelectedService;
    use chrono::{NaiveDate, Utc};

    fn service() -> Service {
        Service {
            id: 5,
            name: "Пластика <век>".into(),
            description: Some("Описание".into()),
            indications: None,
            methods: Some("   ".into()),
            duration: Some("1 час".into()),
            recovery: None,
            price_range: Some("от 50 000 & выше".into()),
            source_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booking() -> BookingDraft {
        BookingDraft {
            service: SelectedService { id: 5, name: "Блефаропластика".into() },
            name: "Анна".into(),
            phone: "+79991234567".into(),
            preferred_date: NaiveDate::from_ymd_opt(2030, 5, 1),
            date_input: "01.05.2030".into(),
            comment: String::new(),
        }
    }

    #[test]
    fn test_service_card_escapes_and_fills_defaults() {
        let card = format_service_card(&service(), Some("ru"));
        assert!(card.contains("<b>Пластика &lt;век&gt;</b>"));
        assert!(card.contains("от 50 000 &amp; выше"));
        assert!(card.contains("Консультация хирурга"));
        assert!(card.contains("Хирургическая, трансконъюнктивальная"));
    }

    #[test]
    fn test_summary_shows_typed_date_and_empty_comment() {
        let summary = format_booking_summary(&booking(), Some("ru"));
        assert!(summary.contains("📅 Дата: 01.05.2030"));
        assert!(summary.contains("💬 Комментарий: нет"));

        let anytime = BookingDraft { preferred_date: None, date_input: "любое время".into(), ..booking() };
        assert!(format_booking_summary(&anytime, Some("ru")).contains("📅 Дата: удобно в любое время"));
    }

    #[test]
    fn test_services_keyboard_layout() {
        let keyboard = services_keyboard(&[service()], Some("ru"));
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0][0].text, "Пластика <век>");
    }

    #[test]
    fn test_booking_keyboards_offer_cancel_and_main_menu() {
        for keyboard in [cancel_keyboard(Some("en")), skip_keyboard(Some("en"))] {
            let exit_row = keyboard.keyboard.last().unwrap();
            let actions: Vec<_> = exit_row
                .iter()
                .map(|button| MenuAction::from_label(&button.text))
                .collect();
            assert_eq!(actions, vec![Some(MenuAction::Cancel), Some(MenuAction::MainMenu)]);
        }
        assert_eq!(skip_keyboard(Some("ru")).keyboard[0][0].text, "Пропустить");
    }

    #[test]
    fn test_admin_keyboard_has_four_statuses() {
        let keyboard = admin_status_keyboard(9);
        let buttons: usize = keyboard.inline_keyboard.iter().map(Vec::len).sum();
        assert_eq!(buttons, 4);
    }

    #[test]
    fn test_admin_request_text() {
        let text = format_admin_request(12, &booking(), Some("anna_k"));
        assert!(text.contains("#12"));
        assert!(text.contains("@anna_k"));
        assert!(text.contains("01.05.2030"));
    }
}
