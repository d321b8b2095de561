//! Pure routing decisions for incoming text and callback payloads.
//!
//! Nothing here talks to Telegram; the handlers execute what these
//! functions decide.

use teloxide::utils::command::BotCommands;

use crate::db::RequestStatus;
use crate::dialogue::ConsultationState;
use crate::localization::all_translations;

/// Commands registered with Telegram
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "начать диалог")]
    Start,
    #[command(description = "показать справку")]
    Help,
    #[command(description = "отменить текущее действие")]
    Cancel,
}

/// Reply-keyboard buttons of the main menu
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    ServiceInfo,
    Prices,
    Book,
    ContactManager,
    Faq,
    About,
    Cancel,
    MainMenu,
}

impl MenuAction {
    pub const ALL: [MenuAction; 8] = [
        MenuAction::ServiceInfo,
        MenuAction::Prices,
        MenuAction::Book,
        MenuAction::ContactManager,
        MenuAction::Faq,
        MenuAction::About,
        MenuAction::Cancel,
        MenuAction::MainMenu,
    ];

    /// Translation key of the button label
    pub fn label_key(&self) -> &'static str {
        match self {
            MenuAction::ServiceInfo => "btn-service-info",
            MenuAction::Prices => "btn-prices",
            MenuAction::Book => "btn-book",
            MenuAction::ContactManager => "btn-contact-manager",
            MenuAction::Faq => "btn-faq",
            MenuAction::About => "btn-about",
            MenuAction::Cancel => "btn-cancel",
            MenuAction::MainMenu => "btn-main-menu",
        }
    }

    /// Recognize a button label in any supported language
    pub fn from_label(text: &str) -> Option<MenuAction> {
        let text = text.trim();
        MenuAction::ALL
            .into_iter()
            .find(|action| all_translations(action.label_key()).iter().any(|label| label == text))
    }

    /// Whether pressing the button abandons an in-progress booking
    pub fn resets_dialogue(&self) -> bool {
        matches!(self, MenuAction::Book | MenuAction::Cancel | MenuAction::MainMenu)
    }
}

/// What to do with an incoming text message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    Menu(MenuAction),
    /// Input for the active booking step
    Dialogue,
    /// Free-form question for the response generator
    Question,
}

/// Decide how to handle a text message
///
/// Commands win over menu buttons, menu buttons win over the booking
/// dialogue, and anything left is a question unless a booking is active.
pub fn route_text(text: &str, bot_username: Option<&str>, state: &ConsultationState) -> Route {
    let trimmed = text.trim();

    if trimmed.starts_with('/') {
        if let Ok(command) = Command::parse(trimmed, bot_username.unwrap_or_default()) {
            return Route::Command(command);
        }
    }

    if let Some(action) = MenuAction::from_label(trimmed) {
        return Route::Menu(action);
    }

    if state.is_active() {
        Route::Dialogue
    } else {
        Route::Question
    }
}

/// Topics of the FAQ keyboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaqCategory {
    Price,
    Recovery,
    Safety,
    Preparation,
    General,
}

impl FaqCategory {
    pub const ALL: [FaqCategory; 5] = [
        FaqCategory::Price,
        FaqCategory::Recovery,
        FaqCategory::Safety,
        FaqCategory::Preparation,
        FaqCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaqCategory::Price => "price",
            FaqCategory::Recovery => "recovery",
            FaqCategory::Safety => "safety",
            FaqCategory::Preparation => "preparation",
            FaqCategory::General => "general",
        }
    }

    pub fn label_key(&self) -> String {
        format!("faq-category-{}", self.as_str())
    }

    pub fn answer_key(&self) -> String {
        format!("faq-answer-{}", self.as_str())
    }

    pub fn callback_data(&self) -> String {
        format!("category_{}", self.as_str())
    }

    fn parse(raw: &str) -> Option<FaqCategory> {
        FaqCategory::ALL.into_iter().find(|category| category.as_str() == raw)
    }
}

/// Parsed inline keyboard payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    SelectService(i64),
    ConfirmRequest,
    CancelConsultation,
    FaqCategory(FaqCategory),
    CloseFaq,
    SetStatus { status: RequestStatus, request_id: i64 },
}

pub const CONFIRM_REQUEST: &str = "confirm_request";
pub const CANCEL_CONSULTATION: &str = "cancel_consultation";
pub const CLOSE_FAQ: &str = "close_faq";

impl CallbackAction {
    pub fn parse(data: &str) -> Option<CallbackAction> {
        match data {
            CONFIRM_REQUEST => return Some(CallbackAction::ConfirmRequest),
            CANCEL_CONSULTATION => return Some(CallbackAction::CancelConsultation),
            CLOSE_FAQ => return Some(CallbackAction::CloseFaq),
            _ => {}
        }

        if let Some(id) = data.strip_prefix("service_") {
            return id.parse().ok().map(CallbackAction::SelectService);
        }

        if let Some(category) = data.strip_prefix("category_") {
            return FaqCategory::parse(category).map(CallbackAction::FaqCategory);
        }

        // status_<status>_<request id>
        let rest = data.strip_prefix("status_")?;
        let (status, request_id) = rest.rsplit_once('_')?;
        Some(CallbackAction::SetStatus {
            status: status.parse().ok()?,
            request_id: request_id.parse().ok()?,
        })
    }

    /// Payload that [`CallbackAction::parse`] maps back onto this action
    pub fn callback_data(&self) -> String {
        match self {
            CallbackAction::SelectService(id) => format!("service_{id}"),
            CallbackAction::ConfirmRequest => CONFIRM_REQUEST.to_string(),
            CallbackAction::CancelConsultation => CANCEL_CONSULTATION.to_string(),
            CallbackAction::FaqCategory(category) => category.callback_data(),
            CallbackAction::CloseFaq => CLOSE_FAQ.to_string(),
            CallbackAction::SetStatus { status, request_id } => format!("status_{status}_{request_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::SelectedService;

    fn entering_name() -> ConsultationState {
        ConsultationState::EnteringName {
            service: SelectedService { id: 1, name: "Блефаропластика".into() },
        }
    }

    #[test]
    fn test_only_leaving_buttons_reset_dialogue() {
        let resetting: Vec<MenuAction> = MenuAction::ALL.into_iter().filter(MenuAction::resets_dialogue).collect();
        assert_eq!(resetting, vec![MenuAction::Book, MenuAction::Cancel, MenuAction::MainMenu]);

        for action in [MenuAction::ServiceInfo, MenuAction::Prices, MenuAction::ContactManager, MenuAction::Faq, MenuAction::About] {
            assert!(!action.resets_dialogue(), "{action:?} should keep the booking");
        }
    }

    #[test]
    fn test_commands_win_over_dialogue() {
        assert_eq!(route_text("/cancel", None, &entering_name()), Route::Command(Command::Cancel));
        assert_eq!(
            route_text("/start@clinic_bot", Some("clinic_bot"), &entering_name()),
            Route::Command(Command::Start)
        );
    }

    #[test]
    fn test_unknown_command_is_text() {
        assert_eq!(route_text("/unknown", None, &ConsultationState::Start), Route::Question);
        assert_eq!(route_text("/unknown", None, &entering_name()), Route::Dialogue);
    }

    #[test]
    fn test_menu_buttons_in_both_languages() {
        let state = ConsultationState::Start;
        assert_eq!(route_text("💰 Цены", None, &state), Route::Menu(MenuAction::Prices));
        assert_eq!(route_text("💰 Prices", None, &state), Route::Menu(MenuAction::Prices));
        assert_eq!(route_text("❌ Отмена", None, &entering_name()), Route::Menu(MenuAction::Cancel));
    }

    #[test]
    fn test_free_text_depends_on_state() {
        assert_eq!(route_text("Анна", None, &entering_name()), Route::Dialogue);
        assert_eq!(route_text("Сколько стоит?", None, &ConsultationState::Start), Route::Question);
    }

    #[test]
    fn test_callback_parsing() {
        assert_eq!(CallbackAction::parse("service_42"), Some(CallbackAction::SelectService(42)));
        assert_eq!(CallbackAction::parse("confirm_request"), Some(CallbackAction::ConfirmRequest));
        assert_eq!(
            CallbackAction::parse("category_safety"),
            Some(CallbackAction::FaqCategory(FaqCategory::Safety))
        );
        assert_eq!(
            CallbackAction::parse("status_appointed_17"),
            Some(CallbackAction::SetStatus { status: RequestStatus::Appointed, request_id: 17 })
        );
        assert_eq!(CallbackAction::parse("service_abc"), None);
        assert_eq!(CallbackAction::parse("status_archived_1"), None);
        assert_eq!(CallbackAction::parse("category_unknown"), None);
    }

    #[test]
    fn test_callback_data_is_parseable() {
        let actions = [
            CallbackAction::SelectService(7),
            CallbackAction::CancelConsultation,
            CallbackAction::CloseFaq,
            CallbackAction::FaqCategory(FaqCategory::General),
            CallbackAction::SetStatus { status: RequestStatus::Completed, request_id: 3 },
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.callback_data()), Some(action));
        }
    }
}
