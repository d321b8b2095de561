//! Callback Handler module for processing inline keyboard callback queries

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MaybeInaccessibleMessage, ParseMode};
use teloxide::utils::html::escape;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{ConsultationDialogue, ConsultationState, SelectedService};

// Import database types
use crate::db::{create_chat_log, get_service, update_request_status, RequestStatus};

use crate::transport::send_html;

// Import dialogue manager functions
use super::dialogue_manager::{confirm_booking, notify_admin_new_request, ConfirmOutcome};

use super::routing::{CallbackAction, FaqCategory};
use super::ui_builder::{format_booking_success, main_menu_keyboard};
use super::{user_profile, BotContext};

/// Text shown in the callback answer popup
struct CallbackReply {
    text: String,
    show_alert: bool,
}

impl CallbackReply {
    fn toast(text: String) -> Option<Self> {
        Some(Self { text, show_alert: false })
    }

    fn alert(text: String) -> Option<Self> {
        Some(Self { text, show_alert: true })
    }
}

/// Replace the text of the message carrying the inline keyboard, dropping the keyboard
async fn edit_callback_message(bot: &Bot, message: &MaybeInaccessibleMessage, text: &str) {
    if let Err(e) = bot
        .edit_message_text(message.chat().id, message.id(), text)
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!(user_id = %message.chat().id, error = %e, "Failed to edit callback message");
    }
}

async fn select_service(
    bot: &Bot,
    ctx: &BotContext,
    dialogue: &ConsultationDialogue,
    message: &MaybeInaccessibleMessage,
    service_id: i64,
    language_code: Option<&str>,
) -> Result<Option<CallbackReply>> {
    let Some(service) = get_service(&ctx.pool, service_id).await? else {
        warn!(service_id, "Selected service no longer exists");
        return Ok(CallbackReply::alert(t_lang("booking-service-not-found", language_code)));
    };

    let text = t_args_lang(
        "booking-service-selected",
        &[("service", &escape(&service.name))],
        language_code,
    );
    edit_callback_message(bot, message, &text).await;

    dialogue
        .update(ConsultationState::EnteringName {
            service: SelectedService {
                id: service.id,
                name: service.name,
            },
        })
        .await?;
    Ok(None)
}

async fn confirm_request(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &BotContext,
    dialogue: &ConsultationDialogue,
    message: &MaybeInaccessibleMessage,
    language_code: Option<&str>,
) -> Result<Option<CallbackReply>> {
    let profile = user_profile(&q.from);
    let (request, booking) = match confirm_booking(&ctx.pool, dialogue, &profile).await? {
        ConfirmOutcome::Created { request, booking } => (request, booking),
        ConfirmOutcome::Expired => return Ok(CallbackReply::alert(t_lang("booking-expired", language_code))),
        ConfirmOutcome::Failed => return Ok(CallbackReply::alert(t_lang("booking-failed", language_code))),
    };

    let success = format_booking_success(request.id, &booking, &ctx.clinic, language_code);
    edit_callback_message(bot, message, &success).await;
    send_html(
        bot,
        &ctx.retry,
        message.chat().id,
        &t_lang("main-menu", language_code),
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;

    if let Err(e) = create_chat_log(
        &ctx.pool,
        request.user_id,
        &format!("confirm_request #{}", request.id),
        Some(&success),
        "consultation_request",
    )
    .await
    {
        warn!(request_id = request.id, error = %e, "Failed to write chat log");
    }

    notify_admin_new_request(bot, ctx, request.id, &booking, profile.username.as_deref()).await;
    info!(user_id = %q.from.id, request_id = request.id, "Consultation request confirmed");

    Ok(CallbackReply::toast(t_lang("booking-created-toast", language_code)))
}

async fn cancel_consultation(
    bot: &Bot,
    ctx: &BotContext,
    dialogue: &ConsultationDialogue,
    message: &MaybeInaccessibleMessage,
    language_code: Option<&str>,
) -> Result<Option<CallbackReply>> {
    dialogue.exit().await?;
    edit_callback_message(bot, message, &t_lang("booking-cancelled", language_code)).await;
    send_html(
        bot,
        &ctx.retry,
        message.chat().id,
        &t_lang("main-menu", language_code),
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
    Ok(None)
}

async fn answer_faq(
    bot: &Bot,
    ctx: &BotContext,
    message: &MaybeInaccessibleMessage,
    category: FaqCategory,
    language_code: Option<&str>,
) -> Result<Option<CallbackReply>> {
    send_html(
        bot,
        &ctx.retry,
        message.chat().id,
        &t_lang(&category.answer_key(), language_code),
        None,
        language_code,
    )
    .await;
    Ok(None)
}

async fn set_request_status(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &BotContext,
    message: &MaybeInaccessibleMessage,
    status: RequestStatus,
    request_id: i64,
) -> Result<Option<CallbackReply>> {
    let language_code = q.from.language_code.as_deref();

    if !ctx.is_admin(&q.from) {
        warn!(user_id = %q.from.id, request_id, "Status change attempted by non-admin");
        return Ok(CallbackReply::alert(t_lang("admin-not-authorized", language_code)));
    }

    if update_request_status(&ctx.pool, request_id, status).await?.is_none() {
        return Ok(CallbackReply::alert(t_lang("admin-request-not-found", language_code)));
    }

    let text = t_args_lang(
        "admin-status-updated",
        &[
            ("id", &request_id.to_string()),
            ("status", &t_lang(&format!("status-{status}"), language_code)),
        ],
        language_code,
    );
    send_html(bot, &ctx.retry, message.chat().id, &text, None, language_code).await;
    Ok(CallbackReply::toast(text))
}

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<BotContext>,
    dialogue: ConsultationDialogue,
) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query from user");

    let language_code = q.from.language_code.as_deref();
    let action = q.data.as_deref().and_then(CallbackAction::parse);

    let outcome = match (action, q.message.as_ref()) {
        (Some(action), Some(message)) => match action {
            CallbackAction::SelectService(service_id) => {
                select_service(&bot, &ctx, &dialogue, message, service_id, language_code).await
            }
            CallbackAction::ConfirmRequest => confirm_request(&bot, &q, &ctx, &dialogue, message, language_code).await,
            CallbackAction::CancelConsultation => {
                cancel_consultation(&bot, &ctx, &dialogue, message, language_code).await
            }
            CallbackAction::FaqCategory(category) => answer_faq(&bot, &ctx, message, category, language_code).await,
            CallbackAction::CloseFaq => {
                edit_callback_message(&bot, message, &t_lang("faq-closed", language_code)).await;
                Ok(None)
            }
            CallbackAction::SetStatus { status, request_id } => {
                set_request_status(&bot, &q, &ctx, message, status, request_id).await
            }
        },
        _ => {
            // Ignore unknown payloads and callbacks without a message
            debug!(user_id = %q.from.id, "Ignoring callback query");
            Ok(None)
        }
    };

    let reply = match outcome {
        Ok(reply) => reply,
        Err(e) => {
            error!(user_id = %q.from.id, error = %e, "Failed to handle callback query");
            CallbackReply::alert(t_lang("error-generic", language_code))
        }
    };

    // Answer the callback query to remove the loading state
    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(reply) = reply {
        answer = answer.text(reply.text).show_alert(reply.show_alert);
    }
    answer.await?;

    Ok(())
}
