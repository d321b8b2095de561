//! Dialogue Manager module for the consultation booking steps

use anyhow::{Context, Result};
use chrono::Local;
use sqlx::postgres::PgPool;
use teloxide::prelude::*;
use teloxide::types::ReplyMarkup;
use teloxide::utils::html::escape;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{advance, BookingDraft, ConsultationDialogue, ConsultationState, StepKeyboard, StepReply};

// Import database types
use crate::db::{
    create_consultation_request, get_or_create_user, list_services, update_user_phone, ConsultationRequest,
    NewConsultationRequest, UserProfile,
};

use crate::transport::send_html;

// Import UI builder functions
use super::ui_builder::{
    admin_status_keyboard, cancel_keyboard, confirmation_keyboard, display_username, format_admin_request,
    format_booking_summary, main_menu_keyboard, services_keyboard, skip_keyboard,
};
use super::BotContext;

/// Show the service picker, or explain that nothing can be booked
pub async fn start_booking(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &BotContext,
    dialogue: &ConsultationDialogue,
    language_code: Option<&str>,
) -> Result<()> {
    let services = list_services(&ctx.pool).await?;

    if services.is_empty() {
        warn!(user_id = %chat_id, "Booking requested but no services are configured");
        dialogue.exit().await?;
        send_html(
            bot,
            &ctx.retry,
            chat_id,
            &t_lang("booking-no-services", language_code),
            Some(main_menu_keyboard(language_code).into()),
            language_code,
        )
        .await;
        return Ok(());
    }

    send_html(
        bot,
        &ctx.retry,
        chat_id,
        &t_lang("booking-start", language_code),
        Some(services_keyboard(&services, language_code).into()),
        language_code,
    )
    .await;

    dialogue.update(ConsultationState::ChoosingService).await?;
    info!(user_id = %chat_id, services = services.len(), "Booking started");
    Ok(())
}

/// Feed a text message to the active booking step
///
/// The reply is sent before the new state is stored; rejected input leaves
/// the state untouched so the user can try again.
pub async fn handle_dialogue_input(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &BotContext,
    dialogue: ConsultationDialogue,
    state: ConsultationState,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %chat_id, state = ?state, "Booking input received");

    let today = Local::now().date_naive();
    let Some(step) = advance(state, text, today) else {
        return Ok(());
    };

    let reply = match &step.reply {
        StepReply::Message(key) => t_lang(key, language_code),
        StepReply::NameAccepted(name) => {
            t_args_lang("booking-name-accepted", &[("name", &escape(name))], language_code)
        }
        StepReply::Summary(booking) => format_booking_summary(booking, language_code),
    };

    let markup: Option<ReplyMarkup> = match step.keyboard {
        StepKeyboard::Keep => None,
        StepKeyboard::Cancel => Some(cancel_keyboard(language_code).into()),
        StepKeyboard::Skip => Some(skip_keyboard(language_code).into()),
        StepKeyboard::Confirmation => Some(confirmation_keyboard(language_code).into()),
    };

    send_html(bot, &ctx.retry, chat_id, &reply, markup, language_code).await;

    if let Some(next) = step.next {
        debug!(user_id = %chat_id, state = ?next, "Booking step completed");
        dialogue.update(next).await?;
    }

    Ok(())
}

/// Persist a confirmed booking
///
/// The user record is created on first contact; a phone number is stored on
/// it only when none is known yet.
pub async fn submit_booking(pool: &PgPool, profile: &UserProfile, booking: &BookingDraft) -> Result<ConsultationRequest> {
    let user = get_or_create_user(pool, profile).await?;

    if user.phone.is_none() {
        update_user_phone(pool, user.id, &booking.phone)
            .await
            .context("Failed to store phone on user")?;
    }

    create_consultation_request(
        pool,
        &NewConsultationRequest {
            user_id: user.id,
            service_id: booking.service.id,
            name: booking.name.clone(),
            phone: booking.phone.clone(),
            preferred_date: booking.preferred_date,
            comment: booking.comment.clone(),
        },
    )
    .await
}

/// What pressing Confirm did to the booking
#[derive(Debug)]
pub enum ConfirmOutcome {
    /// The dialogue is no longer waiting for confirmation
    Expired,
    /// Saving failed; the draft stays in `Confirming`
    Failed,
    Created {
        request: ConsultationRequest,
        booking: BookingDraft,
    },
}

/// Save the confirmed draft and leave the dialogue
pub async fn confirm_booking(
    pool: &PgPool,
    dialogue: &ConsultationDialogue,
    profile: &UserProfile,
) -> Result<ConfirmOutcome> {
    let Some(ConsultationState::Confirming { booking }) = dialogue.get().await? else {
        return Ok(ConfirmOutcome::Expired);
    };

    match submit_booking(pool, profile, &booking).await {
        Ok(request) => {
            dialogue.exit().await?;
            Ok(ConfirmOutcome::Created { request, booking })
        }
        Err(e) => {
            error!(user_id = profile.telegram_id, error = %e, "Failed to create consultation request");
            Ok(ConfirmOutcome::Failed)
        }
    }
}

/// Forward a new request to the administrator chat, if one is configured
pub async fn notify_admin_new_request(
    bot: &Bot,
    ctx: &BotContext,
    request_id: i64,
    booking: &BookingDraft,
    username: Option<&str>,
) {
    let Some(admin_id) = ctx.admin_chat_id else {
        return;
    };

    let text = format_admin_request(request_id, booking, username);
    let sent = send_html(
        bot,
        &ctx.retry,
        ChatId(admin_id),
        &text,
        Some(admin_status_keyboard(request_id).into()),
        None,
    )
    .await;

    if sent.is_none() {
        warn!(request_id, "Failed to notify administrator about new request");
    }
}

/// Tell the administrator that a user asked for a manager
pub async fn notify_admin_contact(bot: &Bot, ctx: &BotContext, profile: &UserProfile) {
    let Some(admin_id) = ctx.admin_chat_id else {
        return;
    };

    let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let text = t_args_lang(
        "admin-contact-request",
        &[
            ("name", &escape(&name)),
            ("username", &display_username(profile.username.as_deref())),
            ("telegram_id", &profile.telegram_id.to_string()),
        ],
        None,
    );

    if send_html(bot, &ctx.retry, ChatId(admin_id), &text, None, None).await.is_none() {
        warn!(telegram_id = profile.telegram_id, "Failed to notify administrator about contact request");
    }
}
