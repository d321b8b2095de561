//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use teloxide::utils::html::escape;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::ConsultationDialogue;

// Import database types
use crate::db::{create_chat_log, get_or_create_user, list_services, recent_chat_logs, UserProfile};

use crate::prompt::{history_from_logs, PromptContext, ServiceFacts};
use crate::transport::{send_html, send_html_parts};

// Import dialogue manager functions
use super::dialogue_manager::{handle_dialogue_input, notify_admin_contact, start_booking};

// Import UI builder functions
use super::routing::{route_text, Command, MenuAction, Route};
use super::ui_builder::{
    faq_keyboard, format_about_clinic, format_contact_manager, format_prices_card, format_service_card,
    main_menu_keyboard,
};
use super::{user_profile, BotContext};

/// Chat log entries used to rebuild conversation history
const HISTORY_LOG_LIMIT: i64 = 5;

fn message_language(msg: &Message) -> Option<&str> {
    msg.from.as_ref().and_then(|user| user.language_code.as_deref())
}

fn message_profile(msg: &Message) -> UserProfile {
    match msg.from.as_ref() {
        Some(user) => user_profile(user),
        None => UserProfile {
            telegram_id: msg.chat.id.0,
            ..Default::default()
        },
    }
}

/// Write a chat log without failing the reply
async fn log_interaction(ctx: &BotContext, user_id: i64, message: &str, response: Option<&str>, intent: &str) {
    if let Err(e) = create_chat_log(&ctx.pool, user_id, message, response, intent).await {
        warn!(user_id, intent, error = %e, "Failed to write chat log");
    }
}

async fn send_main_menu(bot: &Bot, ctx: &BotContext, chat_id: ChatId, key: &str, language_code: Option<&str>) {
    send_html(
        bot,
        &ctx.retry,
        chat_id,
        &t_lang(key, language_code),
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
}

async fn handle_start(bot: &Bot, msg: &Message, ctx: &BotContext, dialogue: &ConsultationDialogue) -> Result<()> {
    let language_code = message_language(msg);
    dialogue.exit().await?;

    let profile = message_profile(msg);
    let user = get_or_create_user(&ctx.pool, &profile).await?;

    let name = profile
        .first_name
        .clone()
        .unwrap_or_else(|| t_lang("welcome-guest", language_code));
    let welcome = t_args_lang(
        "welcome",
        &[("name", &escape(&name)), ("clinic", &escape(&ctx.clinic.name))],
        language_code,
    );

    send_html(
        bot,
        &ctx.retry,
        msg.chat.id,
        &welcome,
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;

    log_interaction(ctx, user.id, "/start", Some(&welcome), "start").await;
    info!(user_id = %msg.chat.id, "User started the bot");
    Ok(())
}

async fn handle_service_info(bot: &Bot, chat_id: ChatId, ctx: &BotContext, language_code: Option<&str>) -> Result<()> {
    let services = list_services(&ctx.pool).await?;

    let text = match services.first() {
        Some(service) => format_service_card(service, language_code),
        None => t_lang("services-unavailable", language_code),
    };

    send_html_parts(
        bot,
        &ctx.retry,
        chat_id,
        &text,
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
    Ok(())
}

async fn handle_prices(bot: &Bot, chat_id: ChatId, ctx: &BotContext, language_code: Option<&str>) -> Result<()> {
    let services = list_services(&ctx.pool).await?;

    let text = match services.first() {
        Some(service) => format_prices_card(service, language_code),
        None => t_lang("prices-unavailable", language_code),
    };

    send_html(
        bot,
        &ctx.retry,
        chat_id,
        &text,
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
    Ok(())
}

async fn handle_contact_manager(bot: &Bot, msg: &Message, ctx: &BotContext) -> Result<()> {
    let language_code = message_language(msg);
    let profile = message_profile(msg);
    let user = get_or_create_user(&ctx.pool, &profile).await?;

    let text = format_contact_manager(&ctx.clinic, language_code);
    send_html(
        bot,
        &ctx.retry,
        msg.chat.id,
        &text,
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;

    log_interaction(ctx, user.id, msg.text().unwrap_or_default(), Some(&text), "contact_manager").await;
    notify_admin_contact(bot, ctx, &profile).await;
    info!(user_id = %msg.chat.id, "User asked for a manager");
    Ok(())
}

/// Answer a free-form question with the response generator
async fn handle_question(bot: &Bot, msg: &Message, text: &str, ctx: &BotContext) -> Result<()> {
    let language_code = message_language(msg);
    let profile = message_profile(msg);
    let user = get_or_create_user(&ctx.pool, &profile).await?;

    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        debug!(user_id = %msg.chat.id, error = %e, "Failed to send typing indicator");
    }

    let logs = match recent_chat_logs(&ctx.pool, user.id, HISTORY_LOG_LIMIT).await {
        Ok(logs) => logs,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "Answering without conversation history");
            Vec::new()
        }
    };
    let services = list_services(&ctx.pool).await?;
    let website = match &ctx.site_content {
        Some(cache) => cache.relevant_content(text).await,
        None => None,
    };

    let context = PromptContext {
        service: services.first().map(ServiceFacts::from),
        history: history_from_logs(&logs),
        website,
    };

    let response = ctx.responder.respond(text, &context, language_code).await;
    debug!(user_id = %msg.chat.id, source = ?response.source, "Question answered");

    let delivered = send_html_parts(
        bot,
        &ctx.retry,
        msg.chat.id,
        &escape(&response.text),
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
    if !delivered {
        warn!(user_id = %msg.chat.id, "Answer was only partially delivered");
    }

    log_interaction(ctx, user.id, text, Some(&response.text), "question").await;
    Ok(())
}

async fn handle_menu_action(
    bot: &Bot,
    msg: &Message,
    ctx: &BotContext,
    dialogue: &ConsultationDialogue,
    action: MenuAction,
) -> Result<()> {
    let language_code = message_language(msg);
    let chat_id = msg.chat.id;

    if action.resets_dialogue() {
        dialogue.exit().await?;
    }

    match action {
        MenuAction::ServiceInfo => handle_service_info(bot, chat_id, ctx, language_code).await?,
        MenuAction::Prices => handle_prices(bot, chat_id, ctx, language_code).await?,
        MenuAction::Book => start_booking(bot, chat_id, ctx, dialogue, language_code).await?,
        MenuAction::ContactManager => handle_contact_manager(bot, msg, ctx).await?,
        MenuAction::Faq => {
            send_html(
                bot,
                &ctx.retry,
                chat_id,
                &t_lang("faq-intro", language_code),
                Some(faq_keyboard(language_code).into()),
                language_code,
            )
            .await;
        }
        MenuAction::About => {
            send_html(
                bot,
                &ctx.retry,
                chat_id,
                &format_about_clinic(&ctx.clinic, language_code),
                Some(main_menu_keyboard(language_code).into()),
                language_code,
            )
            .await;
        }
        MenuAction::Cancel => send_main_menu(bot, ctx, chat_id, "cancelled", language_code).await,
        MenuAction::MainMenu => send_main_menu(bot, ctx, chat_id, "main-menu", language_code).await,
    }

    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    text: &str,
    ctx: &BotContext,
    dialogue: ConsultationDialogue,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.chars().count(), "Received text message from user");

    let language_code = message_language(msg);
    let state = dialogue.get().await?.unwrap_or_default();

    match route_text(text, ctx.bot_username.as_deref(), &state) {
        Route::Command(Command::Start) => handle_start(bot, msg, ctx, &dialogue).await,
        Route::Command(Command::Help) => {
            send_html(
                bot,
                &ctx.retry,
                msg.chat.id,
                &t_lang("help", language_code),
                None,
                language_code,
            )
            .await;
            Ok(())
        }
        Route::Command(Command::Cancel) => {
            dialogue.exit().await?;
            send_main_menu(bot, ctx, msg.chat.id, "cancelled", language_code).await;
            Ok(())
        }
        Route::Menu(action) => handle_menu_action(bot, msg, ctx, &dialogue, action).await,
        Route::Dialogue => handle_dialogue_input(bot, msg.chat.id, ctx, dialogue, state, text, language_code).await,
        Route::Question => handle_question(bot, msg, text, ctx).await,
    }
}

async fn handle_unsupported_message(bot: &Bot, msg: &Message, ctx: &BotContext) -> Result<()> {
    let language_code = message_language(msg);
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");

    send_html(
        bot,
        &ctx.retry,
        msg.chat.id,
        &t_lang("non-text-hint", language_code),
        Some(main_menu_keyboard(language_code).into()),
        language_code,
    )
    .await;
    Ok(())
}

/// Handle an incoming message; failures are logged and answered with a generic error
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    ctx: Arc<BotContext>,
    dialogue: ConsultationDialogue,
) -> Result<()> {
    let handled = match msg.text() {
        Some(text) => handle_text_message(&bot, &msg, text, &ctx, dialogue).await,
        None => handle_unsupported_message(&bot, &msg, &ctx).await,
    };

    if let Err(e) = handled {
        error!(user_id = %msg.chat.id, error = %e, "Failed to handle message");
        send_main_menu(&bot, &ctx, msg.chat.id, "error-generic", message_language(&msg)).await;
    }

    Ok(())
}
