use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use clinic_assistant::bot::{self, BotContext, Command};
use clinic_assistant::config::Settings;
use clinic_assistant::db::init_database_schema;
use clinic_assistant::dialogue::ConsultationState;
use clinic_assistant::llm::LlmClient;
use clinic_assistant::logging::init_tracing;
use clinic_assistant::responder::ResponseGenerator;
use clinic_assistant::site_content::SiteContentCache;
use clinic_assistant::site_parser::{scraper_client, seed_services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (including .env) before logging so LOG_LEVEL applies
    let settings = Settings::from_env().context("Failed to load configuration")?;
    init_tracing(&settings.log_level, settings.log_format);

    info!(clinic = %settings.clinic.name, "Starting clinic assistant bot");

    let bot_token = settings.require_bot_token()?.to_string();

    info!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;

    init_database_schema(&pool).await?;

    let http = scraper_client().context("Failed to build HTTP client")?;
    match seed_services(&pool, &http, &settings.clinic.website).await {
        Ok(outcome) => info!(outcome = ?outcome, "Service catalogue ready"),
        Err(e) => warn!(error = %e, "Failed to seed services"),
    }

    let model = match settings.llm.clone() {
        Some(llm_settings) => {
            let client = LlmClient::new(llm_settings, &settings.recovery)?;
            if client.check_connection().await {
                info!(model = %client.model(), "Language model reachable");
            } else {
                warn!(model = %client.model(), "Language model unreachable, answers may fall back to canned replies");
            }
            Some(client)
        }
        None => {
            warn!("OPENAI_API_KEY is not set, answering from canned replies only");
            None
        }
    };
    let responder = ResponseGenerator::new(model, settings.clinic.name.clone());

    let bot = Bot::new(bot_token);
    let me = bot.get_me().await.context("Failed to reach Telegram")?;
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let site_content = SiteContentCache::new(http, &settings.clinic.website);
    let ctx = Arc::new(
        BotContext::new(pool, &settings, responder)
            .with_site_content(site_content)
            .with_bot_username(me.user.username.clone()),
    );

    let preload_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        if let Some(cache) = &preload_ctx.site_content {
            cache.preload().await;
        }
    });

    info!(username = ?me.user.username, "Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<ConsultationState>, ConsultationState>()
                .endpoint(bot::message_handler),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<ConsultationState>, ConsultationState>()
                .endpoint(bot::callback_handler),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<ConsultationState>::new(), ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
